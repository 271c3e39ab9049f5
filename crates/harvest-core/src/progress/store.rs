//! Storage interface for the progress tables and backend selection.
//!
//! Every state transition is one conditional write inside a transaction;
//! whether the caller won is read back from the affected rows, never from
//! an earlier SELECT.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::postgres::PostgresStore;
use super::sqlite::SqliteStore;
use super::types::{CompetitionRecord, RecoveryReport, SeasonRecord, SeasonStatus, StoreSummary};
use crate::unit::SeasonRef;

/// SQL dialect behind a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgresql",
        }
    }
}

/// Atomic progress-table operations. `now` is Unix seconds, supplied by
/// the caller so that staleness can be tested without sleeping.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Create tables and indexes if missing.
    async fn migrate(&self) -> Result<()>;

    /// Take the competition for `worker_id` if it is claimable.
    /// Returns true only if the written row carries our worker id.
    async fn claim_competition(
        &self,
        competition_id: &str,
        competition_url: &str,
        worker_id: &str,
        now: i64,
    ) -> Result<bool>;

    /// Record the season list for a competition we hold. Existing season
    /// rows are left untouched. Returns false if we do not hold it.
    async fn discover_seasons(
        &self,
        competition_id: &str,
        worker_id: &str,
        seasons: &[SeasonRef],
    ) -> Result<bool>;

    /// Claim every claimable season of the competition in one statement.
    async fn claim_seasons(&self, competition_id: &str, worker_id: &str, now: i64) -> Result<Vec<SeasonRef>>;

    /// Mark our in-progress season completed and roll the parent up.
    async fn complete_season(
        &self,
        competition_id: &str,
        season_id: &str,
        worker_id: &str,
        clubs_saved: i64,
        now: i64,
    ) -> Result<bool>;

    /// Record a failure of our in-progress season. Returns the new status,
    /// or None if the season was not ours.
    async fn fail_season(
        &self,
        competition_id: &str,
        season_id: &str,
        worker_id: &str,
        error: &str,
        now: i64,
    ) -> Result<Option<SeasonStatus>>;

    /// Mark seasons with a numeric year below `cutoff_year` completed with
    /// zero clubs. Seasons running under another worker are left alone.
    async fn complete_seasons_before(
        &self,
        competition_id: &str,
        worker_id: &str,
        cutoff_year: i32,
        now: i64,
    ) -> Result<u64>;

    /// Release in-progress rows started before `started_before`.
    async fn recover_stale(&self, started_before: i64, now: i64) -> Result<RecoveryReport>;

    async fn competition(&self, competition_id: &str) -> Result<Option<CompetitionRecord>>;

    async fn season(&self, competition_id: &str, season_id: &str) -> Result<Option<SeasonRecord>>;

    /// All seasons of a competition, newest year first.
    async fn seasons(&self, competition_id: &str) -> Result<Vec<SeasonRecord>>;

    async fn failed_seasons(&self) -> Result<Vec<SeasonRecord>>;

    /// Put failed seasons (optionally of one competition) back to pending
    /// with a fresh retry budget.
    async fn reset_failed_seasons(&self, competition_id: Option<&str>) -> Result<u64>;

    /// Manual reset of a competition and all its seasons to pending.
    /// Returns the number of seasons reset.
    async fn reset_competition(&self, competition_id: &str) -> Result<u64>;

    async fn clear_all(&self) -> Result<()>;

    async fn summary(&self) -> Result<StoreSummary>;
}

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
pub fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Constructors returning a migrated store behind the trait.
pub struct ProgressDb;

impl ProgressDb {
    /// Connect by URL scheme: `sqlite:` or `postgres:`/`postgresql:`.
    pub async fn connect(url: &str) -> Result<Arc<dyn ProgressStore>> {
        let store: Arc<dyn ProgressStore> = if url.starts_with("sqlite:") {
            Arc::new(SqliteStore::connect(url, 8).await?)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Arc::new(PostgresStore::connect(url).await?)
        } else {
            bail!("unsupported database url (expected sqlite: or postgres://): {}", url);
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Open (or create) a SQLite database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Arc<dyn ProgressStore>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Self::connect(&(path_to_sqlite_uri(path) + "?mode=rwc")).await
    }

    /// In-memory SQLite store on a single connection (no disk I/O).
    pub async fn open_memory() -> Result<Arc<dyn ProgressStore>> {
        let store = SqliteStore::connect("sqlite::memory:", 1).await?;
        store.migrate().await?;
        Ok(Arc::new(store))
    }
}
