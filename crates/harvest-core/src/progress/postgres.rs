//! PostgreSQL backend for deployments where workers share one server.
//!
//! A competition claim is a single `INSERT ... ON CONFLICT DO UPDATE ...
//! WHERE <claimable> RETURNING worker_id`: the row lock taken by the upsert
//! serialises competing claimants, and a losing claimant gets no row back.
//! All integer columns are BIGINT so they decode as `i64` like on SQLite.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row, Transaction};

use super::store::{Dialect, ProgressStore};
use super::types::{
    parse_year, CompetitionRecord, CompetitionStatus, RecoveryReport,
    SeasonRecord, SeasonStatus, StoreSummary, MAX_SEASON_RETRIES, RECOVERED_MESSAGE,
};
use crate::unit::{sort_newest_first, SeasonRef};

#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

const SEASON_COLUMNS: &str = "competition_id, season_id, season_year, status, worker_id, \
     started_at, completed_at, error_message, retry_count, clubs_saved";

fn season_from_row(row: &PgRow) -> SeasonRecord {
    let status: String = row.get("status");
    SeasonRecord {
        competition_id: row.get("competition_id"),
        season_id: row.get("season_id"),
        season_year: row.get("season_year"),
        status: SeasonStatus::parse(&status),
        worker_id: row.get("worker_id"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        error_message: row.get("error_message"),
        retry_count: row.get("retry_count"),
        clubs_saved: row.get("clubs_saved"),
    }
}

/// Flip the competition to completed (all seasons completed) or failed
/// (all seasons terminal, at least one out of retries).
///
/// The parent row is locked before counting. Two transactions finishing the
/// last seasons of one competition queue up here, and the second one counts
/// after the first has committed, so it sees every season in its final state.
async fn roll_up(tx: &mut Transaction<'_, Postgres>, competition_id: &str, now: i64) -> Result<()> {
    sqlx::query("SELECT 1 FROM competition_progress WHERE competition_id = $1 FOR UPDATE")
        .bind(competition_id)
        .fetch_optional(&mut **tx)
        .await?;
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               CAST(COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS BIGINT) AS completed,
               CAST(COALESCE(SUM(CASE WHEN status = 'failed' AND retry_count >= $1 THEN 1 ELSE 0 END), 0) AS BIGINT) AS exhausted
        FROM season_progress
        WHERE competition_id = $2
        "#,
    )
    .bind(MAX_SEASON_RETRIES)
    .bind(competition_id)
    .fetch_one(&mut **tx)
    .await?;
    let total: i64 = row.get("total");
    let completed: i64 = row.get("completed");
    let exhausted: i64 = row.get("exhausted");
    if total == 0 {
        return Ok(());
    }

    if completed == total {
        let done = sqlx::query(
            r#"
            UPDATE competition_progress
            SET status = 'completed',
                completed_at = $1,
                error_message = NULL
            WHERE competition_id = $2
              AND status <> 'completed'
            "#,
        )
        .bind(now)
        .bind(competition_id)
        .execute(&mut **tx)
        .await?;
        if done.rows_affected() > 0 {
            tracing::info!(competition_id, seasons = total, "competition completed");
        }
    } else if exhausted > 0 && completed + exhausted == total {
        let message = format!("{} of {} seasons exhausted retries", exhausted, total);
        let failed = sqlx::query(
            r#"
            UPDATE competition_progress
            SET status = 'failed',
                completed_at = $1,
                error_message = $2
            WHERE competition_id = $3
              AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(now)
        .bind(&message)
        .bind(competition_id)
        .execute(&mut **tx)
        .await?;
        if failed.rows_affected() > 0 {
            tracing::warn!(competition_id, "competition failed: {}", message);
        }
    }
    Ok(())
}

#[async_trait]
impl ProgressStore for PostgresStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS competition_progress (
                competition_id TEXT PRIMARY KEY,
                competition_url TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                seasons_discovered BIGINT NOT NULL DEFAULT 0,
                worker_id TEXT,
                started_at BIGINT,
                completed_at BIGINT,
                error_message TEXT,
                retry_count BIGINT NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS season_progress (
                id BIGSERIAL PRIMARY KEY,
                competition_id TEXT NOT NULL,
                season_id TEXT NOT NULL,
                season_year TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                worker_id TEXT,
                started_at BIGINT,
                completed_at BIGINT,
                error_message TEXT,
                retry_count BIGINT NOT NULL DEFAULT 0,
                clubs_saved BIGINT NOT NULL DEFAULT 0,
                UNIQUE (competition_id, season_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_season_progress_status ON season_progress (status, started_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_competition(
        &self,
        competition_id: &str,
        competition_url: &str,
        worker_id: &str,
        now: i64,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            INSERT INTO competition_progress (
                competition_id, competition_url, status, seasons_discovered,
                worker_id, started_at, retry_count
            ) VALUES ($1, $2, 'in_progress', 0, $3, $4, 0)
            ON CONFLICT (competition_id) DO UPDATE
            SET status = 'in_progress',
                worker_id = EXCLUDED.worker_id,
                started_at = EXCLUDED.started_at
            WHERE competition_progress.status IS NULL
               OR competition_progress.status = 'pending'
               OR (competition_progress.status = 'in_progress' AND competition_progress.worker_id IS NULL)
               OR (competition_progress.worker_id = EXCLUDED.worker_id
                   AND competition_progress.status IN ('in_progress', 'seasons_discovered'))
            RETURNING worker_id
            "#,
        )
        .bind(competition_id)
        .bind(competition_url)
        .bind(worker_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let holder: Option<String> = row.and_then(|r| r.get("worker_id"));
        Ok(holder.as_deref() == Some(worker_id))
    }

    async fn discover_seasons(
        &self,
        competition_id: &str,
        worker_id: &str,
        seasons: &[SeasonRef],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let owned = sqlx::query(
            r#"
            UPDATE competition_progress
            SET status = 'seasons_discovered',
                seasons_discovered = $1
            WHERE competition_id = $2
              AND worker_id = $3
              AND status IN ('in_progress', 'seasons_discovered')
            "#,
        )
        .bind(seasons.len() as i64)
        .bind(competition_id)
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;
        if owned.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for season in seasons {
            sqlx::query(
                r#"
                INSERT INTO season_progress (
                    competition_id, season_id, season_year, status, retry_count, clubs_saved
                ) VALUES ($1, $2, $3, 'pending', 0, 0)
                ON CONFLICT (competition_id, season_id) DO NOTHING
                "#,
            )
            .bind(competition_id)
            .bind(&season.season_id)
            .bind(&season.year)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn claim_seasons(&self, competition_id: &str, worker_id: &str, now: i64) -> Result<Vec<SeasonRef>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            r#"
            UPDATE season_progress
            SET status = 'in_progress',
                worker_id = $1,
                started_at = $2
            WHERE competition_id = $3
              AND status IN ('pending', 'failed')
              AND retry_count < $4
              AND (worker_id IS NULL OR worker_id = $1)
            RETURNING season_id, season_year
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .bind(competition_id)
        .bind(MAX_SEASON_RETRIES)
        .fetch_all(&mut *tx)
        .await?;

        let mut claimed: Vec<SeasonRef> = rows
            .iter()
            .map(|r| SeasonRef::new(r.get::<String, _>("season_id"), r.get::<String, _>("season_year")))
            .collect();

        if claimed.is_empty() {
            roll_up(&mut tx, competition_id, now).await?;
        } else {
            sqlx::query(
                r#"
                UPDATE competition_progress
                SET status = 'in_progress',
                    started_at = $1
                WHERE competition_id = $2
                  AND worker_id = $3
                  AND status IN ('in_progress', 'seasons_discovered')
                "#,
            )
            .bind(now)
            .bind(competition_id)
            .bind(worker_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        sort_newest_first(&mut claimed);
        Ok(claimed)
    }

    async fn complete_season(
        &self,
        competition_id: &str,
        season_id: &str,
        worker_id: &str,
        clubs_saved: i64,
        now: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let done = sqlx::query(
            r#"
            UPDATE season_progress
            SET status = 'completed',
                clubs_saved = $1,
                completed_at = $2,
                error_message = NULL
            WHERE competition_id = $3
              AND season_id = $4
              AND worker_id = $5
              AND status = 'in_progress'
            "#,
        )
        .bind(clubs_saved)
        .bind(now)
        .bind(competition_id)
        .bind(season_id)
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;
        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        roll_up(&mut tx, competition_id, now).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn fail_season(
        &self,
        competition_id: &str,
        season_id: &str,
        worker_id: &str,
        error: &str,
        now: i64,
    ) -> Result<Option<SeasonStatus>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            UPDATE season_progress
            SET status = CASE WHEN retry_count + 1 >= $1 THEN 'failed' ELSE 'pending' END,
                worker_id = CASE WHEN retry_count + 1 >= $1 THEN worker_id ELSE NULL END,
                retry_count = retry_count + 1,
                error_message = $2
            WHERE competition_id = $3
              AND season_id = $4
              AND worker_id = $5
              AND status = 'in_progress'
            RETURNING status
            "#,
        )
        .bind(MAX_SEASON_RETRIES)
        .bind(error)
        .bind(competition_id)
        .bind(season_id)
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let status = SeasonStatus::parse(&row.get::<String, _>("status"));
        if status == SeasonStatus::Failed {
            roll_up(&mut tx, competition_id, now).await?;
        }
        tx.commit().await?;
        Ok(Some(status))
    }

    async fn complete_seasons_before(
        &self,
        competition_id: &str,
        worker_id: &str,
        cutoff_year: i32,
        now: i64,
    ) -> Result<u64> {
        let rows = sqlx::query(
            r#"
            SELECT season_id, season_year
            FROM season_progress
            WHERE competition_id = $1
              AND status <> 'completed'
            "#,
        )
        .bind(competition_id)
        .fetch_all(&self.pool)
        .await?;
        let older: Vec<String> = rows
            .iter()
            .filter(|r| parse_year(&r.get::<String, _>("season_year")).is_some_and(|y| y < cutoff_year))
            .map(|r| r.get::<String, _>("season_id"))
            .collect();
        if older.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut marked = 0;
        for season_id in &older {
            let done = sqlx::query(
                r#"
                UPDATE season_progress
                SET status = 'completed',
                    clubs_saved = 0,
                    completed_at = $1,
                    worker_id = $2,
                    error_message = NULL
                WHERE competition_id = $3
                  AND season_id = $4
                  AND (status IN ('pending', 'failed')
                       OR (status = 'in_progress' AND worker_id = $2))
                "#,
            )
            .bind(now)
            .bind(worker_id)
            .bind(competition_id)
            .bind(season_id)
            .execute(&mut *tx)
            .await?;
            marked += done.rows_affected();
        }
        roll_up(&mut tx, competition_id, now).await?;
        tx.commit().await?;
        Ok(marked)
    }

    async fn recover_stale(&self, started_before: i64, now: i64) -> Result<RecoveryReport> {
        let mut tx = self.pool.begin().await?;
        let seasons = sqlx::query(
            r#"
            UPDATE season_progress
            SET status = CASE WHEN retry_count + 1 >= $1 THEN 'failed' ELSE 'pending' END,
                worker_id = CASE WHEN retry_count + 1 >= $1 THEN worker_id ELSE NULL END,
                retry_count = retry_count + 1,
                error_message = $2
            WHERE status = 'in_progress'
              AND (started_at IS NULL OR started_at < $3)
              AND retry_count < $1
            RETURNING competition_id, season_id, status
            "#,
        )
        .bind(MAX_SEASON_RETRIES)
        .bind(RECOVERED_MESSAGE)
        .bind(started_before)
        .fetch_all(&mut *tx)
        .await?;

        let mut exhausted_parents: Vec<String> = Vec::new();
        for row in &seasons {
            let competition_id: String = row.get("competition_id");
            let season_id: String = row.get("season_id");
            let status: String = row.get("status");
            tracing::info!(competition_id = %competition_id, season_id = %season_id, status = %status, "recovered stuck season");
            if status == "failed" && !exhausted_parents.contains(&competition_id) {
                exhausted_parents.push(competition_id);
            }
        }
        for competition_id in &exhausted_parents {
            roll_up(&mut tx, competition_id, now).await?;
        }

        let competitions = sqlx::query(
            r#"
            UPDATE competition_progress
            SET status = 'pending',
                worker_id = NULL,
                retry_count = retry_count + 1,
                error_message = $1
            WHERE status IN ('in_progress', 'seasons_discovered')
              AND (started_at IS NULL OR started_at < $2)
              AND NOT EXISTS (
                  SELECT 1 FROM season_progress s
                  WHERE s.competition_id = competition_progress.competition_id
                    AND s.status = 'in_progress'
              )
            RETURNING competition_id
            "#,
        )
        .bind(RECOVERED_MESSAGE)
        .bind(started_before)
        .fetch_all(&mut *tx)
        .await?;
        for row in &competitions {
            let competition_id: String = row.get("competition_id");
            tracing::info!(competition_id = %competition_id, "recovered stuck competition");
        }
        tx.commit().await?;

        Ok(RecoveryReport {
            seasons: seasons.len() as u64,
            competitions: competitions.len() as u64,
        })
    }

    async fn competition(&self, competition_id: &str) -> Result<Option<CompetitionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT competition_id, competition_url, status, seasons_discovered, worker_id,
                   started_at, completed_at, error_message, retry_count
            FROM competition_progress
            WHERE competition_id = $1
            "#,
        )
        .bind(competition_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| {
            let status: Option<String> = row.get("status");
            CompetitionRecord {
                competition_id: row.get("competition_id"),
                competition_url: row.get("competition_url"),
                status: CompetitionStatus::parse(status.as_deref()),
                seasons_discovered: row.get("seasons_discovered"),
                worker_id: row.get("worker_id"),
                started_at: row.get("started_at"),
                completed_at: row.get("completed_at"),
                error_message: row.get("error_message"),
                retry_count: row.get("retry_count"),
            }
        }))
    }

    async fn season(&self, competition_id: &str, season_id: &str) -> Result<Option<SeasonRecord>> {
        let sql = format!(
            "SELECT {} FROM season_progress WHERE competition_id = $1 AND season_id = $2",
            SEASON_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(competition_id)
            .bind(season_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(season_from_row))
    }

    async fn seasons(&self, competition_id: &str) -> Result<Vec<SeasonRecord>> {
        let sql = format!(
            "SELECT {} FROM season_progress WHERE competition_id = $1 ORDER BY season_year DESC, season_id",
            SEASON_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(competition_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(season_from_row).collect())
    }

    async fn failed_seasons(&self) -> Result<Vec<SeasonRecord>> {
        let sql = format!(
            "SELECT {} FROM season_progress WHERE status = 'failed' \
             ORDER BY retry_count DESC, competition_id, season_year",
            SEASON_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(season_from_row).collect())
    }

    async fn reset_failed_seasons(&self, competition_id: Option<&str>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let reset = sqlx::query(
            r#"
            UPDATE season_progress
            SET status = 'pending',
                retry_count = 0,
                worker_id = NULL,
                error_message = NULL
            WHERE status = 'failed'
              AND ($1::TEXT IS NULL OR competition_id = $1)
            "#,
        )
        .bind(competition_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            UPDATE competition_progress
            SET status = 'pending',
                worker_id = NULL,
                completed_at = NULL,
                error_message = NULL
            WHERE status = 'failed'
              AND ($1::TEXT IS NULL OR competition_id = $1)
              AND EXISTS (
                  SELECT 1 FROM season_progress s
                  WHERE s.competition_id = competition_progress.competition_id
                    AND s.status = 'pending'
              )
            "#,
        )
        .bind(competition_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(reset.rows_affected())
    }

    async fn reset_competition(&self, competition_id: &str) -> Result<u64> {
        // Seasons before the parent, the same lock order as every season write.
        let mut tx = self.pool.begin().await?;
        let seasons = sqlx::query(
            r#"
            UPDATE season_progress
            SET status = 'pending',
                retry_count = 0,
                worker_id = NULL,
                started_at = NULL,
                completed_at = NULL,
                error_message = NULL,
                clubs_saved = 0
            WHERE competition_id = $1
            "#,
        )
        .bind(competition_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            UPDATE competition_progress
            SET status = 'pending',
                worker_id = NULL,
                started_at = NULL,
                completed_at = NULL,
                error_message = NULL
            WHERE competition_id = $1
            "#,
        )
        .bind(competition_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(seasons.rows_affected())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM season_progress").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM competition_progress").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn summary(&self) -> Result<StoreSummary> {
        let mut out = StoreSummary::default();

        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM competition_progress GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            let status: Option<String> = row.get("status");
            out.competitions.add(status.as_deref(), row.get("n"));
        }

        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM season_progress GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            let status: Option<String> = row.get("status");
            out.seasons.add(status.as_deref(), row.get("n"));
        }

        out.clubs_saved = sqlx::query_scalar(
            "SELECT CAST(COALESCE(SUM(clubs_saved), 0) AS BIGINT) FROM season_progress",
        )
        .fetch_one(&self.pool)
        .await?;

        out.active_workers = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM (
                SELECT worker_id FROM season_progress
                WHERE status = 'in_progress' AND worker_id IS NOT NULL
                UNION
                SELECT worker_id FROM competition_progress
                WHERE status IN ('in_progress', 'seasons_discovered') AND worker_id IS NOT NULL
            ) AS active
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(out)
    }
}
