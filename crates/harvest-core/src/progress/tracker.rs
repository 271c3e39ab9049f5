//! Worker-facing progress tracker over a [`ProgressStore`].
//!
//! Adds the worker identity, wall-clock timestamps, and a time-gated stale
//! job sweep that piggybacks on claim calls, so a crashed worker's rows are
//! released without a separate reaper process.

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::store::ProgressStore;
use super::types::{
    CompetitionStatus, ProgressSummary, RecoveryReport, SeasonRecord, SeasonStatus,
};
use crate::clock::unix_timestamp;
use crate::config::TrackerConfig;
use crate::unit::SeasonRef;

pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    worker_id: String,
    stale_after: Duration,
    recovery_interval: Duration,
    last_recovery: Mutex<Instant>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>, worker_id: impl Into<String>, cfg: &TrackerConfig) -> Self {
        Self {
            store,
            worker_id: worker_id.into(),
            stale_after: Duration::from_secs(cfg.stale_after_secs),
            recovery_interval: Duration::from_secs(cfg.recovery_interval_secs),
            last_recovery: Mutex::new(Instant::now()),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    /// Run the stale sweep if the recovery interval has passed since the last one.
    async fn maybe_recover(&self) {
        let due = match self.last_recovery.lock() {
            Ok(mut last) if last.elapsed() >= self.recovery_interval => {
                *last = Instant::now();
                true
            }
            Ok(_) => false,
            Err(_) => false,
        };
        if !due {
            return;
        }
        if let Err(e) = self.recover_stale().await {
            tracing::warn!(worker_id = %self.worker_id, "stale job recovery failed: {:#}", e);
        }
    }

    /// Claim a competition. False means another worker holds it or it is finished.
    pub async fn claim_parent(&self, competition_id: &str, competition_url: &str) -> Result<bool> {
        self.maybe_recover().await;
        let won = self
            .store
            .claim_competition(competition_id, competition_url, &self.worker_id, unix_timestamp())
            .await?;
        if won {
            tracing::info!(competition_id, worker_id = %self.worker_id, "claimed competition");
        } else {
            tracing::info!(competition_id, worker_id = %self.worker_id, "competition held elsewhere or finished");
        }
        Ok(won)
    }

    /// Record the seasons found for a competition we hold.
    pub async fn discover_children(&self, competition_id: &str, seasons: &[SeasonRef]) -> Result<bool> {
        let owned = self
            .store
            .discover_seasons(competition_id, &self.worker_id, seasons)
            .await?;
        if owned {
            tracing::info!(competition_id, seasons = seasons.len(), "seasons discovered");
        } else {
            tracing::warn!(competition_id, worker_id = %self.worker_id, "not the owner, season discovery ignored");
        }
        Ok(owned)
    }

    /// Claim every claimable season of a competition, newest first.
    pub async fn claim_children(&self, competition_id: &str) -> Result<Vec<SeasonRef>> {
        self.maybe_recover().await;
        let seasons = self
            .store
            .claim_seasons(competition_id, &self.worker_id, unix_timestamp())
            .await?;
        tracing::info!(competition_id, claimed = seasons.len(), "claimed seasons");
        Ok(seasons)
    }

    pub async fn complete_child(&self, competition_id: &str, season_id: &str, clubs_saved: i64) -> Result<bool> {
        let done = self
            .store
            .complete_season(competition_id, season_id, &self.worker_id, clubs_saved, unix_timestamp())
            .await?;
        if done {
            tracing::info!(competition_id, season_id, clubs_saved, "season completed");
        } else {
            tracing::warn!(competition_id, season_id, worker_id = %self.worker_id, "season not held, completion ignored");
        }
        Ok(done)
    }

    /// Record a season failure. Returns the season's new status, if it was ours.
    pub async fn fail_child(&self, competition_id: &str, season_id: &str, error: &str) -> Result<Option<SeasonStatus>> {
        let status = self
            .store
            .fail_season(competition_id, season_id, &self.worker_id, error, unix_timestamp())
            .await?;
        match status {
            Some(SeasonStatus::Failed) => {
                tracing::warn!(competition_id, season_id, "season failed permanently: {}", error)
            }
            Some(status) => {
                tracing::info!(competition_id, season_id, %status, "season failed, will retry: {}", error)
            }
            None => {
                tracing::warn!(competition_id, season_id, worker_id = %self.worker_id, "season not held, failure ignored")
            }
        }
        Ok(status)
    }

    /// Mark seasons before `cutoff_year` as completed with zero clubs.
    pub async fn complete_children_before(&self, competition_id: &str, cutoff_year: i32) -> Result<u64> {
        let n = self
            .store
            .complete_seasons_before(competition_id, &self.worker_id, cutoff_year, unix_timestamp())
            .await?;
        tracing::info!(competition_id, cutoff_year, seasons = n, "marked older seasons complete with no data");
        Ok(n)
    }

    /// Release rows stuck in progress for longer than the staleness threshold.
    pub async fn recover_stale(&self) -> Result<u64> {
        let now = unix_timestamp();
        let threshold = now - self.stale_after.as_secs() as i64;
        let report: RecoveryReport = self.store.recover_stale(threshold, now).await?;
        if report.total() > 0 {
            tracing::info!(
                seasons = report.seasons,
                competitions = report.competitions,
                "recovered stuck work"
            );
        }
        Ok(report.total())
    }

    pub async fn summary(&self) -> Result<ProgressSummary> {
        Ok(ProgressSummary {
            store: self.store.summary().await?,
            worker_id: self.worker_id.clone(),
            dialect: self.store.dialect().as_str(),
        })
    }

    pub async fn is_competition_completed(&self, competition_id: &str) -> Result<bool> {
        Ok(self.competition_status(competition_id).await? == Some(CompetitionStatus::Completed))
    }

    pub async fn competition_status(&self, competition_id: &str) -> Result<Option<CompetitionStatus>> {
        Ok(self.store.competition(competition_id).await?.map(|c| c.status))
    }

    pub async fn is_season_completed(&self, competition_id: &str, season_id: &str) -> Result<bool> {
        Ok(self
            .store
            .season(competition_id, season_id)
            .await?
            .is_some_and(|s| s.status == SeasonStatus::Completed))
    }

    pub async fn failed_seasons(&self) -> Result<Vec<SeasonRecord>> {
        self.store.failed_seasons().await
    }

    pub async fn reset_failed(&self, competition_id: Option<&str>) -> Result<u64> {
        let n = self.store.reset_failed_seasons(competition_id).await?;
        tracing::info!(seasons = n, "reset failed seasons to pending");
        Ok(n)
    }

    pub async fn reset_competition(&self, competition_id: &str) -> Result<u64> {
        let n = self.store.reset_competition(competition_id).await?;
        tracing::info!(competition_id, seasons = n, "competition reset to pending");
        Ok(n)
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear_all().await?;
        tracing::warn!("all progress cleared");
        Ok(())
    }
}
