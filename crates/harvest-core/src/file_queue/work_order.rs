//! Worker-side bookkeeping for one claimed work order.
//!
//! In file-queue mode the worker has no progress database. The work order
//! lists the season years the host already has; everything the worker does
//! with the rest is kept here and travels back in the completed item.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};

use super::types::WorkItem;
use crate::unit::{sort_newest_first, SeasonRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Latest outcome of one season handled during this work order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedSeason {
    pub season_id: String,
    pub season_year: String,
    pub status: SeasonState,
    pub clubs_scraped: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkOrderSummary {
    pub competition_id: String,
    pub total_seasons_discovered: usize,
    pub seasons_processed: usize,
    pub seasons_completed: usize,
    pub seasons_failed: usize,
    pub seasons_skipped: usize,
    pub total_clubs_scraped: u64,
}

/// Season states for the competition of one claimed [`WorkItem`].
#[derive(Debug, Clone)]
pub struct WorkOrderTracker {
    work_id: String,
    competition_id: String,
    already_done: BTreeSet<String>,
    seasons: Vec<SeasonRef>,
    skipped: usize,
    states: HashMap<String, SeasonState>,
    processed: Vec<ProcessedSeason>,
    started_at: DateTime<Utc>,
}

impl WorkOrderTracker {
    pub fn new(item: &WorkItem) -> Self {
        Self {
            work_id: item.work_id.clone(),
            competition_id: item.competition_id.clone(),
            already_done: item
                .completed_seasons
                .iter()
                .map(|y| y.trim().to_string())
                .collect(),
            seasons: Vec::new(),
            skipped: 0,
            states: HashMap::new(),
            processed: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn competition_id(&self) -> &str {
        &self.competition_id
    }

    /// Register the seasons found for the competition and return the ones
    /// still to do, newest first. Years listed in the work order's
    /// `completed_seasons` are skipped. Re-discovery keeps known states.
    pub fn discover(&mut self, found: &[SeasonRef]) -> Vec<SeasonRef> {
        let mut todo = Vec::new();
        let mut skipped = 0;
        for season in found {
            if self.already_done.contains(season.year.trim()) {
                skipped += 1;
                continue;
            }
            if todo.iter().any(|s: &SeasonRef| s.season_id == season.season_id) {
                continue;
            }
            self.states
                .entry(season.season_id.clone())
                .or_insert(SeasonState::Pending);
            todo.push(season.clone());
        }
        sort_newest_first(&mut todo);
        self.seasons = todo.clone();
        self.skipped = skipped;
        tracing::info!(
            work_id = %self.work_id,
            competition_id = %self.competition_id,
            discovered = found.len(),
            pending = todo.len(),
            skipped,
            "seasons discovered"
        );
        todo
    }

    /// Seasons not yet completed (pending or failed), newest first.
    pub fn pending(&self) -> Vec<SeasonRef> {
        self.seasons
            .iter()
            .filter(|s| {
                matches!(
                    self.state(&s.season_id),
                    Some(SeasonState::Pending | SeasonState::Failed)
                )
            })
            .cloned()
            .collect()
    }

    pub fn state(&self, season_id: &str) -> Option<SeasonState> {
        self.states.get(season_id).copied()
    }

    /// Completed during this run, or skipped because the host already had it.
    pub fn is_season_completed(&self, season: &SeasonRef) -> bool {
        self.already_done.contains(season.year.trim())
            || self.state(&season.season_id) == Some(SeasonState::Completed)
    }

    /// Pending or failed -> in progress. False for unknown or finished seasons.
    pub fn start(&mut self, season_id: &str) -> bool {
        match self.states.get_mut(season_id) {
            Some(state @ (SeasonState::Pending | SeasonState::Failed)) => {
                *state = SeasonState::InProgress;
                tracing::debug!(competition_id = %self.competition_id, season_id, "season started");
                true
            }
            _ => false,
        }
    }

    pub fn complete(&mut self, season_id: &str, clubs_scraped: u32) -> bool {
        if !self.finish(season_id, SeasonState::Completed, clubs_scraped, None) {
            return false;
        }
        tracing::info!(competition_id = %self.competition_id, season_id, clubs_scraped, "season completed");
        true
    }

    /// Failed seasons stay eligible in [`pending`](Self::pending).
    pub fn fail(&mut self, season_id: &str, error: &str) -> bool {
        if !self.finish(season_id, SeasonState::Failed, 0, Some(error.to_string())) {
            return false;
        }
        tracing::warn!(competition_id = %self.competition_id, season_id, "season failed: {}", error);
        true
    }

    fn finish(&mut self, season_id: &str, to: SeasonState, clubs_scraped: u32, error: Option<String>) -> bool {
        let Some(state) = self.states.get_mut(season_id) else {
            tracing::warn!(competition_id = %self.competition_id, season_id, "outcome for unknown season ignored");
            return false;
        };
        if *state == SeasonState::Completed {
            return false;
        }
        *state = to;

        let season_year = self
            .seasons
            .iter()
            .find(|s| s.season_id == season_id)
            .map_or_else(|| season_id.to_string(), |s| s.year.clone());
        let record = ProcessedSeason {
            season_id: season_id.to_string(),
            season_year,
            status: to,
            clubs_scraped,
            error,
            finished_at: Utc::now(),
        };
        match self.processed.iter_mut().find(|p| p.season_id == season_id) {
            Some(existing) => *existing = record,
            None => self.processed.push(record),
        }
        true
    }

    pub fn processed(&self) -> &[ProcessedSeason] {
        &self.processed
    }

    pub fn summary(&self) -> WorkOrderSummary {
        let count = |s: SeasonState| self.processed.iter().filter(|p| p.status == s).count();
        WorkOrderSummary {
            competition_id: self.competition_id.clone(),
            total_seasons_discovered: self.seasons.len(),
            seasons_processed: self.processed.len(),
            seasons_completed: count(SeasonState::Completed),
            seasons_failed: count(SeasonState::Failed),
            seasons_skipped: self.skipped,
            total_clubs_scraped: self.processed.iter().map(|p| u64::from(p.clubs_scraped)).sum(),
        }
    }

    /// Result fields for [`FileQueue::submit_completed`](super::FileQueue::submit_completed).
    pub fn results(&self) -> Map<String, Value> {
        let summary = self.summary();
        let mut out = Map::new();
        out.insert("seasons_processed".into(), json!(self.processed));
        out.insert("seasons_completed".into(), json!(summary.seasons_completed));
        out.insert("seasons_failed".into(), json!(summary.seasons_failed));
        out.insert("seasons_skipped".into(), json!(summary.seasons_skipped));
        out.insert("total_clubs_scraped".into(), json!(summary.total_clubs_scraped));
        out.insert(
            "execution_time_seconds".into(),
            json!((Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0),
        );
        out
    }
}
