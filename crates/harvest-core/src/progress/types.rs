//! Row types and status enums for the progress tables.

use serde::Serialize;

/// A season failing this many times is terminal.
pub const MAX_SEASON_RETRIES: i64 = 3;

/// Error message written by stale-job recovery.
pub const RECOVERED_MESSAGE: &str = "Recovered from stuck worker";

/// Competition lifecycle state stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionStatus {
    Pending,
    InProgress,
    SeasonsDiscovered,
    Completed,
    Failed,
}

impl CompetitionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CompetitionStatus::Pending => "pending",
            CompetitionStatus::InProgress => "in_progress",
            CompetitionStatus::SeasonsDiscovered => "seasons_discovered",
            CompetitionStatus::Completed => "completed",
            CompetitionStatus::Failed => "failed",
        }
    }

    /// NULL or unknown strings read as pending (claimable).
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("in_progress") => CompetitionStatus::InProgress,
            Some("seasons_discovered") => CompetitionStatus::SeasonsDiscovered,
            Some("completed") => CompetitionStatus::Completed,
            Some("failed") => CompetitionStatus::Failed,
            _ => CompetitionStatus::Pending,
        }
    }
}

impl std::fmt::Display for CompetitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Season lifecycle state stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SeasonStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SeasonStatus::Pending => "pending",
            SeasonStatus::InProgress => "in_progress",
            SeasonStatus::Completed => "completed",
            SeasonStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => SeasonStatus::InProgress,
            "completed" => SeasonStatus::Completed,
            "failed" => SeasonStatus::Failed,
            _ => SeasonStatus::Pending,
        }
    }
}

impl std::fmt::Display for SeasonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `competition_progress` row. Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompetitionRecord {
    pub competition_id: String,
    pub competition_url: String,
    pub status: CompetitionStatus,
    pub seasons_discovered: i64,
    pub worker_id: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
    pub retry_count: i64,
}

/// One `season_progress` row. Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeasonRecord {
    pub competition_id: String,
    pub season_id: String,
    pub season_year: String,
    pub status: SeasonStatus,
    pub worker_id: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub clubs_saved: i64,
}

/// Rows returned to service by one stale-job sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub seasons: u64,
    pub competitions: u64,
}

impl RecoveryReport {
    pub fn total(&self) -> u64 {
        self.seasons + self.competitions
    }
}

/// Row counts per status for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub seasons_discovered: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StatusCounts {
    /// Add `n` rows with the given status string.
    pub fn add(&mut self, status: Option<&str>, n: i64) {
        self.total += n;
        match status {
            Some("in_progress") => self.in_progress += n,
            Some("seasons_discovered") => self.seasons_discovered += n,
            Some("completed") => self.completed += n,
            Some("failed") => self.failed += n,
            _ => self.pending += n,
        }
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }
}

/// Aggregate view of both tables as seen by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSummary {
    pub competitions: StatusCounts,
    pub seasons: StatusCounts,
    pub clubs_saved: i64,
    pub active_workers: i64,
}

/// Summary handed to operators: store totals plus who is asking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    #[serde(flatten)]
    pub store: StoreSummary,
    pub worker_id: String,
    pub dialect: &'static str,
}

/// Numeric year of a season label, if it is one.
pub(crate) fn parse_year(label: &str) -> Option<i32> {
    label.trim().parse().ok()
}
