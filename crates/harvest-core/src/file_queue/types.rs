//! Queue file types: work items, claim attempts, and status counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state of a work item. Always equal to the folder holding its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Available,
    Claimed,
    Completed,
    Failed,
}

impl WorkStatus {
    pub const ALL: [WorkStatus; 4] = [
        WorkStatus::Available,
        WorkStatus::Claimed,
        WorkStatus::Completed,
        WorkStatus::Failed,
    ];

    /// Folder name inside the queue root.
    pub fn folder(self) -> &'static str {
        match self {
            WorkStatus::Available => "available",
            WorkStatus::Claimed => "claimed",
            WorkStatus::Completed => "completed",
            WorkStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.folder())
    }
}

/// Field names owned by the queue; result payloads may not overwrite them.
pub const RESERVED_FIELDS: &[&str] = &[
    "work_id",
    "competition_id",
    "competition_url",
    "completed_seasons",
    "status",
    "created_at",
    "retry_count",
    "claimed_by",
    "claimed_at",
    "claim_id",
    "completed_at",
    "failed_at",
    "error_message",
];

/// One unit of work as stored in a queue JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub work_id: String,
    pub competition_id: String,
    pub competition_url: String,
    #[serde(default)]
    pub completed_seasons: Vec<String>,
    pub status: WorkStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Result fields written by the worker, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkItem {
    /// Fresh available item for a competition.
    pub fn new(
        competition_id: &str,
        competition_url: &str,
        completed_seasons: Vec<String>,
    ) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            work_id: format!("comp_{}_{}", competition_id, &suffix[..8]),
            competition_id: competition_id.to_string(),
            competition_url: competition_url.to_string(),
            completed_seasons,
            status: WorkStatus::Available,
            created_at: Utc::now(),
            retry_count: 0,
            claimed_by: None,
            claimed_at: None,
            claim_id: None,
            completed_at: None,
            failed_at: None,
            error_message: None,
            extra: Map::new(),
        }
    }

    /// Stem of the file name used in `claimed`, `completed` and `failed`:
    /// `{claimant}_{unix_ts}_{work_id}`, or the bare work id when unclaimed.
    pub fn file_id(&self) -> String {
        match (&self.claimed_by, &self.claimed_at) {
            (Some(by), Some(at)) => format!("{}_{}_{}", by, at.timestamp(), self.work_id),
            _ => self.work_id.clone(),
        }
    }

    /// Copy with claim and outcome metadata dropped, ready to go back to `available`.
    pub fn requeued(&self) -> Self {
        let mut item = self.clone();
        item.status = WorkStatus::Available;
        item.retry_count = self.retry_count.saturating_add(1);
        item.claimed_by = None;
        item.claimed_at = None;
        item.claim_id = None;
        item.completed_at = None;
        item.failed_at = None;
        item.error_message = None;
        item
    }

    /// Merge worker results into `extra`, skipping keys the queue owns.
    pub fn merge_results(&mut self, results: &Map<String, Value>) {
        for (key, value) in results {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                tracing::warn!(work_id = %self.work_id, field = %key, "ignoring reserved result field");
                continue;
            }
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

/// Ephemeral record written during the claim race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAttempt {
    pub work_id: String,
    pub claimant_id: String,
    /// Unix milliseconds.
    pub claimed_at: i64,
    pub claim_id: String,
}

impl ClaimAttempt {
    pub fn new(work_id: &str, claimant_id: &str, claimed_at_ms: i64, suffix: &str) -> Self {
        Self {
            work_id: work_id.to_string(),
            claimant_id: claimant_id.to_string(),
            claimed_at: claimed_at_ms,
            claim_id: format!("{:013}_{}_{}", claimed_at_ms.max(0), suffix, claimant_id),
        }
    }

    /// File name inside `claim_attempts/`. Sorting these names orders the
    /// attempts for one work id by timestamp, then by random suffix.
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.work_id, self.claim_id)
    }
}

/// Fields recovered from a claim-attempt file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptName<'a> {
    pub claimed_at: i64,
    pub suffix: &'a str,
    pub claimant_id: &'a str,
}

/// Parse `{work_id}_{ts:013}_{suffix}_{claimant}.json` for the given work id.
/// Names belonging to other work ids (or malformed) yield `None`.
pub fn parse_attempt_name<'a>(work_id: &str, name: &'a str) -> Option<AttemptName<'a>> {
    let rest = name.strip_prefix(work_id)?.strip_prefix('_')?;
    let rest = rest.strip_suffix(".json")?;
    let mut parts = rest.splitn(3, '_');
    let ts = parts.next()?;
    let suffix = parts.next()?;
    let claimant_id = parts.next()?;
    if ts.len() != 13 || !ts.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if suffix.is_empty() || claimant_id.is_empty() {
        return None;
    }
    Some(AttemptName {
        claimed_at: ts.parse().ok()?,
        suffix,
        claimant_id,
    })
}

/// Item counts per queue folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub available: usize,
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Result of asking to put a failed item back into circulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Moved back to `available`; `pushed` is false when only the local copy changed.
    Requeued { pushed: bool },
    /// Retry ceiling reached; the item stays in `failed`.
    Exhausted,
    /// No matching file in `failed`.
    NotFound,
}
