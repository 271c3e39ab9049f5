//! Worker-side outcomes: completion, failure, and requeueing failed items.

use anyhow::Result;
use chrono::Utc;
use serde_json::{Map, Value};

use super::layout::{remove_if_exists, QueueLayout};
use super::types::{RetryOutcome, WorkItem, WorkStatus};
use super::{FileQueue, Published, Remote};

/// Write `item` into its outcome folder and drop every other trace of the
/// work id (claimed file, stray available file, claim attempts).
fn settle(layout: &QueueLayout, item: &WorkItem) -> Result<()> {
    layout.write_item(&layout.item_path(item.status, item), item)?;
    remove_if_exists(&layout.item_path(WorkStatus::Claimed, item))?;
    remove_if_exists(&layout.available_path(&item.work_id))?;
    layout.remove_attempts(&item.work_id)?;
    Ok(())
}

impl<R: Remote> FileQueue<R> {
    /// Move a claimed item to `completed` with the worker's result fields.
    /// Returns whether the change reached the remote; the local file is
    /// written either way.
    pub fn submit_completed(&mut self, item: &WorkItem, results: &Map<String, Value>) -> Result<bool> {
        let mut done = item.clone();
        done.status = WorkStatus::Completed;
        done.completed_at = Some(Utc::now());
        done.merge_results(results);
        let pushed = self.settle_outcome(&format!("Complete {}", item.work_id), &done)?;
        tracing::info!(work_id = %item.work_id, competition_id = %item.competition_id, pushed, "completed");
        Ok(pushed)
    }

    /// Move a claimed item to `failed` with the error message.
    pub fn submit_failed(&mut self, item: &WorkItem, error: &str) -> Result<bool> {
        let mut failed = item.clone();
        failed.status = WorkStatus::Failed;
        failed.failed_at = Some(Utc::now());
        failed.error_message = Some(error.to_string());
        let pushed = self.settle_outcome(&format!("Fail {}", item.work_id), &failed)?;
        tracing::info!(work_id = %item.work_id, competition_id = %item.competition_id, pushed, "failed: {}", error);
        Ok(pushed)
    }

    fn settle_outcome(&mut self, message: &str, item: &WorkItem) -> Result<bool> {
        match self.publish(message, |layout| settle(layout, item).map(Some)) {
            Published::Pushed(()) => Ok(true),
            Published::Unpushed(()) | Published::Skipped => Ok(false),
            Published::SyncFailed(e) => {
                tracing::warn!(work_id = %item.work_id, "remote unreachable, keeping outcome locally: {}", e);
                self.layout.ensure_dirs()?;
                settle(&self.layout, item)?;
                Ok(false)
            }
            Published::Failed(e) => Err(e),
        }
    }

    /// Put a failed item back into `available` with `retry_count + 1`,
    /// unless it has already been retried `max_retries` times.
    pub fn retry(&mut self, item: &WorkItem, max_retries: u32) -> Result<RetryOutcome> {
        if item.retry_count >= max_retries {
            tracing::info!(work_id = %item.work_id, retry_count = item.retry_count, "retry limit reached, leaving in failed");
            return Ok(RetryOutcome::Exhausted);
        }
        let requeued = item.requeued();
        let failed_path = self.layout.item_path(WorkStatus::Failed, item);
        let requeue = |layout: &QueueLayout| -> Result<Option<()>> {
            if !failed_path.exists() {
                return Ok(None);
            }
            layout.write_item(&layout.available_path(&requeued.work_id), &requeued)?;
            remove_if_exists(&failed_path)?;
            Ok(Some(()))
        };
        let message = format!("Requeue {} (retry {})", item.work_id, requeued.retry_count);
        let pushed = match self.publish(&message, &requeue) {
            Published::Pushed(()) => true,
            Published::Unpushed(()) => false,
            Published::Skipped => {
                tracing::debug!(work_id = %item.work_id, "failed file already gone, nothing to requeue");
                return Ok(RetryOutcome::NotFound);
            }
            Published::SyncFailed(e) => {
                tracing::warn!(work_id = %item.work_id, "remote unreachable, requeueing locally: {}", e);
                if requeue(&self.layout)?.is_none() {
                    return Ok(RetryOutcome::NotFound);
                }
                false
            }
            Published::Failed(e) => return Err(e),
        };
        tracing::info!(work_id = %item.work_id, retry_count = requeued.retry_count, pushed, "requeued");
        Ok(RetryOutcome::Requeued { pushed })
    }
}
