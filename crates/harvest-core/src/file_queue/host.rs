//! Host-side and operator operations: seeding work, listings, archival,
//! and releasing claims held by workers that disappeared.

use anyhow::Result;
use chrono::Utc;
use std::time::Duration;

use super::layout::remove_if_exists;
use super::types::{QueueStatus, RetryOutcome, WorkItem, WorkStatus};
use super::{FileQueue, Published, Remote};

impl<R: Remote> FileQueue<R> {
    /// Item counts per folder after a best-effort pull.
    pub fn status(&mut self) -> Result<QueueStatus> {
        self.refresh();
        Ok(QueueStatus {
            available: self.layout.count(WorkStatus::Available)?,
            claimed: self.layout.count(WorkStatus::Claimed)?,
            completed: self.layout.count(WorkStatus::Completed)?,
            failed: self.layout.count(WorkStatus::Failed)?,
        })
    }

    /// Publish a new available item. Returns its work id, and whether the
    /// remote accepted it.
    pub fn create_work_order(
        &mut self,
        competition_id: &str,
        competition_url: &str,
        completed_seasons: Vec<String>,
    ) -> Result<(String, bool)> {
        let item = WorkItem::new(competition_id, competition_url, completed_seasons);
        let path = self.layout.available_path(&item.work_id);
        let message = format!("Create work order {} for {}", item.work_id, competition_id);
        let pushed = match self.publish(&message, |layout| layout.write_item(&path, &item).map(Some)) {
            Published::Pushed(()) => true,
            Published::Unpushed(()) | Published::Skipped => false,
            Published::SyncFailed(e) => {
                tracing::warn!(work_id = %item.work_id, "remote unreachable, work order kept locally: {}", e);
                self.layout.ensure_dirs()?;
                self.layout.write_item(&path, &item)?;
                false
            }
            Published::Failed(e) => return Err(e),
        };
        tracing::info!(work_id = %item.work_id, competition_id, pushed, "created work order");
        Ok((item.work_id, pushed))
    }

    fn list(&mut self, status: WorkStatus) -> Result<Vec<WorkItem>> {
        self.refresh();
        Ok(self
            .layout
            .read_items(status)?
            .into_iter()
            .map(|(_, item)| item)
            .collect())
    }

    pub fn completed_work(&mut self) -> Result<Vec<WorkItem>> {
        self.list(WorkStatus::Completed)
    }

    pub fn failed_work(&mut self) -> Result<Vec<WorkItem>> {
        self.list(WorkStatus::Failed)
    }

    pub fn claimed_work(&mut self) -> Result<Vec<WorkItem>> {
        self.list(WorkStatus::Claimed)
    }

    /// Remove a processed completed item from the queue.
    pub fn archive(&mut self, item: &WorkItem) -> Result<bool> {
        let path = self.layout.item_path(WorkStatus::Completed, item);
        let outcome = self.publish(&format!("Archive {}", item.work_id), |_| {
            Ok(remove_if_exists(&path)?.then_some(()))
        });
        match outcome {
            Published::Pushed(()) => {
                tracing::info!(work_id = %item.work_id, "archived");
                Ok(true)
            }
            Published::Skipped => Ok(false),
            Published::Unpushed(()) => Ok(false),
            Published::SyncFailed(e) => {
                tracing::warn!(work_id = %item.work_id, "cannot archive, remote unreachable: {}", e);
                Ok(false)
            }
            Published::Failed(e) => Err(e),
        }
    }

    /// Requeue every failed item still under the retry ceiling.
    /// Returns (requeued, exhausted).
    pub fn retry_failed(&mut self, max_retries: u32) -> Result<(usize, usize)> {
        let mut requeued = 0;
        let mut exhausted = 0;
        for item in self.failed_work()? {
            match self.retry(&item, max_retries)? {
                RetryOutcome::Requeued { .. } => requeued += 1,
                RetryOutcome::Exhausted => exhausted += 1,
                RetryOutcome::NotFound => {}
            }
        }
        Ok((requeued, exhausted))
    }

    /// Return claims older than `max_age` to `available` with
    /// `retry_count + 1`. Returns how many were released.
    pub fn release_stale_claims(&mut self, max_age: Duration) -> Result<usize> {
        let max_age = chrono::Duration::from_std(max_age)?;
        let outcome = self.publish("Release stale claims", |layout| {
            let cutoff = Utc::now() - max_age;
            let mut released = Vec::new();
            for (path, item) in layout.read_items(WorkStatus::Claimed)? {
                if item.claimed_at.is_some_and(|at| at > cutoff) {
                    continue;
                }
                let back = item.requeued();
                layout.write_item(&layout.available_path(&back.work_id), &back)?;
                remove_if_exists(&path)?;
                released.push(back.work_id);
            }
            Ok((!released.is_empty()).then_some(released))
        });
        let released = match outcome {
            Published::Pushed(ids) => ids,
            Published::Unpushed(ids) => {
                tracing::warn!(count = ids.len(), "released claims locally, push failed");
                ids
            }
            Published::Skipped => Vec::new(),
            Published::SyncFailed(e) => {
                tracing::warn!("cannot release stale claims, remote unreachable: {}", e);
                Vec::new()
            }
            Published::Failed(e) => return Err(e),
        };
        for work_id in &released {
            tracing::info!(work_id = %work_id, "released stale claim");
        }
        Ok(released.len())
    }
}
