//! Optimistic claim race.
//!
//! 1. publish a claim attempt for the oldest free item;
//! 2. pull again so every competing attempt pushed before ours is visible;
//! 3. the smallest live attempt name for the work id wins;
//! 4. the winner moves the item to `claimed` and clears all attempts, the
//!    loser withdraws its own attempt.
//!
//! The winner re-checks both the available file and the attempt ordering
//! against a fresh pull before its final push. Since pushes are
//! compare-and-swap, only one finalisation can ever land per item.

use anyhow::Result;
use chrono::Utc;
use rand::Rng;

use super::layout::{remove_if_exists, QueueLayout};
use super::types::{parse_attempt_name, ClaimAttempt, WorkItem, WorkStatus};
use super::{FileQueue, Published, Remote};
use crate::clock::unix_millis;
use crate::retry::run_with_retry;

/// Winning attempt among `names` for `work_id`: the lexicographically
/// smallest well-formed name. Names for other work ids are ignored.
pub fn resolve_winner<'a, S: AsRef<str>>(work_id: &str, names: &'a [S]) -> Option<&'a str> {
    names
        .iter()
        .map(AsRef::as_ref)
        .filter(|n| parse_attempt_name(work_id, n).is_some())
        .min()
}

/// Attempt names for `work_id` that are younger than the ttl.
fn live_attempts(layout: &QueueLayout, work_id: &str, now_ms: i64, ttl_ms: i64) -> Result<Vec<String>> {
    Ok(layout
        .attempt_names(work_id)?
        .into_iter()
        .filter(|n| {
            parse_attempt_name(work_id, n).is_some_and(|a| now_ms - a.claimed_at < ttl_ms)
        })
        .collect())
}

/// Oldest available item without a live attempt by another worker.
fn pick_available(
    layout: &QueueLayout,
    worker_id: &str,
    now_ms: i64,
    ttl_ms: i64,
) -> Result<Option<WorkItem>> {
    let mut items: Vec<WorkItem> = layout
        .read_items(WorkStatus::Available)?
        .into_iter()
        .map(|(_, item)| item)
        .collect();
    items.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.work_id.cmp(&b.work_id))
    });
    for item in items {
        let contested = live_attempts(layout, &item.work_id, now_ms, ttl_ms)?
            .iter()
            .filter_map(|n| parse_attempt_name(&item.work_id, n))
            .any(|a| a.claimant_id != worker_id);
        if contested {
            tracing::debug!(work_id = %item.work_id, "skipping item with a pending claim attempt");
            continue;
        }
        return Ok(Some(item));
    }
    Ok(None)
}

fn random_suffix() -> String {
    format!("{:08x}", rand::thread_rng().gen::<u32>())
}

enum Verdict {
    Won,
    Lost(&'static str),
}

impl<R: Remote> FileQueue<R> {
    fn ttl_ms(&self) -> i64 {
        self.attempt_ttl.as_millis().min(i64::MAX as u128) as i64
    }

    /// Race for the oldest available item. `Ok(None)` means nothing was
    /// claimable, the race was lost, or the remote could not be reached.
    pub fn claim(&mut self, worker_id: &str) -> Result<Option<WorkItem>> {
        let ttl_ms = self.ttl_ms();

        let announced = self.publish(&format!("Claim attempt by {}", worker_id), |layout| {
            let now = unix_millis();
            let Some(item) = pick_available(layout, worker_id, now, ttl_ms)? else {
                return Ok(None);
            };
            let attempt = ClaimAttempt::new(&item.work_id, worker_id, now, &random_suffix());
            layout.write_attempt(&attempt)?;
            Ok(Some((item, attempt)))
        });

        let (item, attempt) = match announced {
            Published::Pushed(v) => v,
            Published::Skipped => {
                tracing::debug!(worker_id, "no available work");
                return Ok(None);
            }
            Published::Unpushed((item, attempt)) => {
                tracing::warn!(work_id = %item.work_id, worker_id, "claim attempt never reached the remote");
                // The attempt is committed locally; drop the commit so a later push cannot publish it.
                if let Err(e) = self.remote.reset_to_remote() {
                    tracing::warn!(work_id = %item.work_id, worker_id, "could not discard unpushed attempt: {}", e);
                    remove_if_exists(&self.layout.attempt_path(&attempt))?;
                }
                return Ok(None);
            }
            Published::SyncFailed(e) => {
                tracing::warn!(worker_id, "cannot claim, remote unreachable: {}", e);
                return Ok(None);
            }
            Published::Failed(e) => return Err(e),
        };
        let work_id = item.work_id.clone();
        let my_name = attempt.file_name();

        // Barrier: every attempt pushed before ours is now visible.
        let remote = &mut self.remote;
        if let Err(e) = run_with_retry(&self.policy, |_| remote.pull()) {
            tracing::warn!(work_id = %work_id, worker_id, "lost sync after claim attempt: {}", e);
            self.withdraw(&attempt);
            return Ok(None);
        }

        if let Verdict::Lost(reason) = self.judge(&work_id, &my_name)? {
            tracing::info!(work_id = %work_id, worker_id, "lost claim race: {}", reason);
            self.withdraw(&attempt);
            return Ok(None);
        }

        let claim_id = attempt.claim_id.clone();
        let finalized = self.publish(
            &format!("Claim {} by {}", work_id, worker_id),
            |layout| {
                let now = unix_millis();
                let path = layout.available_path(&work_id);
                let Some(mut claimed) = layout.read_item(&path)? else {
                    return Ok(None);
                };
                let live = live_attempts(layout, &work_id, now, ttl_ms)?;
                if resolve_winner(&work_id, &live) != Some(my_name.as_str()) {
                    return Ok(None);
                }
                claimed.status = WorkStatus::Claimed;
                claimed.claimed_by = Some(worker_id.to_string());
                claimed.claimed_at = Some(Utc::now());
                claimed.claim_id = Some(claim_id.clone());
                layout.write_item(&layout.item_path(WorkStatus::Claimed, &claimed), &claimed)?;
                remove_if_exists(&path)?;
                layout.remove_attempts(&work_id)?;
                layout.sweep_attempts_before(now - ttl_ms)?;
                Ok(Some(claimed))
            },
        );

        match finalized {
            Published::Pushed(claimed) => {
                tracing::info!(work_id = %work_id, worker_id, competition_id = %claimed.competition_id, "claimed");
                Ok(Some(claimed))
            }
            Published::Unpushed(claimed) => {
                tracing::warn!(work_id = %work_id, worker_id, "claimed locally but final push failed; shared state catches up on next sync");
                Ok(Some(claimed))
            }
            Published::Skipped => {
                tracing::info!(work_id = %work_id, worker_id, "lost claim race: overtaken before finalising");
                self.withdraw(&attempt);
                Ok(None)
            }
            Published::SyncFailed(e) => {
                tracing::warn!(work_id = %work_id, worker_id, "could not finalise claim: {}", e);
                Ok(None)
            }
            Published::Failed(e) => Err(e),
        }
    }

    /// Decide the race from the freshly pulled listing.
    fn judge(&self, work_id: &str, my_name: &str) -> Result<Verdict> {
        if !self.layout.available_path(work_id).exists() {
            return Ok(Verdict::Lost("item no longer available"));
        }
        let live = live_attempts(&self.layout, work_id, unix_millis(), self.ttl_ms())?;
        match resolve_winner(work_id, &live) {
            Some(winner) if winner == my_name => Ok(Verdict::Won),
            Some(_) => Ok(Verdict::Lost("an earlier attempt exists")),
            None => Ok(Verdict::Lost("attempt vanished")),
        }
    }

    /// Remove our own attempt and push the cleanup. Best effort.
    fn withdraw(&mut self, attempt: &ClaimAttempt) {
        let path = self.layout.attempt_path(attempt);
        let outcome = self.publish(
            &format!("Withdraw claim attempt for {}", attempt.work_id),
            |_| Ok(remove_if_exists(&path)?.then_some(())),
        );
        match outcome {
            Published::Pushed(()) | Published::Skipped => {}
            Published::Unpushed(()) => {
                tracing::warn!(work_id = %attempt.work_id, "attempt withdrawal not pushed")
            }
            Published::SyncFailed(e) => {
                tracing::warn!(work_id = %attempt.work_id, "attempt withdrawal failed: {}", e)
            }
            Published::Failed(e) => {
                tracing::warn!(work_id = %attempt.work_id, "attempt withdrawal failed: {:#}", e)
            }
        }
    }
}
