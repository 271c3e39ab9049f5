//! Distributed file queue over a version-controlled working copy.
//!
//! Workers coordinate only through the shared remote. Every write follows the
//! same cycle: synchronise, apply an idempotent change to the working copy,
//! push. A rejected push means somebody else got there first; the working copy
//! is reset to the remote tip and the change is re-derived from scratch, so
//! the outcome always reflects the latest shared state.

mod claim;
mod host;
mod layout;
mod remote;
mod submit;
mod types;
mod work_order;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{QueueConfig, RetryConfig};
use crate::retry::{classify, run_with_retry, RetryDecision, RetryPolicy, SyncError};

pub use claim::resolve_winner;
pub use layout::QueueLayout;
pub use remote::{BranchState, GitRemote, Remote};
pub use types::{
    parse_attempt_name, AttemptName, ClaimAttempt, QueueStatus, RetryOutcome, WorkItem,
    WorkStatus, RESERVED_FIELDS,
};
pub use work_order::{ProcessedSeason, SeasonState, WorkOrderSummary, WorkOrderTracker};

/// Result of one synchronise-apply-push cycle.
#[derive(Debug)]
pub(crate) enum Published<T> {
    /// Applied and pushed.
    Pushed(T),
    /// Applied locally; every push attempt failed.
    Unpushed(T),
    /// The change no longer applies to the current shared state.
    Skipped,
    /// Never managed to synchronise; nothing was applied.
    SyncFailed(SyncError),
    /// Local I/O failed while applying.
    Failed(anyhow::Error),
}

/// Queue handle for one worker (or the host) and its working copy.
pub struct FileQueue<R: Remote> {
    layout: QueueLayout,
    remote: R,
    policy: RetryPolicy,
    attempt_ttl: Duration,
}

impl FileQueue<GitRemote> {
    /// Queue over a git working copy described by config. A missing working
    /// copy is cloned from `remote_url`; a remote without the queue branch
    /// gets it, seeded with the empty queue folders.
    pub fn open(cfg: &QueueConfig, retry: &RetryConfig) -> Result<Self> {
        let mut remote = GitRemote::new(&cfg.repo_path, &cfg.remote, &cfg.branch)
            .with_url(cfg.remote_url.clone());
        let branch = remote
            .prepare()
            .with_context(|| format!("prepare queue repository {}", cfg.repo_path.display()))?;
        let mut queue = FileQueue::new(cfg.repo_path.clone(), remote, RetryPolicy::from(retry))
            .with_attempt_ttl(Duration::from_secs(cfg.claim_attempt_ttl_secs));
        if branch == BranchState::Missing {
            queue.seed_branch(&cfg.branch)?;
        }
        Ok(queue)
    }

    fn seed_branch(&mut self, branch: &str) -> Result<()> {
        self.layout.ensure_dirs()?;
        match self.remote.publish_branch("Initialize work queue") {
            Ok(()) => tracing::info!(branch, "created queue branch on the remote"),
            Err(SyncError::Rejected) => {
                tracing::info!(branch, "queue branch was created concurrently, adopting it");
                self.remote.reset_to_remote()?;
            }
            Err(e) => return Err(e).context("seed queue branch"),
        }
        Ok(())
    }
}

impl<R: Remote> FileQueue<R> {
    pub fn new(root: PathBuf, remote: R, policy: RetryPolicy) -> Self {
        Self {
            layout: QueueLayout::new(root),
            remote,
            policy,
            attempt_ttl: Duration::from_secs(600),
        }
    }

    /// Claim attempts older than `ttl` are ignored and swept.
    pub fn with_attempt_ttl(mut self, ttl: Duration) -> Self {
        self.attempt_ttl = ttl;
        self
    }

    pub fn layout(&self) -> &QueueLayout {
        &self.layout
    }

    /// Pull with retries; on failure keep working from the local copy.
    fn refresh(&mut self) -> bool {
        let remote = &mut self.remote;
        match run_with_retry(&self.policy, |_| remote.pull()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("could not synchronise queue, using local copy: {}", e);
                false
            }
        }
    }

    /// Run one synchronise-apply-push cycle with backoff.
    ///
    /// The first attempt pulls; later attempts hard-reset to the remote tip
    /// before re-running `apply`. `apply` returning `None` ends the cycle
    /// with [`Published::Skipped`].
    pub(crate) fn publish<T, F>(&mut self, message: &str, mut apply: F) -> Published<T>
    where
        F: FnMut(&QueueLayout) -> Result<Option<T>>,
    {
        let mut applied: Option<T> = None;
        let mut attempt = 1u32;
        loop {
            let synced = if attempt == 1 {
                self.remote.pull()
            } else {
                self.remote.reset_to_remote()
            };

            let err = match synced {
                Err(e) => e,
                Ok(()) => {
                    if let Err(e) = self.layout.ensure_dirs() {
                        return Published::Failed(e);
                    }
                    match apply(&self.layout) {
                        Err(e) => return Published::Failed(e),
                        Ok(None) => return Published::Skipped,
                        Ok(Some(value)) => match self.remote.push(message) {
                            Ok(()) => return Published::Pushed(value),
                            Err(e) => {
                                applied = Some(value);
                                e
                            }
                        },
                    }
                }
            };

            match self.policy.decide(attempt, classify(&err)) {
                RetryDecision::NoRetry => {
                    tracing::warn!(attempt, "giving up on `{}`: {}", message, err);
                    return match applied {
                        Some(value) => Published::Unpushed(value),
                        None => Published::SyncFailed(err),
                    };
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(attempt, ?delay, "sync failed, resetting to remote: {}", err);
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
