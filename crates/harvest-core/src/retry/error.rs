//! Synchronisation error type for retry classification.

use thiserror::Error;

/// Error returned by one synchronise step against the shared remote
/// (pull, hard reset, or commit-and-push).
/// Used so we can classify and decide retries before giving up on a push.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The version-control binary could not be started.
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
    /// The remote moved since our last pull; push was refused.
    #[error("push rejected: remote has new commits")]
    Rejected,
    /// A command exited unsuccessfully (network failure, auth, merge trouble).
    #[error("`git {command}` failed (exit {code:?}): {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}
