//! Classify synchronisation errors into retry policy error kinds.

use crate::retry::error::SyncError;
use crate::retry::policy::ErrorKind;

/// Heuristic: git reports a non-fast-forward push with one of these phrases.
pub fn is_rejected_push(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    s.contains("[rejected]")
        || s.contains("non-fast-forward")
        || s.contains("fetch first")
        || s.contains("updates were rejected")
}

/// Classify a sync error into an ErrorKind.
pub fn classify(e: &SyncError) -> ErrorKind {
    match e {
        SyncError::Rejected => ErrorKind::Conflict,
        SyncError::Command { stderr, .. } if is_rejected_push(stderr) => ErrorKind::Conflict,
        SyncError::Command { .. } => ErrorKind::Transient,
        SyncError::Spawn(_) => ErrorKind::Other,
    }
}
