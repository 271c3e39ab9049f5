//! Retry and backoff policy.
//!
//! This module encapsulates error classification (push conflicts, network
//! failures) and exponential backoff decisions so that every synchronise
//! step of the file queue shares one consistent policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, is_rejected_push};
pub use error::SyncError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
