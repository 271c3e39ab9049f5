//! CLI command handlers, one file per command group.

mod progress;
mod queue;

pub use progress::run_progress;
pub use queue::run_queue;
