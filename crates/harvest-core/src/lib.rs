pub mod clock;
pub mod config;
pub mod logging;
pub mod unit;

// Coordination engine
pub mod file_queue;
pub mod progress;
pub mod retry;
pub mod termination;
