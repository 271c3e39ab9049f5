//! Relational progress tracker for competitions and their seasons.
//!
//! Two tables (`competition_progress`, `season_progress`) in a database all
//! workers can reach. Claims are conditional writes whose result is read
//! back from the written row, so the database arbitrates every race.

mod postgres;
mod sqlite;
mod store;
mod tracker;
mod types;

#[cfg(test)]
mod tests;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;
pub use store::{path_to_sqlite_uri, Dialect, ProgressDb, ProgressStore};
pub use tracker::ProgressTracker;
pub use types::{
    CompetitionRecord, CompetitionStatus, ProgressSummary, RecoveryReport, SeasonRecord,
    SeasonStatus, StatusCounts, StoreSummary, MAX_SEASON_RETRIES, RECOVERED_MESSAGE,
};
