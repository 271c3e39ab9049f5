//! Early termination for competitions whose history runs out.
//!
//! After a run of consecutive season failures, a handful of older seasons
//! are probed at random. If most of them have no data either, processing
//! stops at a cutoff year and the caller marks everything older as done.

mod sampler;
mod session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::unit::SeasonRef;

pub use sampler::{build_sample_pool, decide};
pub use session::{CompetitionSession, TerminationSummary};

/// Sampling knobs. Fixed for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationConfig {
    /// Consecutive failures that trigger sampling.
    pub failure_threshold: u32,
    /// Seasons probed per sampling round.
    pub sample_size: usize,
    /// How far back from the failed year the pool reaches.
    pub sample_range_years: i32,
    /// Fraction of empty samples at or above which processing stops.
    pub stop_threshold: f64,
    /// Years before this are never sampled.
    pub absolute_minimum_year: i32,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            sample_size: 5,
            sample_range_years: 15,
            stop_threshold: 0.8,
            absolute_minimum_year: 1950,
        }
    }
}

/// Result of probing one sampled season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeasonSample {
    pub year: i32,
    pub season_id: String,
    pub has_data: bool,
    pub clubs_found: u32,
}

/// What a probe found for one season.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub has_data: bool,
    pub clubs_found: u32,
}

/// Stop/continue recommendation with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminationDecision {
    pub should_continue: bool,
    pub reason: String,
    /// Seasons strictly older than this should be marked completed with no data.
    pub cutoff_year: Option<i32>,
    pub samples_tested: Vec<SeasonSample>,
}

impl TerminationDecision {
    pub(crate) fn proceed(reason: impl Into<String>) -> Self {
        Self {
            should_continue: true,
            reason: reason.into(),
            cutoff_year: None,
            samples_tested: Vec::new(),
        }
    }

    pub(crate) fn stop(reason: impl Into<String>, cutoff_year: i32) -> Self {
        Self {
            should_continue: false,
            reason: reason.into(),
            cutoff_year: Some(cutoff_year),
            samples_tested: Vec::new(),
        }
    }
}

/// Checks whether a season has data, typically by fetching its page.
/// An error counts as "no data".
#[async_trait]
pub trait SeasonProbe: Send + Sync {
    async fn probe(&self, competition_id: &str, season: &SeasonRef) -> anyhow::Result<ProbeOutcome>;
}
