//! Pure parts of the sampler: candidate pool and the final verdict.

use std::collections::HashSet;

use super::{SeasonSample, TerminationConfig, TerminationDecision};
use crate::unit::SeasonRef;

/// Seasons eligible for sampling after `failed_year` failed: numeric years
/// in `[max(failed_year - range, absolute_minimum), failed_year)`, one
/// season per year (first occurrence wins).
pub fn build_sample_pool(
    config: &TerminationConfig,
    failed_year: i32,
    remaining: &[SeasonRef],
) -> Vec<(i32, SeasonRef)> {
    let min_year = failed_year
        .saturating_sub(config.sample_range_years)
        .max(config.absolute_minimum_year);
    let mut seen = HashSet::new();
    let mut pool = Vec::new();
    for season in remaining {
        let Some(year) = season.year_number() else {
            continue;
        };
        if year >= min_year && year < failed_year && seen.insert(year) {
            pool.push((year, season.clone()));
        }
    }
    pool.sort_by_key(|(year, _)| *year);
    pool
}

/// Turn probe results into a decision. Stops when the share of empty
/// samples reaches `stop_threshold`; the cutoff is one year after the
/// latest sample with data, or `failed_year` when none had any.
pub fn decide(config: &TerminationConfig, failed_year: i32, samples: Vec<SeasonSample>) -> TerminationDecision {
    if samples.is_empty() {
        return TerminationDecision::stop("No samples could be tested", failed_year);
    }

    let empty = samples.iter().filter(|s| !s.has_data).count();
    let failure_rate = empty as f64 / samples.len() as f64;
    let percent = failure_rate * 100.0;

    let mut decision = if failure_rate >= config.stop_threshold {
        match samples.iter().filter(|s| s.has_data).map(|s| s.year).max() {
            Some(latest) => TerminationDecision::stop(
                format!("High failure rate ({:.1}%), but found data until {}", percent, latest),
                latest + 1,
            ),
            None => TerminationDecision::stop(
                format!("High failure rate ({:.1}%), no data found in samples", percent),
                failed_year,
            ),
        }
    } else {
        TerminationDecision::proceed(format!(
            "Moderate failure rate ({:.1}%), found {} seasons with data",
            percent,
            samples.len() - empty
        ))
    };
    decision.samples_tested = samples;
    decision
}
