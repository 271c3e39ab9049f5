//! Per-competition sampler state, owned by the caller's processing loop.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::sampler::{build_sample_pool, decide};
use super::{SeasonProbe, SeasonSample, TerminationConfig, TerminationDecision};
use crate::unit::SeasonRef;

/// Failure streak and sampling history for one competition.
#[derive(Debug, Clone, Default)]
pub struct CompetitionSession {
    competition_id: String,
    consecutive_failures: u32,
    failed_years: BTreeSet<String>,
    tested_samples: Vec<SeasonSample>,
}

/// Audit view of the latest sampling round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminationSummary {
    pub total_samples: usize,
    pub successful_samples: usize,
    pub failed_samples: usize,
    pub failure_rate: f64,
    pub consecutive_failures: u32,
    /// year -> (has_data, clubs_found)
    pub samples_by_year: BTreeMap<i32, (bool, u32)>,
}

impl CompetitionSession {
    pub fn new(competition_id: impl Into<String>) -> Self {
        Self {
            competition_id: competition_id.into(),
            ..Self::default()
        }
    }

    pub fn competition_id(&self) -> &str {
        &self.competition_id
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn failed_years(&self) -> impl Iterator<Item = &str> {
        self.failed_years.iter().map(String::as_str)
    }

    /// A season yielded data; the failure streak is over.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a failed season and, once the streak reaches the threshold,
    /// probe a random sample of older `remaining` seasons to decide whether
    /// to keep going. The streak only ends on [`record_success`](Self::record_success),
    /// so every further failure past the threshold samples again.
    pub async fn record_failure<P, R>(
        &mut self,
        config: &TerminationConfig,
        failed: &SeasonRef,
        remaining: &[SeasonRef],
        probe: &P,
        rng: &mut R,
    ) -> TerminationDecision
    where
        P: SeasonProbe + ?Sized,
        R: Rng + ?Sized,
    {
        self.consecutive_failures += 1;
        self.failed_years.insert(failed.year.clone());

        if self.consecutive_failures < config.failure_threshold {
            return TerminationDecision::proceed(format!(
                "Only {} consecutive failures, continuing",
                self.consecutive_failures
            ));
        }

        let Some(failed_year) = failed.year_number() else {
            return TerminationDecision::proceed(format!(
                "Season label {:?} is not a year, cannot sample history",
                failed.year
            ));
        };

        tracing::info!(
            competition_id = %self.competition_id,
            failures = self.consecutive_failures,
            failed_year,
            "failure streak detected, sampling older seasons"
        );

        let pool = build_sample_pool(config, failed_year, remaining);
        if pool.is_empty() {
            let decision = TerminationDecision::stop("No valid seasons to sample", failed_year);
            self.log_decision(&decision);
            return decision;
        }

        let count = config.sample_size.min(pool.len());
        let mut picked: Vec<(i32, SeasonRef)> = pool.choose_multiple(rng, count).cloned().collect();
        picked.sort_by_key(|(year, _)| *year);

        let mut samples = Vec::with_capacity(picked.len());
        for (year, season) in picked {
            let outcome = match probe.probe(&self.competition_id, &season).await {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(competition_id = %self.competition_id, season_id = %season.season_id, "probe failed, counting as empty: {:#}", e);
                    Default::default()
                }
            };
            tracing::debug!(
                competition_id = %self.competition_id,
                season_id = %season.season_id,
                year,
                has_data = outcome.has_data,
                clubs = outcome.clubs_found,
                "probed season"
            );
            samples.push(SeasonSample {
                year,
                season_id: season.season_id,
                has_data: outcome.has_data,
                clubs_found: outcome.clubs_found,
            });
        }

        self.tested_samples = samples.clone();
        let decision = decide(config, failed_year, samples);
        self.log_decision(&decision);
        decision
    }

    fn log_decision(&self, decision: &TerminationDecision) {
        if decision.should_continue {
            tracing::info!(competition_id = %self.competition_id, "continuing: {}", decision.reason);
        } else {
            tracing::info!(
                competition_id = %self.competition_id,
                cutoff_year = ?decision.cutoff_year,
                "stopping: {}",
                decision.reason
            );
        }
    }

    /// Summary of the most recent sampling round, if there was one.
    pub fn summary(&self) -> Option<TerminationSummary> {
        if self.tested_samples.is_empty() {
            return None;
        }
        let total = self.tested_samples.len();
        let successful = self.tested_samples.iter().filter(|s| s.has_data).count();
        Some(TerminationSummary {
            total_samples: total,
            successful_samples: successful,
            failed_samples: total - successful,
            failure_rate: (total - successful) as f64 / total as f64,
            consecutive_failures: self.consecutive_failures,
            samples_by_year: self
                .tested_samples
                .iter()
                .map(|s| (s.year, (s.has_data, s.clubs_found)))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::termination::ProbeOutcome;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Mutex;

    /// Probe answering from a fixed set of years with data; records calls.
    struct YearsWithData {
        years: Vec<i32>,
        calls: Mutex<Vec<String>>,
    }

    impl YearsWithData {
        fn new(years: Vec<i32>) -> Self {
            Self {
                years,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SeasonProbe for YearsWithData {
        async fn probe(&self, _competition_id: &str, season: &SeasonRef) -> anyhow::Result<ProbeOutcome> {
            self.calls.lock().unwrap().push(season.year.clone());
            let year = season.year_number().unwrap_or_default();
            Ok(ProbeOutcome {
                has_data: self.years.contains(&year),
                clubs_found: if self.years.contains(&year) { 16 } else { 0 },
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl SeasonProbe for Broken {
        async fn probe(&self, _competition_id: &str, _season: &SeasonRef) -> anyhow::Result<ProbeOutcome> {
            anyhow::bail!("browser crashed")
        }
    }

    fn season(year: i32) -> SeasonRef {
        SeasonRef::new(format!("s{}", year), year.to_string())
    }

    fn history(years: std::ops::RangeInclusive<i32>) -> Vec<SeasonRef> {
        years.map(season).collect()
    }

    #[tokio::test]
    async fn below_threshold_does_not_sample() {
        let cfg = TerminationConfig::default();
        let probe = YearsWithData::new(vec![]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut s = CompetitionSession::new("GB1");
        for y in [2024, 2023] {
            let d = s.record_failure(&cfg, &season(y), &history(1990..=2022), &probe, &mut rng).await;
            assert!(d.should_continue);
        }
        assert!(probe.calls.lock().unwrap().is_empty());
        assert_eq!(s.consecutive_failures(), 2);
        assert!(s.summary().is_none());
    }

    #[tokio::test]
    async fn success_resets_the_streak() {
        let cfg = TerminationConfig::default();
        let probe = YearsWithData::new(vec![]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut s = CompetitionSession::new("GB1");
        s.record_failure(&cfg, &season(2024), &[], &probe, &mut rng).await;
        s.record_failure(&cfg, &season(2023), &[], &probe, &mut rng).await;
        s.record_success();
        let d = s.record_failure(&cfg, &season(2021), &[], &probe, &mut rng).await;
        assert!(d.should_continue);
        assert_eq!(s.consecutive_failures(), 1);
        assert_eq!(s.failed_years().collect::<Vec<_>>(), vec!["2021", "2023", "2024"]);
    }

    #[tokio::test]
    async fn sparse_history_stops_after_latest_data() {
        let cfg = TerminationConfig::default();
        let remaining = history(2016..=2020);
        let probe = YearsWithData::new(vec![2017]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut s = CompetitionSession::new("FR1");
        let mut decision = None;
        for y in [2023, 2022, 2021] {
            decision = Some(s.record_failure(&cfg, &season(y), &remaining, &probe, &mut rng).await);
        }
        let d = decision.unwrap();
        // Pool is exactly 2016..=2020, so all five are probed.
        assert_eq!(probe.calls.lock().unwrap().len(), 5);
        assert!(!d.should_continue);
        assert_eq!(d.cutoff_year, Some(2018));

        let summary = s.summary().unwrap();
        assert_eq!(summary.total_samples, 5);
        assert_eq!(summary.successful_samples, 1);
        assert!((summary.failure_rate - 0.8).abs() < 1e-9);
        assert_eq!(summary.samples_by_year[&2017], (true, 16));
    }

    #[tokio::test]
    async fn rich_history_continues_and_keeps_streak() {
        let cfg = TerminationConfig::default();
        let remaining = history(2000..=2020);
        let probe = YearsWithData::new((1990..=2030).collect());
        let mut rng = StdRng::seed_from_u64(1);
        let mut s = CompetitionSession::new("ES1");
        for y in [2023, 2022] {
            s.record_failure(&cfg, &season(y), &remaining, &probe, &mut rng).await;
        }
        let d = s.record_failure(&cfg, &season(2021), &remaining, &probe, &mut rng).await;
        assert!(d.should_continue);
        assert_eq!(d.samples_tested.len(), 5);
        let years: Vec<i32> = d.samples_tested.iter().map(|x| x.year).collect();
        let mut sorted = years.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(years, sorted, "samples are distinct and ordered");
        assert!(years.iter().all(|y| (2006..2021).contains(y)));
        assert_eq!(s.consecutive_failures(), 3);
    }

    #[tokio::test]
    async fn every_failure_past_threshold_samples_again() {
        let cfg = TerminationConfig::default();
        let probe = YearsWithData::new((1990..=2030).collect());
        let mut rng = StdRng::seed_from_u64(9);
        let mut s = CompetitionSession::new("PT1");
        for y in [2024, 2023] {
            s.record_failure(&cfg, &season(y), &history(1990..=2021), &probe, &mut rng).await;
        }
        assert!(probe.calls.lock().unwrap().is_empty());

        let third = s.record_failure(&cfg, &season(2022), &history(1990..=2021), &probe, &mut rng).await;
        assert!(third.should_continue);
        assert_eq!(probe.calls.lock().unwrap().len(), 5);

        let fourth = s.record_failure(&cfg, &season(2021), &history(1990..=2020), &probe, &mut rng).await;
        assert!(fourth.should_continue);
        assert_eq!(fourth.samples_tested.len(), 5);
        assert_eq!(probe.calls.lock().unwrap().len(), 10);
        assert_eq!(s.consecutive_failures(), 4);

        s.record_success();
        let after = s.record_failure(&cfg, &season(2020), &history(1990..=2019), &probe, &mut rng).await;
        assert!(after.should_continue);
        assert_eq!(probe.calls.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn sample_errors_count_as_empty() {
        let cfg = TerminationConfig {
            failure_threshold: 1,
            ..TerminationConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let mut s = CompetitionSession::new("IT1");
        let d = s
            .record_failure(&cfg, &season(2020), &history(2010..=2019), &Broken, &mut rng)
            .await;
        assert!(!d.should_continue);
        assert_eq!(d.cutoff_year, Some(2020));
        assert!(d.samples_tested.iter().all(|x| !x.has_data && x.clubs_found == 0));
    }

    #[tokio::test]
    async fn empty_pool_stops_at_failed_year() {
        let cfg = TerminationConfig {
            failure_threshold: 1,
            ..TerminationConfig::default()
        };
        let probe = YearsWithData::new(vec![]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut s = CompetitionSession::new("NL1");
        let d = s.record_failure(&cfg, &season(1960), &history(1930..=1949), &probe, &mut rng).await;
        assert!(!d.should_continue);
        assert_eq!(d.cutoff_year, Some(1960));
        assert!(d.samples_tested.is_empty());
    }

    #[tokio::test]
    async fn non_numeric_failed_label_continues() {
        let cfg = TerminationConfig {
            failure_threshold: 1,
            ..TerminationConfig::default()
        };
        let probe = YearsWithData::new(vec![]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut s = CompetitionSession::new("BR1");
        let d = s
            .record_failure(&cfg, &SeasonRef::new("x", "Clausura"), &history(2000..=2010), &probe, &mut rng)
            .await;
        assert!(d.should_continue);
        assert!(probe.calls.lock().unwrap().is_empty());
    }
}
