//! Property suite shared by both backends. SQLite runs always, in memory and
//! on disk with a connection pool; PostgreSQL runs when
//! `HARVEST_TEST_POSTGRES_URL` is set.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::progress::{
    CompetitionStatus, ProgressDb, ProgressStore, ProgressTracker, SeasonStatus,
    RECOVERED_MESSAGE,
};
use crate::unit::SeasonRef;

type Store = Arc<dyn ProgressStore>;

const URL: &str = "https://example.com/competition";

async fn sqlite() -> Store {
    ProgressDb::open_memory().await.unwrap()
}

/// Database file with the production pool, so transactions really overlap.
async fn sqlite_file(dir: &tempfile::TempDir) -> Store {
    ProgressDb::open_at(dir.path().join("progress.db")).await.unwrap()
}

fn seasons(years: std::ops::RangeInclusive<i32>) -> Vec<SeasonRef> {
    years
        .map(|y| SeasonRef::new(format!("s{}", y), y.to_string()))
        .collect()
}

/// Competition `id` claimed by `worker` at `now` with the given seasons.
async fn seeded(store: &Store, id: &str, worker: &str, years: std::ops::RangeInclusive<i32>, now: i64) {
    assert!(store.claim_competition(id, URL, worker, now).await.unwrap());
    assert!(store.discover_seasons(id, worker, &seasons(years)).await.unwrap());
}

async fn season_status(store: &Store, id: &str, season: &str) -> SeasonStatus {
    store.season(id, season).await.unwrap().unwrap().status
}

async fn competition_status(store: &Store, id: &str) -> CompetitionStatus {
    store.competition(id).await.unwrap().unwrap().status
}

async fn check_competition_claim_is_exclusive(store: Store) {
    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let worker = format!("w{}", i);
            let won = store.claim_competition("C1", URL, &worker, 100).await.unwrap();
            (worker, won)
        }));
    }
    let mut winners = Vec::new();
    for h in handles {
        let (worker, won) = h.await.unwrap();
        if won {
            winners.push(worker);
        }
    }
    assert_eq!(winners.len(), 1, "winners: {:?}", winners);

    let row = store.competition("C1").await.unwrap().unwrap();
    assert_eq!(row.status, CompetitionStatus::InProgress);
    assert_eq!(row.worker_id.as_deref(), Some(winners[0].as_str()));

    // The holder may re-enter; nobody else may.
    assert!(store.claim_competition("C1", URL, &winners[0], 101).await.unwrap());
    let other = if winners[0] == "w0" { "w1" } else { "w0" };
    assert!(!store.claim_competition("C1", URL, other, 102).await.unwrap());
}

async fn check_season_claims_are_disjoint(store: Store) {
    seeded(&store, "C1", "owner", 2001..=2012, 100).await;
    let mut handles = Vec::new();
    for i in 0..6 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.claim_seasons("C1", &format!("w{}", i), 200).await.unwrap()
        }));
    }
    let mut seen = HashSet::new();
    let mut total = 0;
    for h in handles {
        for s in h.await.unwrap() {
            total += 1;
            assert!(seen.insert(s.season_id.clone()), "{} claimed twice", s.season_id);
        }
    }
    assert_eq!(total, 12);
    assert!(store.claim_seasons("C1", "late", 300).await.unwrap().is_empty());
}

async fn check_claimed_seasons_newest_first(store: Store) {
    seeded(&store, "C1", "w1", 2018..=2021, 100).await;
    assert_eq!(competition_status(&store, "C1").await, CompetitionStatus::SeasonsDiscovered);
    let claimed = store.claim_seasons("C1", "w1", 200).await.unwrap();
    let years: Vec<_> = claimed.iter().map(|s| s.year.as_str()).collect();
    assert_eq!(years, vec!["2021", "2020", "2019", "2018"]);

    let comp = store.competition("C1").await.unwrap().unwrap();
    assert_eq!(comp.status, CompetitionStatus::InProgress);
    assert_eq!(comp.started_at, Some(200));
    assert_eq!(comp.seasons_discovered, 4);
    let s = store.season("C1", "s2019").await.unwrap().unwrap();
    assert_eq!(s.status, SeasonStatus::InProgress);
    assert_eq!(s.worker_id.as_deref(), Some("w1"));
}

async fn check_discovery_requires_ownership(store: Store) {
    assert!(store.claim_competition("C1", URL, "w1", 100).await.unwrap());
    assert!(!store.discover_seasons("C1", "w2", &seasons(2020..=2021)).await.unwrap());
    assert!(store.seasons("C1").await.unwrap().is_empty());

    // Re-discovery by the owner keeps existing rows.
    assert!(store.discover_seasons("C1", "w1", &seasons(2020..=2021)).await.unwrap());
    store.claim_seasons("C1", "w1", 150).await.unwrap();
    assert!(store.discover_seasons("C1", "w1", &seasons(2019..=2021)).await.unwrap());
    assert_eq!(season_status(&store, "C1", "s2021").await, SeasonStatus::InProgress);
    assert_eq!(season_status(&store, "C1", "s2019").await, SeasonStatus::Pending);
}

async fn check_roll_up_on_last_completion(store: Store) {
    seeded(&store, "C1", "w1", 2020..=2022, 100).await;
    store.claim_seasons("C1", "w1", 200).await.unwrap();

    assert!(store.complete_season("C1", "s2022", "w1", 18, 210).await.unwrap());
    assert!(store.complete_season("C1", "s2021", "w1", 20, 220).await.unwrap());
    assert_eq!(competition_status(&store, "C1").await, CompetitionStatus::InProgress);

    assert!(store.complete_season("C1", "s2020", "w1", 0, 230).await.unwrap());
    let comp = store.competition("C1").await.unwrap().unwrap();
    assert_eq!(comp.status, CompetitionStatus::Completed);
    assert_eq!(comp.completed_at, Some(230));
    assert_eq!(store.season("C1", "s2021").await.unwrap().unwrap().clubs_saved, 20);
}

/// The last two open seasons, held by different workers, finish at the same
/// moment; one of the two transactions must still see both and complete the
/// competition.
async fn check_concurrent_last_completions_roll_up(store: Store) {
    for i in 0..16 {
        let id = format!("C{}", i);
        seeded(&store, &id, "w1", 2020..=2021, 100).await;
        assert_eq!(store.claim_seasons(&id, "w1", 100).await.unwrap().len(), 2);
        // Hand s2020 over to w2.
        store.fail_season(&id, "s2020", "w1", "handover", 110).await.unwrap();
        assert_eq!(
            store.claim_seasons(&id, "w2", 120).await.unwrap(),
            vec![SeasonRef::new("s2020", "2020")]
        );

        let mut handles = Vec::new();
        for (season, worker) in [("s2021", "w1"), ("s2020", "w2")] {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.complete_season(&id, season, worker, 10, 200).await.unwrap()
            }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        let comp = store.competition(&id).await.unwrap().unwrap();
        assert_eq!(comp.status, CompetitionStatus::Completed, "{}", id);
        assert_eq!(comp.completed_at, Some(200));
    }
}

async fn check_completed_is_never_resurrected(store: Store) {
    seeded(&store, "C1", "w1", 2020..=2020, 100).await;
    store.claim_seasons("C1", "w1", 100).await.unwrap();
    assert!(store.complete_season("C1", "s2020", "w1", 5, 110).await.unwrap());
    assert_eq!(competition_status(&store, "C1").await, CompetitionStatus::Completed);

    assert!(!store.claim_competition("C1", URL, "w2", 200).await.unwrap());
    assert!(!store.claim_competition("C1", URL, "w1", 200).await.unwrap());
    assert!(store.claim_seasons("C1", "w2", 200).await.unwrap().is_empty());
    assert!(store.fail_season("C1", "s2020", "w1", "late error", 210).await.unwrap().is_none());
    assert!(!store.complete_season("C1", "s2020", "w1", 9, 210).await.unwrap());
    assert_eq!(store.recover_stale(i64::MAX, 10_000).await.unwrap().total(), 0);
    store.reset_failed_seasons(None).await.unwrap();

    assert_eq!(competition_status(&store, "C1").await, CompetitionStatus::Completed);
    let s = store.season("C1", "s2020").await.unwrap().unwrap();
    assert_eq!(s.status, SeasonStatus::Completed);
    assert_eq!(s.clubs_saved, 5);
}

async fn check_failure_requeues_then_exhausts(store: Store) {
    seeded(&store, "C1", "w1", 2020..=2021, 100).await;
    store.claim_seasons("C1", "w1", 100).await.unwrap();
    assert!(store.complete_season("C1", "s2021", "w1", 10, 110).await.unwrap());

    // First failure: back to pending, anyone may take it.
    assert_eq!(
        store.fail_season("C1", "s2020", "w1", "timeout", 120).await.unwrap(),
        Some(SeasonStatus::Pending)
    );
    let s = store.season("C1", "s2020").await.unwrap().unwrap();
    assert_eq!((s.retry_count, s.worker_id.clone()), (1, None));
    assert_eq!(s.error_message.as_deref(), Some("timeout"));

    let taken = store.claim_seasons("C1", "w2", 130).await.unwrap();
    assert_eq!(taken, vec![SeasonRef::new("s2020", "2020")]);
    assert_eq!(
        store.fail_season("C1", "s2020", "w2", "timeout", 140).await.unwrap(),
        Some(SeasonStatus::Pending)
    );
    store.claim_seasons("C1", "w3", 150).await.unwrap();
    assert_eq!(
        store.fail_season("C1", "s2020", "w3", "parse error", 160).await.unwrap(),
        Some(SeasonStatus::Failed)
    );

    let s = store.season("C1", "s2020").await.unwrap().unwrap();
    assert_eq!(s.status, SeasonStatus::Failed);
    assert_eq!(s.retry_count, 3);
    assert_eq!(s.worker_id.as_deref(), Some("w3"));
    for w in ["w1", "w2", "w3", "w4"] {
        assert!(store.claim_seasons("C1", w, 200).await.unwrap().is_empty());
    }
    assert_eq!(store.recover_stale(i64::MAX, 300).await.unwrap().seasons, 0);

    let comp = store.competition("C1").await.unwrap().unwrap();
    assert_eq!(comp.status, CompetitionStatus::Failed);
    assert_eq!(comp.error_message.as_deref(), Some("1 of 2 seasons exhausted retries"));
    assert_eq!(store.failed_seasons().await.unwrap().len(), 1);
}

async fn check_only_holder_reports(store: Store) {
    seeded(&store, "C1", "w1", 2020..=2020, 100).await;
    store.claim_seasons("C1", "w1", 100).await.unwrap();
    assert!(!store.complete_season("C1", "s2020", "w2", 1, 110).await.unwrap());
    assert!(store.fail_season("C1", "s2020", "w2", "x", 110).await.unwrap().is_none());
    assert!(!store.complete_season("C1", "nope", "w1", 1, 110).await.unwrap());
    assert_eq!(season_status(&store, "C1", "s2020").await, SeasonStatus::InProgress);
}

async fn check_stale_recovery_is_idempotent(store: Store) {
    seeded(&store, "C1", "w1", 2020..=2021, 1_000).await;
    store.claim_seasons("C1", "w1", 1_000).await.unwrap();
    assert!(store.claim_competition("C2", URL, "w2", 1_000).await.unwrap());

    // Nothing is stale yet.
    assert_eq!(store.recover_stale(1_000, 1_100).await.unwrap().total(), 0);

    let first = store.recover_stale(2_801, 2_801).await.unwrap();
    assert_eq!(first.seasons, 2);
    assert_eq!(first.competitions, 2);
    let second = store.recover_stale(2_801, 2_801).await.unwrap();
    assert_eq!(second.total(), 0);

    let s = store.season("C1", "s2021").await.unwrap().unwrap();
    assert_eq!(s.status, SeasonStatus::Pending);
    assert_eq!(s.worker_id, None);
    assert_eq!(s.retry_count, 1);
    assert_eq!(s.error_message.as_deref(), Some(RECOVERED_MESSAGE));
    let c = store.competition("C1").await.unwrap().unwrap();
    assert_eq!((c.status, c.worker_id.clone(), c.retry_count), (CompetitionStatus::Pending, None, 1));

    // Released work is claimable by someone else.
    assert!(store.claim_competition("C1", URL, "w9", 3_000).await.unwrap());
    assert_eq!(store.claim_seasons("C1", "w9", 3_000).await.unwrap().len(), 2);
}

async fn check_stale_recovery_respects_retry_ceiling(store: Store) {
    seeded(&store, "C1", "w1", 2020..=2020, 100).await;
    for (i, w) in ["w1", "w2"].iter().enumerate() {
        store.claim_seasons("C1", w, 100 + i as i64).await.unwrap();
        store.fail_season("C1", "s2020", w, "boom", 100 + i as i64).await.unwrap();
    }
    store.claim_seasons("C1", "w3", 200).await.unwrap();
    let report = store.recover_stale(5_000, 5_000).await.unwrap();
    assert_eq!(report.seasons, 1);

    let s = store.season("C1", "s2020").await.unwrap().unwrap();
    assert_eq!(s.status, SeasonStatus::Failed);
    assert_eq!(s.retry_count, 3);
    assert!(store.claim_seasons("C1", "w4", 6_000).await.unwrap().is_empty());
    assert_eq!(competition_status(&store, "C1").await, CompetitionStatus::Failed);
}

async fn check_complete_seasons_before_cutoff(store: Store) {
    seeded(&store, "C1", "w1", 2017..=2024, 100).await;
    // s2019 is running under another worker; it must be left alone.
    store.claim_seasons("C1", "other", 100).await.unwrap();
    for y in 2017..=2024 {
        if y != 2019 {
            store.fail_season("C1", &format!("s{}", y), "other", "released", 110).await.unwrap();
        }
    }

    let marked = store.complete_seasons_before("C1", "w1", 2022, 200).await.unwrap();
    assert_eq!(marked, 4); // 2017, 2018, 2020, 2021
    for y in [2017, 2018, 2020, 2021] {
        let s = store.season("C1", &format!("s{}", y)).await.unwrap().unwrap();
        assert_eq!(s.status, SeasonStatus::Completed, "{}", y);
        assert_eq!(s.clubs_saved, 0);
    }
    assert_eq!(season_status(&store, "C1", "s2019").await, SeasonStatus::InProgress);
    assert_eq!(season_status(&store, "C1", "s2022").await, SeasonStatus::Pending);
    assert_eq!(store.complete_seasons_before("C1", "w1", 2022, 300).await.unwrap(), 0);
}

async fn check_manual_resets(store: Store) {
    seeded(&store, "C1", "w1", 2020..=2021, 100).await;
    store.claim_seasons("C1", "w1", 100).await.unwrap();
    store.complete_season("C1", "s2021", "w1", 3, 110).await.unwrap();
    for (i, w) in ["w1", "w2", "w3"].iter().enumerate() {
        if i > 0 {
            store.claim_seasons("C1", w, 120).await.unwrap();
        }
        store.fail_season("C1", "s2020", w, "gone", 130).await.unwrap();
    }
    assert_eq!(competition_status(&store, "C1").await, CompetitionStatus::Failed);

    assert_eq!(store.reset_failed_seasons(Some("other")).await.unwrap(), 0);
    assert_eq!(store.reset_failed_seasons(Some("C1")).await.unwrap(), 1);
    let s = store.season("C1", "s2020").await.unwrap().unwrap();
    assert_eq!((s.status, s.retry_count, s.worker_id.clone()), (SeasonStatus::Pending, 0, None));
    assert_eq!(competition_status(&store, "C1").await, CompetitionStatus::Pending);

    assert_eq!(store.reset_competition("C1").await.unwrap(), 2);
    assert_eq!(season_status(&store, "C1", "s2021").await, SeasonStatus::Pending);
    let c = store.competition("C1").await.unwrap().unwrap();
    assert_eq!((c.status, c.worker_id), (CompetitionStatus::Pending, None));

    store.clear_all().await.unwrap();
    assert!(store.competition("C1").await.unwrap().is_none());
    assert!(store.seasons("C1").await.unwrap().is_empty());
}

async fn check_reclaim_of_fully_completed_competition_rolls_up(store: Store) {
    seeded(&store, "C1", "w1", 2020..=2020, 100).await;
    store.claim_seasons("C1", "w1", 100).await.unwrap();
    store.complete_season("C1", "s2020", "w1", 1, 110).await.unwrap();
    store.reset_competition("C1").await.unwrap();
    // Reset put the season back too; complete it again under a new worker.
    assert!(store.claim_competition("C1", URL, "w2", 200).await.unwrap());
    assert_eq!(store.claim_seasons("C1", "w2", 200).await.unwrap().len(), 1);
    store.complete_season("C1", "s2020", "w2", 1, 210).await.unwrap();
    assert_eq!(competition_status(&store, "C1").await, CompetitionStatus::Completed);
}

#[tokio::test]
async fn competition_claim_is_exclusive() {
    check_competition_claim_is_exclusive(sqlite().await).await;
}

#[tokio::test]
async fn season_claims_are_disjoint() {
    check_season_claims_are_disjoint(sqlite().await).await;
}

#[tokio::test]
async fn claimed_seasons_newest_first() {
    check_claimed_seasons_newest_first(sqlite().await).await;
}

#[tokio::test]
async fn discovery_requires_ownership() {
    check_discovery_requires_ownership(sqlite().await).await;
}

#[tokio::test]
async fn roll_up_on_last_completion() {
    check_roll_up_on_last_completion(sqlite().await).await;
}

#[tokio::test]
async fn concurrent_last_completions_roll_up() {
    check_concurrent_last_completions_roll_up(sqlite().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_backed_competition_claim_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    check_competition_claim_is_exclusive(sqlite_file(&dir).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_backed_season_claims_are_disjoint() {
    let dir = tempfile::tempdir().unwrap();
    check_season_claims_are_disjoint(sqlite_file(&dir).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_backed_concurrent_last_completions_roll_up() {
    let dir = tempfile::tempdir().unwrap();
    check_concurrent_last_completions_roll_up(sqlite_file(&dir).await).await;
}

#[tokio::test]
async fn completed_is_never_resurrected() {
    check_completed_is_never_resurrected(sqlite().await).await;
}

#[tokio::test]
async fn failure_requeues_then_exhausts() {
    check_failure_requeues_then_exhausts(sqlite().await).await;
}

#[tokio::test]
async fn only_holder_reports() {
    check_only_holder_reports(sqlite().await).await;
}

#[tokio::test]
async fn stale_recovery_is_idempotent() {
    check_stale_recovery_is_idempotent(sqlite().await).await;
}

#[tokio::test]
async fn stale_recovery_respects_retry_ceiling() {
    check_stale_recovery_respects_retry_ceiling(sqlite().await).await;
}

#[tokio::test]
async fn complete_seasons_before_cutoff() {
    check_complete_seasons_before_cutoff(sqlite().await).await;
}

#[tokio::test]
async fn manual_resets() {
    check_manual_resets(sqlite().await).await;
}

#[tokio::test]
async fn reclaim_of_reset_competition_rolls_up() {
    check_reclaim_of_fully_completed_competition_rolls_up(sqlite().await).await;
}

#[tokio::test]
async fn summary_counts() {
    let store = sqlite().await;
    seeded(&store, "C1", "w1", 2020..=2023, 100).await;
    store.claim_seasons("C1", "w1", 100).await.unwrap();
    store.complete_season("C1", "s2023", "w1", 20, 110).await.unwrap();
    store.complete_season("C1", "s2022", "w1", 18, 110).await.unwrap();
    assert!(store.claim_competition("C2", URL, "w2", 100).await.unwrap());

    let tracker = ProgressTracker::new(store, "me", &TrackerConfig::default());
    let summary = tracker.summary().await.unwrap();
    assert_eq!(summary.store.competitions.total, 2);
    assert_eq!(summary.store.competitions.in_progress, 2);
    assert_eq!(summary.store.seasons.total, 4);
    assert_eq!(summary.store.seasons.completed, 2);
    assert_eq!(summary.store.seasons.in_progress, 2);
    assert!((summary.store.seasons.completion_percentage() - 50.0).abs() < 1e-9);
    assert_eq!(summary.store.clubs_saved, 38);
    assert_eq!(summary.store.active_workers, 2);
    assert_eq!(summary.worker_id, "me");
    assert_eq!(summary.dialect, "sqlite");
}

fn tracker_config(recovery_interval_secs: u64) -> TrackerConfig {
    TrackerConfig {
        stale_after_secs: 0,
        recovery_interval_secs,
    }
}

#[tokio::test]
async fn tracker_sweeps_only_when_interval_elapsed() {
    let store = sqlite().await;
    assert!(store.claim_competition("STALE", URL, "ghost", 100).await.unwrap());

    let patient = ProgressTracker::new(store.clone(), "w1", &tracker_config(3600));
    assert!(patient.claim_parent("C1", URL).await.unwrap());
    assert_eq!(competition_status(&store, "STALE").await, CompetitionStatus::InProgress);

    let eager = ProgressTracker::new(store.clone(), "w2", &tracker_config(0));
    assert!(eager.claim_parent("C2", URL).await.unwrap());
    let stale = store.competition("STALE").await.unwrap().unwrap();
    assert_eq!(stale.status, CompetitionStatus::Pending);
    assert_eq!(stale.worker_id, None);
}

#[tokio::test]
async fn tracker_collaborator_flow() {
    let store = sqlite().await;
    let tracker = ProgressTracker::new(store.clone(), "w1", &TrackerConfig::default());
    let rival = ProgressTracker::new(store, "w2", &TrackerConfig::default());

    assert!(tracker.claim_parent("C1", URL).await.unwrap());
    assert!(!rival.claim_parent("C1", URL).await.unwrap());
    assert!(!rival.discover_children("C1", &seasons(2022..=2023)).await.unwrap());
    assert!(tracker.discover_children("C1", &seasons(2022..=2023)).await.unwrap());

    let claimed = tracker.claim_children("C1").await.unwrap();
    assert_eq!(claimed.len(), 2);
    assert!(!tracker.is_season_completed("C1", "s2023").await.unwrap());
    assert!(tracker.complete_child("C1", "s2023", 12).await.unwrap());
    assert!(tracker.is_season_completed("C1", "s2023").await.unwrap());
    assert_eq!(
        tracker.fail_child("C1", "s2022", "no table").await.unwrap(),
        Some(SeasonStatus::Pending)
    );
    assert!(!tracker.is_competition_completed("C1").await.unwrap());

    let again = tracker.claim_children("C1").await.unwrap();
    assert_eq!(again, vec![SeasonRef::new("s2022", "2022")]);
    assert!(tracker.complete_child("C1", "s2022", 0).await.unwrap());
    assert!(tracker.is_competition_completed("C1").await.unwrap());
    assert_eq!(
        tracker.competition_status("C1").await.unwrap(),
        Some(CompetitionStatus::Completed)
    );
    assert_eq!(tracker.competition_status("missing").await.unwrap(), None);
    assert!(tracker.failed_seasons().await.unwrap().is_empty());
}

/// Full suite against a live PostgreSQL server, run sequentially on one database.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn postgres_property_suite() {
    let Ok(url) = std::env::var("HARVEST_TEST_POSTGRES_URL") else {
        return;
    };
    let store = ProgressDb::connect(&url).await.unwrap();

    store.clear_all().await.unwrap();
    check_competition_claim_is_exclusive(store.clone()).await;
    store.clear_all().await.unwrap();
    check_season_claims_are_disjoint(store.clone()).await;
    store.clear_all().await.unwrap();
    check_claimed_seasons_newest_first(store.clone()).await;
    store.clear_all().await.unwrap();
    check_discovery_requires_ownership(store.clone()).await;
    store.clear_all().await.unwrap();
    check_roll_up_on_last_completion(store.clone()).await;
    store.clear_all().await.unwrap();
    check_concurrent_last_completions_roll_up(store.clone()).await;
    store.clear_all().await.unwrap();
    check_completed_is_never_resurrected(store.clone()).await;
    store.clear_all().await.unwrap();
    check_failure_requeues_then_exhausts(store.clone()).await;
    store.clear_all().await.unwrap();
    check_only_holder_reports(store.clone()).await;
    store.clear_all().await.unwrap();
    check_stale_recovery_is_idempotent(store.clone()).await;
    store.clear_all().await.unwrap();
    check_stale_recovery_respects_retry_ceiling(store.clone()).await;
    store.clear_all().await.unwrap();
    check_complete_seasons_before_cutoff(store.clone()).await;
    store.clear_all().await.unwrap();
    check_manual_resets(store.clone()).await;
    store.clear_all().await.unwrap();
    check_reclaim_of_fully_completed_competition_rolls_up(store.clone()).await;
    store.clear_all().await.unwrap();
}
