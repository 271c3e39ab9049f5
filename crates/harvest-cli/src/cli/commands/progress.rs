//! `harvest progress ...` – inspect and repair the progress database.

use anyhow::{bail, Result};
use harvest_core::config::HarvestConfig;
use harvest_core::progress::{ProgressDb, ProgressTracker, StatusCounts};

use crate::cli::ProgressCommand;

pub async fn run_progress(cfg: &HarvestConfig, cmd: ProgressCommand) -> Result<()> {
    if let ProgressCommand::Clear { yes: false } = cmd {
        bail!("refusing to delete all progress without --yes");
    }

    let url = cfg.resolve_database_url()?;
    let store = ProgressDb::connect(&url).await?;
    let tracker = ProgressTracker::new(store, cfg.resolve_worker_id(), &cfg.tracker);

    match cmd {
        ProgressCommand::Summary { json } => {
            let summary = tracker.summary().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("worker {} ({})", summary.worker_id, summary.dialect);
                println!(
                    "{:<13} {:>6} {:>8} {:>11} {:>10} {:>9} {:>6} {:>6}",
                    "TABLE", "TOTAL", "PENDING", "IN_PROGRESS", "DISCOVERED", "COMPLETED", "FAILED", "DONE%"
                );
                print_counts("competitions", &summary.store.competitions);
                print_counts("seasons", &summary.store.seasons);
                println!("clubs saved: {}", summary.store.clubs_saved);
                println!("active workers: {}", summary.store.active_workers);
            }
        }
        ProgressCommand::Failed => {
            let failed = tracker.failed_seasons().await?;
            if failed.is_empty() {
                println!("No failed seasons.");
            } else {
                println!("{:<12} {:<10} {:<8} {:<6} {}", "COMPETITION", "SEASON", "YEAR", "TRIES", "ERROR");
                for s in failed {
                    println!(
                        "{:<12} {:<10} {:<8} {:<6} {}",
                        s.competition_id,
                        s.season_id,
                        s.season_year,
                        s.retry_count,
                        s.error_message.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        ProgressCommand::Recover => {
            let n = tracker.recover_stale().await?;
            println!("Recovered {n} stuck row(s)");
        }
        ProgressCommand::ResetFailed { competition_id } => {
            let n = tracker.reset_failed(competition_id.as_deref()).await?;
            println!("Reset {n} failed season(s)");
        }
        ProgressCommand::ResetCompetition { competition_id } => {
            let n = tracker.reset_competition(&competition_id).await?;
            println!("Reset {competition_id} ({n} season(s))");
        }
        ProgressCommand::Clear { .. } => {
            tracker.clear_all().await?;
            println!("Cleared all progress");
        }
    }
    Ok(())
}

fn print_counts(label: &str, c: &StatusCounts) {
    println!(
        "{:<13} {:>6} {:>8} {:>11} {:>10} {:>9} {:>6} {:>5.1}%",
        label,
        c.total,
        c.pending,
        c.in_progress,
        c.seasons_discovered,
        c.completed,
        c.failed,
        c.completion_percentage()
    );
}
