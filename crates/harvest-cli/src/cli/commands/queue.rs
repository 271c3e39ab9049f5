//! `harvest queue ...` – operator view of the git-backed work queue.

use anyhow::Result;
use harvest_core::config::HarvestConfig;
use harvest_core::file_queue::{FileQueue, WorkItem};
use std::time::Duration;

use crate::cli::QueueCommand;

pub fn run_queue(cfg: &HarvestConfig, cmd: QueueCommand) -> Result<()> {
    let mut queue = FileQueue::open(&cfg.queue, &cfg.retry)?;
    tracing::debug!(repo = %cfg.queue.repo_path.display(), ?cmd, "queue command");

    match cmd {
        QueueCommand::Status => {
            let s = queue.status()?;
            println!("{:<10} {}", "FOLDER", "ITEMS");
            println!("{:<10} {}", "available", s.available);
            println!("{:<10} {}", "claimed", s.claimed);
            println!("{:<10} {}", "completed", s.completed);
            println!("{:<10} {}", "failed", s.failed);
        }
        QueueCommand::Create {
            competition_id,
            competition_url,
            completed_seasons,
        } => {
            let (work_id, pushed) =
                queue.create_work_order(&competition_id, &competition_url, completed_seasons)?;
            if pushed {
                println!("Created {work_id}");
            } else {
                println!("Created {work_id} locally; push it once the remote is reachable");
            }
        }
        QueueCommand::Completed => print_items(&queue.completed_work()?, |item| {
            item.completed_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string())
        }),
        QueueCommand::Failed => print_items(&queue.failed_work()?, |item| {
            item.error_message.clone().unwrap_or_else(|| "-".to_string())
        }),
        QueueCommand::RetryFailed { max_retries } => {
            let max = max_retries.unwrap_or(cfg.queue.max_retries);
            let (requeued, exhausted) = queue.retry_failed(max)?;
            println!("Requeued {requeued}, left {exhausted} at the retry limit ({max})");
        }
        QueueCommand::ReleaseStale { older_than } => {
            let released = queue.release_stale_claims(Duration::from_secs(older_than))?;
            println!("Released {released} stale claim(s)");
        }
        QueueCommand::Archive { work_ids, all } => {
            let mut archived = 0;
            for item in queue.completed_work()? {
                if all || work_ids.contains(&item.work_id) {
                    if queue.archive(&item)? {
                        archived += 1;
                    } else {
                        tracing::warn!(work_id = %item.work_id, "not archived");
                    }
                }
            }
            println!("Archived {archived} item(s)");
        }
    }
    Ok(())
}

fn print_items(items: &[WorkItem], detail: impl Fn(&WorkItem) -> String) {
    if items.is_empty() {
        println!("No items.");
        return;
    }
    println!("{:<28} {:<12} {:<24} {:<6} {}", "WORK ID", "COMPETITION", "WORKER", "TRIES", "DETAIL");
    for item in items {
        println!(
            "{:<28} {:<12} {:<24} {:<6} {}",
            item.work_id,
            item.competition_id,
            item.claimed_by.as_deref().unwrap_or("-"),
            item.retry_count,
            detail(item)
        );
    }
}
