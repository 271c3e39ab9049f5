//! Operator CLI for harvest: inspect and repair the work queue and the
//! progress database. Workers embed `harvest_core` directly.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use harvest_core::config::{self, HarvestConfig};
use std::path::PathBuf;

use commands::{run_progress, run_queue};

#[derive(Debug, Parser)]
#[command(name = "harvest")]
#[command(about = "harvest: coordinate distributed collection workers", long_about = None)]
pub struct Cli {
    /// Override the configured worker id.
    #[arg(long, global = true, value_name = "ID")]
    pub worker_id: Option<String>,

    /// Override the configured progress database URL (sqlite:... or postgres://...).
    #[arg(long, global = true, value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the configured queue checkout.
    #[arg(long, global = true, value_name = "DIR")]
    pub repo_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Git-backed work queue.
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Competition and season progress database.
    #[command(subcommand)]
    Progress(ProgressCommand),
}

#[derive(Debug, Clone, Subcommand)]
pub enum QueueCommand {
    /// Count items per folder.
    Status,

    /// Publish a new work order for a competition.
    Create {
        competition_id: String,
        competition_url: String,
        /// Season already done elsewhere; repeat for several.
        #[arg(long = "completed-season", value_name = "SEASON")]
        completed_seasons: Vec<String>,
    },

    /// List completed items.
    Completed,

    /// List failed items with their errors.
    Failed,

    /// Requeue failed items still under the retry ceiling.
    RetryFailed {
        /// Defaults to `queue.max_retries` from the config.
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,
    },

    /// Return claims held longer than the given age to `available`.
    ReleaseStale {
        #[arg(long, default_value = "7200", value_name = "SECS")]
        older_than: u64,
    },

    /// Remove processed completed items from the queue.
    Archive {
        /// Work ids to archive.
        #[arg(required_unless_present = "all")]
        work_ids: Vec<String>,
        /// Archive every completed item.
        #[arg(long, conflicts_with = "work_ids")]
        all: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProgressCommand {
    /// Totals per status, clubs saved, active workers.
    Summary {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List seasons that exhausted their retries.
    Failed,

    /// Release rows stuck in progress past the staleness threshold.
    Recover,

    /// Put failed seasons back to pending with a fresh retry budget.
    ResetFailed {
        /// Only this competition.
        competition_id: Option<String>,
    },

    /// Reset a competition and all its seasons to pending.
    ResetCompetition { competition_id: String },

    /// Delete all progress rows.
    Clear {
        /// Required; there is no undo.
        #[arg(long)]
        yes: bool,
    },
}

impl Cli {
    /// Config file with the command-line overrides applied.
    pub fn load_config(&self) -> Result<HarvestConfig> {
        let mut cfg = config::load_or_init()?;
        self.apply_overrides(&mut cfg);
        Ok(cfg)
    }

    fn apply_overrides(&self, cfg: &mut HarvestConfig) {
        if let Some(id) = &self.worker_id {
            cfg.worker_id = Some(id.clone());
        }
        if let Some(url) = &self.database_url {
            cfg.database_url = Some(url.clone());
        }
        if let Some(path) = &self.repo_path {
            cfg.queue.repo_path = path.clone();
        }
    }

    pub async fn run(self, cfg: HarvestConfig) -> Result<()> {
        tracing::debug!("loaded config: {:?}", cfg);
        match self.command {
            CliCommand::Queue(cmd) => {
                // Git subprocesses and retry sleeps block.
                tokio::task::spawn_blocking(move || run_queue(&cfg, cmd)).await??
            }
            CliCommand::Progress(cmd) => run_progress(&cfg, cmd).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
