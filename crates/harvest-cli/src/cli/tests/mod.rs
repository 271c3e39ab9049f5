//! CLI parse tests, one file per command group.

use super::{Cli, CliCommand};
use clap::Parser;
use harvest_core::config::HarvestConfig;

pub(super) fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}


#[test]
fn cli_parse_global_overrides() {
    let cli = Cli::try_parse_from([
        "harvest",
        "queue",
        "status",
        "--worker-id",
        "box-7",
        "--database-url",
        "postgres://db/harvest",
        "--repo-path",
        "/srv/work",
    ])
    .unwrap();
    assert_eq!(cli.worker_id.as_deref(), Some("box-7"));
    assert_eq!(cli.database_url.as_deref(), Some("postgres://db/harvest"));
    assert_eq!(cli.repo_path.as_deref(), Some(std::path::Path::new("/srv/work")));
}

#[test]
fn cli_overrides_replace_config_values() {
    let cli = Cli::try_parse_from([
        "harvest",
        "--repo-path",
        "/srv/work",
        "progress",
        "failed",
        "--database-url",
        "sqlite::memory:",
    ])
    .unwrap();
    let mut cfg = HarvestConfig::default();
    cfg.worker_id = Some("from-file".to_string());
    cli.apply_overrides(&mut cfg);
    assert_eq!(cfg.worker_id.as_deref(), Some("from-file"));
    assert_eq!(cfg.database_url.as_deref(), Some("sqlite::memory:"));
    assert_eq!(cfg.queue.repo_path, std::path::PathBuf::from("/srv/work"));
    assert_eq!(cfg.queue.branch, "main");
}

#[test]
fn cli_requires_a_command() {
    assert!(Cli::try_parse_from(["harvest"]).is_err());
    assert!(Cli::try_parse_from(["harvest", "queue"]).is_err());
}
