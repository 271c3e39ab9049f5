use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::termination::TerminationConfig;

/// Retry policy parameters for every synchronise-and-push cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds; the n-th retry waits `base * 2^n` plus jitter.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Upper bound of the random jitter added to each delay, in seconds.
    pub jitter_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 1.0,
            max_delay_secs: 60,
            jitter_secs: 1.0,
        }
    }
}

/// Git-backed file queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Local working copy holding the queue folders.
    pub repo_path: PathBuf,
    /// Name of the shared remote.
    pub remote: String,
    /// Clone source when `repo_path` is not a working copy yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    /// Branch every worker pulls from and pushes to.
    pub branch: String,
    /// Failed items with this many retries stay in `failed`.
    pub max_retries: u32,
    /// Claim attempts older than this are ignored by the tie-break.
    pub claim_attempt_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("./scraping-work"),
            remote: "origin".to_string(),
            remote_url: None,
            branch: "main".to_string(),
            max_retries: 3,
            claim_attempt_ttl_secs: 600,
        }
    }
}

/// Relational progress tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// An `in_progress` row older than this is presumed abandoned.
    pub stale_after_secs: u64,
    /// Minimum interval between automatic stale-job sweeps.
    pub recovery_interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 30 * 60,
            recovery_interval_secs: 60,
        }
    }
}

/// Log output settings. `RUST_LOG` takes precedence over `filter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber` env-filter directives.
    pub filter: String,
    /// Write to `~/.local/state/harvest/harvest.log` instead of stderr.
    pub to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,harvest_core=debug,harvest_cli=debug".to_string(),
            to_file: true,
        }
    }
}

/// Global configuration loaded from `~/.config/harvest/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Stable worker identity; generated per process when unset.
    #[serde(default)]
    pub worker_id: Option<String>,
    /// `sqlite://...` or `postgres://...`; defaults to a SQLite file in the state dir.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub termination: TerminationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HarvestConfig {
    /// Configured worker id, or a fresh `{hostname}-{pid}-{8 hex}` identity.
    pub fn resolve_worker_id(&self) -> String {
        match self.worker_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_worker_id(),
        }
    }

    /// Configured database URL, or the default SQLite file under the XDG state dir.
    pub fn resolve_database_url(&self) -> Result<String> {
        if let Some(url) = self.database_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.to_string());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("harvest")?;
        let path = xdg_dirs.place_state_file("progress.db")?;
        Ok(crate::progress::path_to_sqlite_uri(&path) + "?mode=rwc")
    }
}

fn generate_worker_id() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "worker".to_string());
    let host: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", host, std::process::id(), &suffix[..8])
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("harvest")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<HarvestConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = HarvestConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: HarvestConfig = toml::from_str(&data)?;
    Ok(cfg)
}
