//! On-disk layout of the queue inside the working copy.
//!
//! ```text
//! available/{work_id}.json
//! claim_attempts/{work_id}_{claim_id}.json
//! claimed/{file_id}.json
//! completed/{file_id}.json
//! failed/{file_id}.json
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::types::{parse_attempt_name, ClaimAttempt, WorkItem, WorkStatus};

pub const CLAIM_ATTEMPTS_DIR: &str = "claim_attempts";

/// Paths and file helpers for one queue root.
#[derive(Debug, Clone)]
pub struct QueueLayout {
    root: PathBuf,
}

impl QueueLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, status: WorkStatus) -> PathBuf {
        self.root.join(status.folder())
    }

    pub fn attempts_dir(&self) -> PathBuf {
        self.root.join(CLAIM_ATTEMPTS_DIR)
    }

    pub fn available_path(&self, work_id: &str) -> PathBuf {
        self.dir(WorkStatus::Available).join(format!("{}.json", work_id))
    }

    /// Where an item in the given state lives.
    pub fn item_path(&self, status: WorkStatus, item: &WorkItem) -> PathBuf {
        match status {
            WorkStatus::Available => self.available_path(&item.work_id),
            other => self.dir(other).join(format!("{}.json", item.file_id())),
        }
    }

    pub fn attempt_path(&self, attempt: &ClaimAttempt) -> PathBuf {
        self.attempts_dir().join(attempt.file_name())
    }

    /// Create every folder with a `.gitkeep` so empty folders survive a clone.
    pub fn ensure_dirs(&self) -> Result<()> {
        let dirs = WorkStatus::ALL
            .iter()
            .map(|s| self.dir(*s))
            .chain(std::iter::once(self.attempts_dir()));
        for dir in dirs {
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
            let keep = dir.join(".gitkeep");
            if !keep.exists() {
                fs::write(&keep, b"")?;
            }
        }
        Ok(())
    }

    /// JSON files in a folder, sorted by name. A missing folder is empty.
    pub fn json_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("list {}", dir.display())),
        };
        let mut out = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn count(&self, status: WorkStatus) -> Result<usize> {
        Ok(self.json_files(&self.dir(status))?.len())
    }

    /// Read one item. `Ok(None)` when the file is missing or malformed;
    /// malformed files are logged and left in place.
    pub fn read_item(&self, path: &Path) -> Result<Option<WorkItem>> {
        let data = match fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        match serde_json::from_str::<WorkItem>(&data) {
            Ok(item) => Ok(Some(item)),
            Err(e) => {
                tracing::warn!(path = %path.display(), "skipping malformed queue file: {}", e);
                Ok(None)
            }
        }
    }

    /// All well-formed items in a state folder whose `status` field agrees with it.
    pub fn read_items(&self, status: WorkStatus) -> Result<Vec<(PathBuf, WorkItem)>> {
        let mut out = Vec::new();
        for path in self.json_files(&self.dir(status))? {
            let Some(item) = self.read_item(&path)? else {
                continue;
            };
            if item.status != status {
                tracing::warn!(
                    path = %path.display(),
                    "skipping item with status {} in {} folder",
                    item.status,
                    status
                );
                continue;
            }
            out.push((path, item));
        }
        Ok(out)
    }

    pub fn write_item(&self, path: &Path, item: &WorkItem) -> Result<()> {
        let mut json = serde_json::to_string_pretty(item)?;
        json.push('\n');
        write_atomic(path, json.as_bytes())
    }

    pub fn write_attempt(&self, attempt: &ClaimAttempt) -> Result<PathBuf> {
        let path = self.attempt_path(attempt);
        let mut json = serde_json::to_string_pretty(attempt)?;
        json.push('\n');
        write_atomic(&path, json.as_bytes())?;
        Ok(path)
    }

    /// Claim-attempt file names for one work id, sorted.
    pub fn attempt_names(&self, work_id: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .json_files(&self.attempts_dir())?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .filter(|n| parse_attempt_name(work_id, n).is_some())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Remove every claim attempt for a work id. Returns how many were removed.
    pub fn remove_attempts(&self, work_id: &str) -> Result<usize> {
        let names = self.attempt_names(work_id)?;
        for name in &names {
            remove_if_exists(&self.attempts_dir().join(name))?;
        }
        Ok(names.len())
    }

    /// Remove claim attempts (for any work id) older than `cutoff_ms`.
    pub fn sweep_attempts_before(&self, cutoff_ms: i64) -> Result<usize> {
        let mut removed = 0;
        for path in self.json_files(&self.attempts_dir())? {
            let Ok(data) = fs::read_to_string(&path) else {
                continue;
            };
            let stale = match serde_json::from_str::<ClaimAttempt>(&data) {
                Ok(a) => a.claimed_at < cutoff_ms,
                Err(_) => true,
            };
            if stale && remove_if_exists(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Delete a file; `Ok(false)` if it was already gone.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}
