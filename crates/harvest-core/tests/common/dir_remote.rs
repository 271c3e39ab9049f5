//! In-process stand-in for a shared git remote.
//!
//! The "remote" is a versioned map of relative path -> bytes shared by every
//! worker. `pull`/`reset_to_remote` mirror it into the worker's directory;
//! `push` only succeeds if nobody pushed since this worker last synced,
//! which is exactly the compare-and-swap behaviour of a git push.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use harvest_core::file_queue::{FileQueue, Remote, WorkItem};
use harvest_core::retry::{RetryPolicy, SyncError};

#[derive(Debug, Default)]
struct RemoteState {
    version: u64,
    files: BTreeMap<PathBuf, Vec<u8>>,
}

/// Handle to the shared remote; clone freely.
#[derive(Clone, Default)]
pub struct SharedRemote(Arc<Mutex<RemoteState>>);

impl SharedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker remote syncing into `workdir`.
    pub fn worker(&self, workdir: &Path) -> DirRemote {
        DirRemote {
            workdir: workdir.to_path_buf(),
            shared: self.clone(),
            base_version: 0,
            failing_pushes: 0,
            offline: false,
        }
    }

    /// Queue for a worker with a fast retry policy.
    pub fn queue(&self, workdir: &Path) -> FileQueue<DirRemote> {
        FileQueue::new(workdir.to_path_buf(), self.worker(workdir), fast_policy())
    }

    /// Commit a file directly to the remote, as another machine would.
    pub fn put(&self, rel: &str, bytes: Vec<u8>) {
        let mut state = self.0.lock().unwrap();
        state.files.insert(PathBuf::from(rel), bytes);
        state.version += 1;
    }

    pub fn put_item(&self, folder: &str, name: &str, item: &WorkItem) {
        let json = serde_json::to_vec_pretty(item).unwrap();
        self.put(&format!("{}/{}.json", folder, name), json);
    }

    pub fn version(&self) -> u64 {
        self.0.lock().unwrap().version
    }

    /// JSON file names (not paths) in a remote folder.
    pub fn names(&self, folder: &str) -> Vec<String> {
        let state = self.0.lock().unwrap();
        state
            .files
            .keys()
            .filter(|p| p.parent() == Some(Path::new(folder)))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .filter(|n| n.ends_with(".json"))
            .collect()
    }

    /// Parsed items in a remote folder.
    pub fn items(&self, folder: &str) -> Vec<WorkItem> {
        let state = self.0.lock().unwrap();
        state
            .files
            .iter()
            .filter(|(p, _)| p.parent() == Some(Path::new(folder)))
            .filter(|(p, _)| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .map(|(_, bytes)| serde_json::from_slice(bytes).unwrap())
            .collect()
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 60,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(15),
        jitter: Duration::from_millis(5),
    }
}

pub struct DirRemote {
    workdir: PathBuf,
    shared: SharedRemote,
    base_version: u64,
    failing_pushes: u32,
    offline: bool,
}

impl DirRemote {
    /// The next `n` pushes fail as if the network dropped.
    pub fn fail_pushes(mut self, n: u32) -> Self {
        self.failing_pushes = n;
        self
    }

    /// Every sync fails.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    fn unreachable(command: &str) -> SyncError {
        SyncError::Command {
            command: command.to_string(),
            code: Some(128),
            stderr: "fatal: unable to access remote: Could not resolve host".to_string(),
        }
    }

    fn mirror(&mut self) -> Result<(), SyncError> {
        if self.offline {
            return Err(Self::unreachable("fetch"));
        }
        let state = self.shared.0.lock().unwrap();
        if self.workdir.exists() {
            for entry in fs::read_dir(&self.workdir)? {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
        }
        for (rel, bytes) in &state.files {
            let path = self.workdir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, bytes)?;
        }
        self.base_version = state.version;
        Ok(())
    }
}

fn snapshot(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            snapshot(root, &path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) != Some("tmp") {
            let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            out.insert(rel, fs::read(&path)?);
        }
    }
    Ok(())
}

impl Remote for DirRemote {
    fn pull(&mut self) -> Result<(), SyncError> {
        self.mirror()
    }

    fn reset_to_remote(&mut self) -> Result<(), SyncError> {
        self.mirror()
    }

    fn push(&mut self, _message: &str) -> Result<(), SyncError> {
        if self.offline {
            return Err(Self::unreachable("push"));
        }
        if self.failing_pushes > 0 {
            self.failing_pushes -= 1;
            return Err(Self::unreachable("push"));
        }
        let mut files = BTreeMap::new();
        snapshot(&self.workdir, &self.workdir, &mut files)?;

        let mut state = self.shared.0.lock().unwrap();
        if state.files == files {
            return Ok(());
        }
        if state.version != self.base_version {
            return Err(SyncError::Rejected);
        }
        state.files = files;
        state.version += 1;
        self.base_version = state.version;
        Ok(())
    }
}

/// Policy that gives up after three attempts (for exhaustion tests).
pub fn short_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter: Duration::ZERO,
    }
}
