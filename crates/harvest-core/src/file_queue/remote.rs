//! Synchronisation with the shared remote.
//!
//! The queue only needs three operations from version control: bring the
//! working copy up to date, throw local state away in favour of the remote
//! tip, and publish local changes. Pushes must be compare-and-swap: a push
//! based on an outdated tip is rejected rather than merged.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::retry::{is_rejected_push, SyncError};

pub trait Remote: Send {
    /// Bring the working copy up to date, keeping local commits on top.
    fn pull(&mut self) -> Result<(), SyncError>;
    /// Discard all local changes and match the remote tip exactly.
    fn reset_to_remote(&mut self) -> Result<(), SyncError>;
    /// Record every local change with `message` and publish it.
    /// A no-op when nothing changed.
    fn push(&mut self, message: &str) -> Result<(), SyncError>;
}

/// Whether the queue branch exists on the remote yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    Present,
    Missing,
}

/// `git` CLI backed remote operating on one working copy.
#[derive(Debug, Clone)]
pub struct GitRemote {
    workdir: PathBuf,
    remote: String,
    branch: String,
    url: Option<String>,
}

impl GitRemote {
    pub fn new(workdir: impl Into<PathBuf>, remote: &str, branch: &str) -> Self {
        Self {
            workdir: workdir.into(),
            remote: remote.to_string(),
            branch: branch.to_string(),
            url: None,
        }
    }

    /// Clone from (or register the remote as) `url` when the working copy lacks it.
    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn git(&self, args: &[&str]) -> Result<std::process::Output, SyncError> {
        let out = Command::new("git")
            .arg("-C")
            .arg(&self.workdir)
            .args(args)
            .output()?;
        Ok(out)
    }

    /// Run git and fail on non-zero exit.
    fn run(&self, args: &[&str]) -> Result<(), SyncError> {
        let out = self.git(args)?;
        if out.status.success() {
            return Ok(());
        }
        Err(failed(args, &out))
    }

    /// Make the working copy usable: clone (or init) it when missing, register
    /// the remote, set a committer identity if none is configured, and put
    /// HEAD on the queue branch.
    pub fn prepare(&mut self) -> Result<BranchState, SyncError> {
        if !self.workdir.join(".git").exists() {
            self.create()?;
        }
        if let Some(url) = &self.url {
            if !self.git(&["remote", "get-url", &self.remote])?.status.success() {
                self.run(&["remote", "add", &self.remote, url])?;
            }
        }
        self.ensure_identity()?;

        let state = self.remote_branch()?;
        let on_branch = self.current_branch()?.as_deref() == Some(self.branch.as_str());
        match state {
            BranchState::Present => {
                self.run(&["fetch", &self.remote, &self.branch])?;
                let tip = format!("{}/{}", self.remote, self.branch);
                if !on_branch || !self.has_commits()? {
                    self.run(&["checkout", "--quiet", "-B", &self.branch, &tip])?;
                } else if !self.git(&["merge-base", "HEAD", &tip])?.status.success() {
                    // Leftover from losing the race to create the branch.
                    tracing::warn!(branch = %self.branch, "local branch shares no history with the remote, adopting the remote tip");
                    self.run(&["reset", "--hard", &tip])?;
                }
            }
            BranchState::Missing if !on_branch => {
                if self.has_commits()? {
                    self.run(&["checkout", "--quiet", "-B", &self.branch])?;
                } else {
                    let head = format!("refs/heads/{}", self.branch);
                    self.run(&["symbolic-ref", "HEAD", &head])?;
                }
            }
            BranchState::Missing => {}
        }
        tracing::debug!(workdir = %self.workdir.display(), branch = %self.branch, ?state, "working copy ready");
        Ok(state)
    }

    fn create(&self) -> Result<(), SyncError> {
        fs::create_dir_all(&self.workdir)?;
        let Some(url) = &self.url else {
            tracing::info!(workdir = %self.workdir.display(), "initialising empty working copy");
            return self.run(&["init", "--quiet"]);
        };
        tracing::info!(workdir = %self.workdir.display(), url = %url, "cloning queue repository");
        let out = Command::new("git")
            .args(["clone", "--quiet", "--origin", self.remote.as_str(), url.as_str()])
            .arg(&self.workdir)
            .output()?;
        if out.status.success() {
            Ok(())
        } else {
            Err(failed(&["clone", url.as_str()], &out))
        }
    }

    fn ensure_identity(&self) -> Result<(), SyncError> {
        for (key, value) in [("user.name", "harvest"), ("user.email", "harvest@localhost")] {
            if !self.git(&["config", key])?.status.success() {
                self.run(&["config", key, value])?;
            }
        }
        Ok(())
    }

    fn remote_branch(&self) -> Result<BranchState, SyncError> {
        let args = ["ls-remote", "--exit-code", "--heads", self.remote.as_str(), self.branch.as_str()];
        let out = self.git(&args)?;
        match out.status.code() {
            Some(0) => Ok(BranchState::Present),
            Some(2) => Ok(BranchState::Missing),
            _ => Err(failed(&args, &out)),
        }
    }

    fn current_branch(&self) -> Result<Option<String>, SyncError> {
        let out = self.git(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
    }

    fn has_commits(&self) -> Result<bool, SyncError> {
        Ok(self
            .git(&["rev-parse", "--verify", "--quiet", "HEAD"])?
            .status
            .success())
    }

    /// First commit of the queue branch, pushed with upstream tracking.
    pub fn publish_branch(&mut self, message: &str) -> Result<(), SyncError> {
        self.run(&["add", "-A"])?;
        self.run(&["commit", "--quiet", "--allow-empty", "-m", message])?;
        self.push_head(true)
    }

    fn push_head(&self, set_upstream: bool) -> Result<(), SyncError> {
        let refspec = format!("HEAD:refs/heads/{}", self.branch);
        let mut args = vec!["push"];
        if set_upstream {
            args.push("-u");
        }
        args.extend([self.remote.as_str(), refspec.as_str()]);
        let out = self.git(&args)?;
        if out.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        if is_rejected_push(&stderr) {
            tracing::debug!(branch = %self.branch, "push rejected: {}", stderr);
            return Err(SyncError::Rejected);
        }
        Err(SyncError::Command {
            command: args.join(" "),
            code: out.status.code(),
            stderr,
        })
    }
}

fn failed(args: &[&str], out: &std::process::Output) -> SyncError {
    SyncError::Command {
        command: args.join(" "),
        code: out.status.code(),
        stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
    }
}

impl Remote for GitRemote {
    fn pull(&mut self) -> Result<(), SyncError> {
        let result = self.run(&["pull", "--no-edit", "--rebase", &self.remote, &self.branch]);
        if result.is_err() {
            // Leave the working copy usable for the reset that follows.
            let _ = self.git(&["rebase", "--abort"]);
        }
        result
    }

    fn reset_to_remote(&mut self) -> Result<(), SyncError> {
        self.run(&["fetch", &self.remote, &self.branch])?;
        let tip = format!("{}/{}", self.remote, self.branch);
        self.run(&["reset", "--hard", &tip])?;
        self.run(&["clean", "-fd"])
    }

    fn push(&mut self, message: &str) -> Result<(), SyncError> {
        self.run(&["add", "-A"])?;
        let staged = self.git(&["diff", "--cached", "--quiet"])?;
        match staged.status.code() {
            Some(0) => {}
            Some(1) => self.run(&["commit", "--quiet", "-m", message])?,
            code => {
                return Err(SyncError::Command {
                    command: "diff --cached --quiet".to_string(),
                    code,
                    stderr: String::from_utf8_lossy(&staged.stderr).trim().to_string(),
                })
            }
        }
        self.push_head(false)
    }
}
