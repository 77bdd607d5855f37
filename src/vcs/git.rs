//! Live version-control adapter using the `git` CLI

use super::{parse_unified_zero, VersionControl};
use crate::error::{Error, Result};
use crate::hunkmap::HunkMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const STASH_REF: &str = "refs/stash";

/// Shells out to `git` inside one repository
///
/// Remembers the branch it left and whether it created a stash entry so
/// that restore and pop undo exactly what this adapter did.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
    previous: Option<String>,
    stashed: bool,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            previous: None,
            stashed: false,
        }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// True when `git` runs and `repo` is inside a work tree
    pub fn is_available(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        tracing::trace!("git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .output()
            .map_err(|e| Error::Vcs(format!("cannot run git {}: {}", args.join(" "), e)))
    }

    fn run_ok(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Vcs(format!("git {} failed: {}", args.join(" "), stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn stash_head(&self) -> Option<String> {
        self.run(&["rev-parse", "-q", "--verify", STASH_REF])
            .ok()
            .filter(|o| o.status.success())
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
    }
}

impl VersionControl for GitCli {
    fn current_branch(&self) -> Result<String> {
        let name = self.run_ok(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(name.trim().to_string())
    }

    fn hunkmaps(&self, base: &str, head: &str) -> Result<(HunkMap, HunkMap)> {
        let range = format!("{}..{}", base, head);
        let diff = self.run_ok(&["diff", "--unified=0", "--diff-filter=M", "--color=never", &range])?;
        Ok(parse_unified_zero(&diff))
    }

    fn stash_and_checkout(&mut self, target: &str) -> Result<()> {
        let current = self.current_branch()?;
        let before = self.stash_head();
        let output = self.run(&["stash", "push", "-m", "autoperf"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::RepoDirty(stderr.trim().to_string()));
        }
        self.stashed = self.stash_head() != before;
        tracing::info!(stashed = self.stashed, from = %current, to = target, "switching branch");
        self.previous = Some(current);
        self.run_ok(&["checkout", target])?;
        Ok(())
    }

    fn restore_previous(&mut self) -> Result<()> {
        let Some(previous) = self.previous.take() else {
            return Ok(());
        };
        self.run_ok(&["reset", "--hard"])?;
        self.run_ok(&["checkout", &previous])?;
        tracing::info!(branch = %previous, "restored branch");
        Ok(())
    }

    fn pop_stash(&mut self) -> Result<()> {
        if !self.stashed {
            tracing::debug!("no stash entry was created, nothing to pop");
            return Ok(());
        }
        self.stashed = false;
        let output = self.run(&["stash", "pop"])?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No stash entries") {
            tracing::warn!("stash was already empty");
            return Ok(());
        }
        Err(Error::Vcs(format!("git stash pop failed: {}", stderr.trim())))
    }
}
