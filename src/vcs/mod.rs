//! Version-control port
//!
//! The pipeline talks to version control only through [`VersionControl`].
//! [`GitCli`] is the live adapter; tests substitute an in-memory fake.

pub mod diff;
pub mod git;

pub use diff::parse_unified_zero;
pub use git::GitCli;

use crate::error::Result;
use crate::hunkmap::HunkMap;
use crate::workdir::WorkDir;

/// Diff, stash and checkout primitives used by the pipeline
pub trait VersionControl {
    /// Name of the checked out branch
    fn current_branch(&self) -> Result<String>;

    /// HunkMaps for `base..head`, keyed by base and head file paths.
    /// Does not touch the working tree.
    fn hunkmaps(&self, base: &str, head: &str) -> Result<(HunkMap, HunkMap)>;

    /// Stash uncommitted changes and check out `target`
    ///
    /// A clean tree is not an error: nothing is stashed and only the
    /// checkout happens.
    fn stash_and_checkout(&mut self, target: &str) -> Result<()>;

    /// Discard working-tree edits and return to the branch active before
    /// [`VersionControl::stash_and_checkout`]
    fn restore_previous(&mut self) -> Result<()>;

    /// Re-apply the change set stashed earlier; nothing to pop is fine
    fn pop_stash(&mut self) -> Result<()>;
}

/// Persist both maps as `.work/{base}.json` and `.work/{head}.json`
///
/// When the branches coincide only one (empty) file is written.
pub fn persist_hunkmaps(work: &WorkDir, base: &str, head: &str, maps: &(HunkMap, HunkMap)) -> Result<()> {
    maps.0.save(&work.hunkmap(base))?;
    if head != base {
        maps.1.save(&work.hunkmap(head))?;
    }
    tracing::info!(
        base,
        head,
        base_files = maps.0.len(),
        head_files = maps.1.len(),
        "persisted hunk maps"
    );
    Ok(())
}
