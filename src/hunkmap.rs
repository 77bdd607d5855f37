//! Changed-line maps produced by the diff adapter
//!
//! A HunkMap maps a file path (relative to the repository root) to the
//! starting line numbers of its changed hunks. It is persisted as
//! `.work/{branch}.json`, e.g. `{"src/a.c": [12, 40]}`, and doubles as the
//! `only` filter of the annotation engine.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HunkMap {
    files: BTreeMap<String, Vec<usize>>,
}

impl HunkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hunk start line, coalescing duplicates
    pub fn insert(&mut self, file: impl Into<String>, line: usize) {
        let lines = self.files.entry(file.into()).or_default();
        if let Err(pos) = lines.binary_search(&line) {
            lines.insert(pos, line);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn contains_file(&self, file: &str) -> bool {
        self.files.contains_key(file)
    }

    /// Hunk start lines recorded for `file`
    pub fn lines(&self, file: &str) -> Option<&[usize]> {
        self.files.get(file).map(Vec::as_slice)
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// True when any recorded line of `file` falls inside `range`
    pub fn touches(&self, file: &str, range: &RangeInclusive<usize>) -> bool {
        self.lines(file)
            .is_some_and(|lines| lines.iter().any(|l| range.contains(l)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::ConfigInvalid(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Vcs(format!("cannot serialize hunk map: {}", e)))?;
        fs::write(path, json).map_err(|e| Error::io(path, e))
    }
}
