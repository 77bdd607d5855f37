//! Layout of the hidden `.work/` directory
//!
//! ```text
//! .work/
//!   config           serialized RepoConfig
//!   COUNTERS         HPC event descriptors (user supplied)
//!   {branch}.json    HunkMaps
//!   train/run_N/     nominal traces
//!   detect/run_N/    candidate traces
//!   model/           persisted weights
//!   scaler           persisted scaling parameters
//!   threshold.npy    scalar threshold
//!   report           final report
//!   logs/
//! ```

use crate::config::RepoConfig;
use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const WORK_DIR: &str = ".work";
pub const CONFIG_FILE: &str = "config";
pub const COUNTERS_FILE: &str = "COUNTERS";
pub const TRAIN_DIR: &str = "train";
pub const DETECT_DIR: &str = "detect";
pub const MODEL_DIR: &str = "model";
pub const SCALER_FILE: &str = "scaler";
pub const THRESHOLD_FILE: &str = "threshold.npy";
pub const REPORT_FILE: &str = "report";
pub const LOGS_DIR: &str = "logs";

/// Prefix of per-run measurement directories
pub const RUN_PREFIX: &str = "run_";

/// Handle on the `.work/` directory of one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// Work directory for the repository rooted at `repo_root`
    pub fn for_repo(repo_root: &Path) -> Self {
        Self {
            path: repo_root.join(WORK_DIR),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> PathBuf {
        self.path.join(CONFIG_FILE)
    }

    pub fn counters(&self) -> PathBuf {
        self.path.join(COUNTERS_FILE)
    }

    pub fn train_dir(&self) -> PathBuf {
        self.path.join(TRAIN_DIR)
    }

    pub fn detect_dir(&self) -> PathBuf {
        self.path.join(DETECT_DIR)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.path.join(MODEL_DIR)
    }

    pub fn scaler(&self) -> PathBuf {
        self.path.join(SCALER_FILE)
    }

    pub fn threshold(&self) -> PathBuf {
        self.path.join(THRESHOLD_FILE)
    }

    pub fn report(&self) -> PathBuf {
        self.path.join(REPORT_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.path.join(LOGS_DIR)
    }

    /// Location of the persisted HunkMap for `branch`
    pub fn hunkmap(&self, branch: &str) -> PathBuf {
        self.path.join(format!("{}.json", branch))
    }

    /// Create the directory (and `logs/`) if missing
    pub fn ensure(&self) -> Result<()> {
        let logs = self.logs_dir();
        fs::create_dir_all(&logs).map_err(|e| Error::io(&logs, e))
    }

    /// Create `.work/`, seed `config` and an empty `COUNTERS`
    ///
    /// An existing config is kept unless `force` is set. When the repository
    /// is a git checkout, `.work/` is added to `.git/info/exclude` so stash and
    /// checkout never carry the tool's artefacts.
    pub fn init(repo_root: &Path, force: bool) -> Result<Self> {
        let work = Self::for_repo(repo_root);
        work.ensure()?;

        let config_path = work.config();
        if force || !config_path.exists() {
            let text = RepoConfig::template(repo_root).to_toml_string()?;
            fs::write(&config_path, text).map_err(|e| Error::io(&config_path, e))?;
            tracing::info!("wrote {}", config_path.display());
        } else {
            tracing::info!("keeping existing {}", config_path.display());
        }

        let counters = work.counters();
        if !counters.exists() {
            fs::write(&counters, "").map_err(|e| Error::io(&counters, e))?;
        }

        exclude_from_git(repo_root)?;
        Ok(work)
    }

    /// Remove everything except `config` and `COUNTERS`
    ///
    /// Returns the removed paths.
    pub fn clean(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(Error::io(&self.path, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.path, e))?;
            let name = entry.file_name();
            if name == CONFIG_FILE || name == COUNTERS_FILE {
                continue;
            }
            let path = entry.path();
            tracing::info!("removing {}", path.display());
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| Error::io(&path, e))?;
            removed.push(path);
        }
        removed.sort();
        Ok(removed)
    }
}

fn exclude_from_git(repo_root: &Path) -> Result<()> {
    let git_dir = repo_root.join(".git");
    if !git_dir.is_dir() {
        return Ok(());
    }
    let info = git_dir.join("info");
    fs::create_dir_all(&info).map_err(|e| Error::io(&info, e))?;
    let exclude = info.join("exclude");
    let pattern = format!("/{}/", WORK_DIR);

    let existing = fs::read_to_string(&exclude).unwrap_or_default();
    if existing.lines().any(|l| l.trim() == pattern) {
        return Ok(());
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&exclude)
        .map_err(|e| Error::io(&exclude, e))?;
    let sep = if existing.is_empty() || existing.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    writeln!(file, "{}{}", sep, pattern).map_err(|e| Error::io(&exclude, e))
}

/// Parse the index out of a `run_N` directory name
pub fn run_index(name: &str) -> Option<usize> {
    name.strip_prefix(RUN_PREFIX)?.parse().ok()
}

/// All `run_N` subdirectories of `dir`, ordered by index
pub fn list_runs(dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let mut runs = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(runs),
        Err(e) => return Err(Error::io(dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(idx) = entry.file_name().to_str().and_then(run_index) {
            runs.push((idx, path));
        }
    }
    runs.sort();
    Ok(runs)
}

/// Next unused run index in `dir`: max existing + 1, or 0
pub fn next_run_index(dir: &Path) -> Result<usize> {
    Ok(list_runs(dir)?
        .last()
        .map(|(idx, _)| idx + 1)
        .unwrap_or(0))
}

/// Path of run `index` under `dir`
pub fn run_dir(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{}{}", RUN_PREFIX, index))
}
