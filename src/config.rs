//! Repository configuration loaded from `.work/config`
//!
//! The file is TOML, one table per concern:
//!
//! ```toml
//! [build]
//! dir = "/path/to/repo"
//! cmd = "make"
//!
//! [clean]
//! cmd = "make clean"
//!
//! [workload]
//! cmd = "make eval-probe"
//! dir = "."
//!
//! [git]
//! main = "master"
//!
//! [model]
//! encoding = 4
//! hidden = [16, 8]
//! ```
//!
//! `[training]`, `[detection]` and `[clean]` are optional.

use crate::autoencoder::Activation;
use crate::error::{Error, Result};
use crate::workdir::{WORK_DIR, CONFIG_FILE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Immutable description of the repository under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub build: BuildConfig,
    #[serde(default)]
    pub clean: CleanConfig,
    pub workload: WorkloadConfig,
    pub git: GitConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Repository root
    pub dir: PathBuf,
    /// Shell command that builds the instrumented code
    pub cmd: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanConfig {
    /// Run before every build when non-empty
    #[serde(default)]
    pub cmd: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Shell command executed once per HPC event
    pub cmd: String,
    /// Working directory of the workload (where the probe writes its CSV)
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitConfig {
    /// Branch used as the nominal baseline
    pub main: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Bottleneck layer width
    pub encoding: usize,
    /// Hidden layer widths between input and bottleneck, outermost first
    pub hidden: Vec<usize>,
    #[serde(default)]
    pub activation: Activation,
}

/// Hyperparameters of the training loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Standard deviation of the gaussian noise added to training inputs
    pub noise: f64,
    pub seed: u64,
    /// Stop when the relative epoch loss improvement drops below this (0 disables)
    pub min_delta: f64,
    /// Fraction of rows held out to track validation loss
    pub validation_split: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 12,
            batch_size: 64,
            learning_rate: 0.05,
            noise: 0.25,
            seed: 42,
            min_delta: 0.0,
            validation_split: 0.2,
        }
    }
}

/// Thresholding policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Quantile of training reconstruction errors used as the threshold
    pub percentile: f64,
    /// Fraction of over-threshold rows above which a whole run is anomalous
    pub run_ratio: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            percentile: 0.99,
            run_ratio: 0.05,
        }
    }
}

impl RepoConfig {
    /// Default configuration for a freshly initialized repository
    pub fn template(root: &Path) -> Self {
        Self {
            build: BuildConfig {
                dir: root.to_path_buf(),
                cmd: "make".to_string(),
            },
            clean: CleanConfig {
                cmd: "make clean".to_string(),
            },
            workload: WorkloadConfig {
                cmd: "make eval-probe".to_string(),
                dir: PathBuf::from("."),
            },
            git: GitConfig {
                main: "master".to_string(),
            },
            model: ModelConfig {
                encoding: 4,
                hidden: vec![16, 8],
                activation: Activation::default(),
            },
            training: TrainingConfig::default(),
            detection: DetectionConfig::default(),
        }
    }

    /// Parse and validate a configuration from TOML text
    ///
    /// Relative `build.dir` and `workload.dir` are resolved against `base`.
    pub fn from_toml_str(content: &str, base: &Path) -> Result<Self> {
        let mut config: RepoConfig =
            toml::from_str(content).map_err(|e| Error::ConfigInvalid(e.to_string()))?;

        if config.build.dir.is_relative() {
            config.build.dir = base.join(&config.build.dir);
        }
        if config.workload.dir.is_relative() {
            config.workload.dir = config.build.dir.join(&config.workload.dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load `.work/config` below `root`
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(WORK_DIR).join(CONFIG_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::ConfigInvalid(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content, root)
    }

    /// Walk up from `start` until a directory holding `.work/config` is found
    pub fn discover(start: &Path) -> Result<(PathBuf, Self)> {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir.join(WORK_DIR).join(CONFIG_FILE).is_file() {
                let config = Self::load(dir)?;
                return Ok((dir.to_path_buf(), config));
            }
            current = dir.parent();
        }
        Err(Error::ConfigInvalid(format!(
            "no {}/{} found in {} or any parent (run `autoperf init`)",
            WORK_DIR,
            CONFIG_FILE,
            start.display()
        )))
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::ConfigInvalid(e.to_string()))
    }

    /// Check required fields and value ranges
    pub fn validate(&self) -> Result<()> {
        if self.build.cmd.trim().is_empty() {
            return Err(Error::ConfigInvalid("build.cmd is empty".to_string()));
        }
        if self.workload.cmd.trim().is_empty() {
            return Err(Error::ConfigInvalid("workload.cmd is empty".to_string()));
        }
        if self.git.main.trim().is_empty() {
            return Err(Error::ConfigInvalid("git.main is empty".to_string()));
        }
        if self.model.encoding == 0 {
            return Err(Error::ConfigInvalid(
                "model.encoding must be at least 1".to_string(),
            ));
        }
        if let Some(pos) = self.model.hidden.iter().position(|&w| w == 0) {
            return Err(Error::ConfigInvalid(format!(
                "model.hidden[{}] must be at least 1",
                pos
            )));
        }
        if self.training.batch_size == 0 {
            return Err(Error::ConfigInvalid(
                "training.batch_size must be at least 1".to_string(),
            ));
        }
        if !(self.training.learning_rate > 0.0) {
            return Err(Error::ConfigInvalid(format!(
                "training.learning_rate must be positive, got {}",
                self.training.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.training.validation_split) {
            return Err(Error::ConfigInvalid(format!(
                "training.validation_split must be in [0, 1), got {}",
                self.training.validation_split
            )));
        }
        if !(self.detection.percentile > 0.0 && self.detection.percentile <= 1.0) {
            return Err(Error::ConfigInvalid(format!(
                "detection.percentile must be in (0, 1], got {}",
                self.detection.percentile
            )));
        }
        if !(0.0..=1.0).contains(&self.detection.run_ratio) {
            return Err(Error::ConfigInvalid(format!(
                "detection.run_ratio must be in [0, 1], got {}",
                self.detection.run_ratio
            )));
        }
        Ok(())
    }

    pub fn repo_root(&self) -> &Path {
        &self.build.dir
    }

    pub fn main_branch(&self) -> &str {
        &self.git.main
    }
}
