//! Error kinds surfaced by the AutoPerf pipeline
//!
//! Every failure the state machine can observe is one variant of [`Error`].
//! Only [`Error::ParseFailed`] and [`Error::ProbeOutputMissing`] are handled
//! locally; everything else bubbles to the pipeline, which then runs its
//! cleanup state before propagating.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by AutoPerf operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("repository has changes that cannot be stashed: {0}")]
    RepoDirty(String),

    #[error("build command failed (exit status {status}), output in {}", log.display())]
    BuildFailed { status: i32, log: PathBuf },

    #[error("clean command failed (exit status {status}), output in {}", log.display())]
    CleanFailed { status: i32, log: PathBuf },

    #[error("workload command failed (exit status {status}), output in {}", log.display())]
    WorkloadFailed { status: i32, log: PathBuf },

    #[error("could not parse {}: {reason}", path.display())]
    ParseFailed { path: PathBuf, reason: String },

    #[error("no training data: {0}")]
    NoTrainingData(String),

    #[error("numeric instability: {0}")]
    NumericInstability(String),

    #[error("probe output missing: {}", .0.display())]
    ProbeOutputMissing(PathBuf),

    #[error("cancelled by user interrupt")]
    Cancelled,

    #[error("version control: {0}")]
    Vcs(String),

    #[error("model: {0}")]
    Model(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for AutoPerf operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable name of the error kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ConfigInvalid(_) => "ConfigInvalid",
            Error::RepoDirty(_) => "RepoDirty",
            Error::BuildFailed { .. } => "BuildFailed",
            Error::CleanFailed { .. } => "CleanFailed",
            Error::WorkloadFailed { .. } => "WorkloadFailed",
            Error::ParseFailed { .. } => "ParseFailed",
            Error::NoTrainingData(_) => "NoTrainingData",
            Error::NumericInstability(_) => "NumericInstability",
            Error::ProbeOutputMissing(_) => "ProbeOutputMissing",
            Error::Cancelled => "Cancelled",
            Error::Vcs(_) => "Vcs",
            Error::Model(_) => "Model",
            Error::Io { .. } => "Io",
        }
    }

    /// Process exit code for this error kind
    ///
    /// Codes are distinct per kind so wrapper scripts can branch on them.
    /// Cancellation uses the shell convention for SIGINT.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ConfigInvalid(_) => 2,
            Error::RepoDirty(_) => 3,
            Error::BuildFailed { .. } => 4,
            Error::CleanFailed { .. } => 5,
            Error::WorkloadFailed { .. } => 6,
            Error::ParseFailed { .. } => 7,
            Error::NoTrainingData(_) => 8,
            Error::NumericInstability(_) => 9,
            Error::ProbeOutputMissing(_) => 10,
            Error::Vcs(_) => 11,
            Error::Model(_) => 12,
            Error::Io { .. } => 13,
            Error::Cancelled => 130,
        }
    }
}
