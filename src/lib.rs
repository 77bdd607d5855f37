//! AutoPerf - performance regression detection with hardware counters
//!
//! This library provides the pipeline that finds the functions changed between
//! two revisions, wraps them in probe markers, measures them under every HPC
//! event listed in `COUNTERS`, learns nominal behaviour with an autoencoder
//! and reports the functions whose reconstruction error exceeds the learned
//! threshold.

pub mod annotation;
pub mod autoencoder;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod counters;
pub mod dataset;
pub mod detect;
pub mod error;
pub mod hunkmap;
pub mod measure;
pub mod model_persistence;
pub mod pipeline;
pub mod process;
pub mod scaler;
pub mod threshold;
pub mod train;
pub mod vcs;
pub mod workdir;

pub use error::{Error, Result};
