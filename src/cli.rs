//! CLI argument parsing for AutoPerf

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "autoperf")]
#[command(version)]
#[command(about = "Performance regression detection with hardware counters and autoencoders", long_about = None)]
pub struct Cli {
    /// Repository to operate on (default: search upwards from the current directory)
    #[arg(short = 'C', long = "repo", value_name = "DIR", global = true)]
    pub repo: Option<PathBuf>,

    /// Trace-level logging on stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create .work/ with a config template and an empty COUNTERS file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Remove everything under .work/ except config and COUNTERS
    Clean,

    /// Build, then perform one measurement run per index into OUT_DIR
    Measure {
        out_dir: PathBuf,
        #[arg(required = true, value_name = "RUN_INDEX")]
        runs: Vec<usize>,
    },

    /// Train the autoencoder on an existing training directory
    Train {
        /// Training directory (default: .work/train)
        train_dir: Option<PathBuf>,

        /// Override model.hidden (comma separated widths)
        #[arg(long, value_delimiter = ',', value_name = "WIDTHS")]
        hidden: Option<Vec<usize>>,

        /// Override model.encoding
        #[arg(long, value_name = "WIDTH")]
        encoding: Option<usize>,
    },

    /// Evaluate the trained model on labelled nominal and anomalous runs
    Evaluate {
        train: PathBuf,
        nominal: PathBuf,
        anomalous: PathBuf,
    },

    /// Full detection pipeline against the main branch
    Detect {
        #[arg(value_name = "RUN_COUNT")]
        runs: usize,

        /// Retrain on the main branch even when a model exists
        #[arg(long)]
        retrain: bool,
    },

    /// Measure the current checkout into .work/train and train on it
    Baseline {
        #[arg(value_name = "RUN_COUNT")]
        runs: usize,
    },

    /// Inject or erase probe markers by hand
    Annotate(AnnotateArgs),
}

#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Files or directories to annotate
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Insert probe markers (default)
    #[arg(long, conflicts_with = "erase")]
    pub inject: bool,

    /// Remove probe markers
    #[arg(long)]
    pub erase: bool,

    /// HunkMap JSON restricting files and functions
    #[arg(long, value_name = "JSON", conflicts_with = "apply")]
    pub only: Option<PathBuf>,

    /// Descend into directories
    #[arg(short, long)]
    pub recursive: bool,

    /// Worker threads (default: available cores)
    #[arg(short = 'j', long, value_name = "P")]
    pub parallel: Option<usize>,

    /// Only compute and persist HunkMaps against BRANCH; files are not touched
    #[arg(long, value_name = "BRANCH", conflicts_with_all = ["erase", "only", "apply"])]
    pub diff: Option<String>,

    /// Restrict to the current branch's persisted HunkMap
    #[arg(long)]
    pub apply: bool,

    /// Print per-file results
    #[arg(long)]
    pub detailed: bool,
}
