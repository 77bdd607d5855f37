//! The AutoPerf state machine
//!
//! A run is a sequence of [`PipelineStep`]s. Each step performs one action
//! and names its successor; [`Pipeline::run`] drives the sequence and turns
//! any failure into a jump to [`PipelineStep::Finished`], which restores the
//! repository before the failure is propagated.
//!
//! `detect N` without a trained model (or with `--retrain`):
//!
//! ```text
//! Diff → Stash → Annotate(base) → Build → Measure(train/) → Train → Pop
//!      → Annotate(head) → Build → Measure(detect/) → Detect → Report → Finished
//! ```
//!
//! `detect N` with a trained model:
//!
//! ```text
//! Diff → Annotate(head) → Build → Measure(detect/) → Detect → Report → Finished
//! ```
//!
//! `baseline N`:
//!
//! ```text
//! Build → Measure(train/) → Train → Finished
//! ```

use crate::annotation::{annotate, AnnotateMode, AnnotateOptions, SourceParser};
use crate::cancel::CancelToken;
use crate::config::RepoConfig;
use crate::detect::{self, DetectionReport};
use crate::error::{Error, Result};
use crate::hunkmap::HunkMap;
use crate::measure::Measurement;
use crate::train::{self, TrainedArtifacts, TrainingOutcome};
use crate::vcs::{persist_hunkmaps, VersionControl};
use crate::workdir::WorkDir;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Diff,
    Stash,
    Annotate,
    Build,
    Measure,
    Train,
    Pop,
    Detect,
    Report,
    Finished,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::Diff => "DIFF",
            PipelineStep::Stash => "STASH",
            PipelineStep::Annotate => "ANNOTATE",
            PipelineStep::Build => "BUILD",
            PipelineStep::Measure => "MEASURE",
            PipelineStep::Train => "TRAIN",
            PipelineStep::Pop => "POP",
            PipelineStep::Detect => "DETECT",
            PipelineStep::Report => "REPORT",
            PipelineStep::Finished => "FINISHED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Measure the current checkout into `train/` and train on it
    Train,
    /// Compare the current branch against the main branch
    Detect,
}

/// Which revision the measuring steps currently work on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Baseline,
    Candidate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub mode: Mode,
    /// Measurement runs per MEASURE step
    pub runs: usize,
    /// Train a fresh model even when one exists (detect mode)
    pub retrain: bool,
    /// Worker count for annotation
    pub workers: usize,
}

impl PipelineOptions {
    pub fn detect(runs: usize) -> Self {
        Self {
            mode: Mode::Detect,
            runs,
            retrain: false,
            workers: crate::annotation::engine::default_workers(),
        }
    }

    pub fn baseline(runs: usize) -> Self {
        Self {
            mode: Mode::Train,
            ..Self::detect(runs)
        }
    }

    pub fn retrain(mut self, retrain: bool) -> Self {
        self.retrain = retrain;
        self
    }
}

pub struct Pipeline<'a> {
    config: &'a RepoConfig,
    work: &'a WorkDir,
    vcs: &'a mut dyn VersionControl,
    parser: &'a dyn SourceParser,
    cancel: &'a CancelToken,
    options: PipelineOptions,

    leg: Leg,
    maps: Option<(HunkMap, HunkMap)>,
    stash_outstanding: bool,
    executed: Vec<PipelineStep>,
    training: Option<TrainingOutcome>,
    report: Option<DetectionReport>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a RepoConfig,
        work: &'a WorkDir,
        vcs: &'a mut dyn VersionControl,
        parser: &'a dyn SourceParser,
        cancel: &'a CancelToken,
        options: PipelineOptions,
    ) -> Self {
        Self {
            config,
            work,
            vcs,
            parser,
            cancel,
            leg: Leg::Candidate,
            maps: None,
            stash_outstanding: false,
            executed: Vec::new(),
            training: None,
            report: None,
            options,
        }
    }

    /// States entered so far, in order
    pub fn executed(&self) -> &[PipelineStep] {
        &self.executed
    }

    pub fn training(&self) -> Option<&TrainingOutcome> {
        self.training.as_ref()
    }

    pub fn report(&self) -> Option<&DetectionReport> {
        self.report.as_ref()
    }

    /// Drive the machine to FINISHED
    pub fn run(&mut self) -> Result<()> {
        self.work.ensure()?;
        let mut step = match self.options.mode {
            Mode::Train => {
                self.leg = Leg::Baseline;
                PipelineStep::Build
            }
            Mode::Detect => PipelineStep::Diff,
        };

        let mut failure = None;
        while step != PipelineStep::Finished {
            step = match self.advance(step) {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(state = %step, kind = e.kind(), "{}", e);
                    failure = Some(e);
                    PipelineStep::Finished
                }
            };
        }
        self.finish(failure)
    }

    fn advance(&mut self, step: PipelineStep) -> Result<PipelineStep> {
        self.cancel.check()?;
        tracing::info!(state = %step, "entering state");
        self.executed.push(step);
        match step {
            PipelineStep::Diff => self.diff(),
            PipelineStep::Stash => self.stash(),
            PipelineStep::Annotate => self.annotate(),
            PipelineStep::Build => self.build(),
            PipelineStep::Measure => self.measure(),
            PipelineStep::Train => self.train(),
            PipelineStep::Pop => self.pop(),
            PipelineStep::Detect => self.detect(),
            PipelineStep::Report => self.write_report(),
            PipelineStep::Finished => Ok(PipelineStep::Finished),
        }
    }

    fn diff(&mut self) -> Result<PipelineStep> {
        let base = self.config.git.main.clone();
        let head = self.vcs.current_branch()?;
        let maps = self.vcs.hunkmaps(&base, &head)?;
        persist_hunkmaps(self.work, &base, &head, &maps)?;
        let base_empty = maps.0.is_empty();
        self.maps = Some(maps);

        let needs_training = self.options.retrain || !TrainedArtifacts::exists(self.work);
        if needs_training && !base_empty {
            self.leg = Leg::Baseline;
            return Ok(PipelineStep::Stash);
        }
        if needs_training {
            tracing::info!("no changed functions on {}, skipping the training leg", base);
        }
        self.leg = Leg::Candidate;
        Ok(PipelineStep::Annotate)
    }

    fn stash(&mut self) -> Result<PipelineStep> {
        // set first: a failed checkout can leave a stash entry behind
        self.stash_outstanding = true;
        self.vcs.stash_and_checkout(&self.config.git.main)?;
        Ok(PipelineStep::Annotate)
    }

    fn annotate(&mut self) -> Result<PipelineStep> {
        let only = match (&self.maps, self.leg) {
            (Some((base, _)), Leg::Baseline) => base.clone(),
            (Some((_, head)), Leg::Candidate) => head.clone(),
            (None, _) => HunkMap::new(),
        };
        let root = self.config.repo_root();
        let options = AnnotateOptions::new(vec![root.to_path_buf()], AnnotateMode::Inject)
            .recursive(true)
            .only(Some(only))
            .workers(self.options.workers);
        let summary = annotate(root, &options, self.parser)?;
        tracing::info!(
            files = summary.modified_files(),
            functions = summary.annotated_functions(),
            markers = summary.markers(),
            "injected probes"
        );
        Ok(PipelineStep::Build)
    }

    fn build(&mut self) -> Result<PipelineStep> {
        Measurement::new(self.config, self.work, self.cancel).build()?;
        Ok(PipelineStep::Measure)
    }

    fn measure(&mut self) -> Result<PipelineStep> {
        let out = match self.leg {
            Leg::Baseline => self.work.train_dir(),
            Leg::Candidate => self.work.detect_dir(),
        };
        Measurement::new(self.config, self.work, self.cancel).runs(&out, self.options.runs)?;
        Ok(match self.leg {
            Leg::Baseline => PipelineStep::Train,
            Leg::Candidate => PipelineStep::Detect,
        })
    }

    fn train(&mut self) -> Result<PipelineStep> {
        let outcome = train::train(self.config, self.work, &self.work.train_dir())?;
        self.training = Some(outcome);
        Ok(match self.options.mode {
            Mode::Train => PipelineStep::Finished,
            Mode::Detect => PipelineStep::Pop,
        })
    }

    fn pop(&mut self) -> Result<PipelineStep> {
        self.restore()?;
        self.leg = Leg::Candidate;
        Ok(PipelineStep::Annotate)
    }

    fn detect(&mut self) -> Result<PipelineStep> {
        let report = detect::detect(self.work, &self.work.train_dir(), &self.work.detect_dir())?;
        self.report = Some(report);
        Ok(PipelineStep::Report)
    }

    fn write_report(&mut self) -> Result<PipelineStep> {
        if let Some(report) = &self.report {
            detect::write_report(self.work, &report.to_report_string())?;
        }
        Ok(PipelineStep::Finished)
    }

    /// Return to the candidate branch and re-apply the stash
    fn restore(&mut self) -> Result<()> {
        self.stash_outstanding = false;
        self.vcs.restore_previous()?;
        self.vcs.pop_stash()
    }

    /// FINISHED: undo branch changes, then erase probes; never skipped
    fn finish(&mut self, failure: Option<Error>) -> Result<()> {
        let mut failure = failure;

        if self.stash_outstanding {
            self.executed.push(PipelineStep::Pop);
            if let Err(e) = self.restore() {
                tracing::error!(kind = e.kind(), "could not restore the repository: {}", e);
                failure.get_or_insert(e);
            }
        }

        self.executed.push(PipelineStep::Finished);
        if let Some((_, head)) = &self.maps {
            let root = self.config.repo_root();
            let options = AnnotateOptions::new(vec![root.to_path_buf()], AnnotateMode::Erase)
                .recursive(true)
                .only(Some(head.clone()))
                .workers(self.options.workers);
            match annotate(root, &options, self.parser) {
                Ok(summary) => {
                    tracing::info!(markers = summary.markers(), "erased probes");
                }
                Err(e) => tracing::error!(kind = e.kind(), "probe erase failed: {}", e),
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
