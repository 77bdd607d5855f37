//! Training on nominal measurements
//!
//! Loads every run under a training directory, fits the scaler, trains the
//! autoencoder and derives θ from the training set's reconstruction errors.
//! The three artefacts land in `.work/` (`scaler`, `model/`, `threshold.npy`)
//! and are read back together by [`TrainedArtifacts::load`].

use crate::autoencoder::{Autoencoder, AutoencoderConfig, ReconstructionModel, TrainingHistory};
use crate::config::RepoConfig;
use crate::counters::load_counters;
use crate::dataset::{Dataset, FeatureMatrix};
use crate::error::{Error, Result};
use crate::model_persistence::{self, ModelMetadata, StoredModel};
use crate::scaler::MinMaxScaler;
use crate::threshold::{compute_threshold, read_threshold, write_threshold, ErrorSummary};
use crate::workdir::WorkDir;
use std::path::Path;

/// What a training invocation produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub runs: usize,
    pub rows: usize,
    pub events: usize,
    pub threshold: f64,
    pub errors: ErrorSummary,
    pub history: TrainingHistory,
}

/// Event count fixed by `COUNTERS`, when the descriptor exists
pub fn expected_events(work: &WorkDir) -> Result<Option<usize>> {
    let path = work.counters();
    if !path.is_file() {
        return Ok(None);
    }
    Ok(Some(load_counters(&path)?.len()))
}

/// Train on every run below `train_dir` and persist scaler, model and θ
pub fn train(config: &RepoConfig, work: &WorkDir, train_dir: &Path) -> Result<TrainingOutcome> {
    let dataset = Dataset::load(train_dir, expected_events(work)?)?;
    if dataset.is_empty() {
        return Err(Error::NoTrainingData(format!(
            "no usable runs in {}",
            train_dir.display()
        )));
    }
    let matrix = dataset.concat()?;
    tracing::info!(
        runs = dataset.runs.len(),
        rows = matrix.n_rows(),
        events = matrix.n_cols(),
        "training autoencoder"
    );

    let scaler = MinMaxScaler::fit(matrix.rows())?;
    let scaled = scaler.transform(matrix.rows())?;

    let mut model = Autoencoder::new(AutoencoderConfig::from_repo(config, matrix.n_cols()))?;
    let history = model.fit(&scaled)?;

    let errors = model.reconstruction_errors(&scaled);
    let threshold = compute_threshold(&errors, config.detection.percentile)?;
    let summary = ErrorSummary::of(&errors);
    tracing::info!(
        threshold,
        percentile = config.detection.percentile,
        mean_error = summary.mean,
        max_error = summary.max,
        "threshold computed"
    );

    work.ensure()?;
    scaler.save(&work.scaler())?;
    let stored = StoredModel {
        metadata: ModelMetadata::describe(&model, matrix.n_rows())
            .with_hyperparameter("percentile", config.detection.percentile.to_string())
            .with_description(format!("trained on {}", train_dir.display())),
        model,
    };
    model_persistence::save_model(
        &stored,
        model_persistence::model_path(&work.model_dir()),
        model_persistence::PersistenceOptions::new(),
    )?;
    write_threshold(&work.threshold(), threshold)?;

    Ok(TrainingOutcome {
        runs: dataset.runs.len(),
        rows: matrix.n_rows(),
        events: matrix.n_cols(),
        threshold,
        errors: summary,
        history,
    })
}

/// Scaler, model and θ as persisted by [`train`]
#[derive(Debug, Clone)]
pub struct TrainedArtifacts {
    pub scaler: MinMaxScaler,
    pub model: Autoencoder,
    pub metadata: ModelMetadata,
    pub threshold: f64,
}

impl TrainedArtifacts {
    pub fn exists(work: &WorkDir) -> bool {
        model_persistence::model_exists(&work.model_dir())
    }

    pub fn load(work: &WorkDir) -> Result<Self> {
        let stored = model_persistence::load_model(model_persistence::model_path(&work.model_dir()))?;
        let scaler = MinMaxScaler::load(&work.scaler())?;
        let threshold = read_threshold(&work.threshold())?;
        if scaler.n_features() != stored.model.input_dim() {
            return Err(Error::Model(format!(
                "scaler has {} columns but the model expects {}",
                scaler.n_features(),
                stored.model.input_dim()
            )));
        }
        tracing::debug!("{}", model_persistence::model_status_line(&stored.metadata));
        Ok(Self {
            scaler,
            model: stored.model,
            metadata: stored.metadata,
            threshold,
        })
    }

    /// Scale `matrix` with the fitted scaler and score every row
    pub fn errors(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        if matrix.is_empty() {
            return Ok(Vec::new());
        }
        let scaled = self.scaler.transform(matrix.rows())?;
        Ok(self.model.reconstruction_errors(&scaled))
    }
}
