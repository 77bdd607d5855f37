//! Autoencoder persistence in aprender's `.apr` container
//!
//! The trained network is written to `.work/model/autoencoder.apr` together
//! with a [`ModelMetadata`] record, so that `detect` can reuse the model of a
//! previous `train` or `baseline` without retraining.

use crate::autoencoder::Autoencoder;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the model inside `.work/model/`
pub const MODEL_FILE: &str = "autoencoder.apr";

/// Location of the persisted model for a model directory
pub fn model_path(model_dir: &Path) -> PathBuf {
    model_dir.join(MODEL_FILE)
}

/// True when a trained model is present
pub fn model_exists(model_dir: &Path) -> bool {
    model_path(model_dir).is_file()
}

/// Metadata for a persisted model
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelMetadata {
    /// AutoPerf version that created this model
    pub autoperf_version: String,
    /// Unix timestamp (seconds) of training
    pub trained_at: String,
    /// Number of rows used for training
    pub training_samples: usize,
    /// Model-specific hyperparameters
    pub hyperparameters: HashMap<String, String>,
    pub description: Option<String>,
}

impl ModelMetadata {
    /// Create new metadata with current timestamp
    pub fn new(training_samples: usize) -> Self {
        Self {
            autoperf_version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: crate::process::unix_timestamp().to_string(),
            training_samples,
            hyperparameters: HashMap::new(),
            description: None,
        }
    }

    pub fn with_hyperparameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hyperparameters.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Metadata recording the shape and training setup of `model`
    pub fn describe(model: &Autoencoder, training_samples: usize) -> Self {
        let config = model.config();
        let shape: Vec<String> = config.shape().iter().map(usize::to_string).collect();
        Self::new(training_samples)
            .with_hyperparameter("shape", shape.join("-"))
            .with_hyperparameter("activation", config.activation.to_string())
            .with_hyperparameter("epochs", config.training.epochs.to_string())
            .with_hyperparameter("batch_size", config.training.batch_size.to_string())
            .with_hyperparameter("learning_rate", config.training.learning_rate.to_string())
            .with_hyperparameter("noise", config.training.noise.to_string())
            .with_hyperparameter("seed", config.training.seed.to_string())
    }
}

/// A model together with its metadata, as stored on disk
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StoredModel {
    pub model: Autoencoder,
    pub metadata: ModelMetadata,
}

/// Options for saving models
#[derive(Debug, Clone)]
pub struct PersistenceOptions {
    /// Enable compression (default: true)
    pub compress: bool,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            compress: true,
            name: Some("autoperf-autoencoder".to_string()),
            description: None,
        }
    }
}

impl PersistenceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Save a model and its metadata to `.apr` format
pub fn save_model(stored: &StoredModel, path: impl AsRef<Path>, options: PersistenceOptions) -> Result<()> {
    use aprender::format::{save, Compression, ModelType, SaveOptions};

    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let compression = if options.compress {
        Compression::ZstdDefault
    } else {
        Compression::None
    };
    let mut save_options = SaveOptions::new().with_compression(compression);
    if let Some(name) = options.name {
        save_options = save_options.with_name(name);
    }
    if let Some(desc) = options.description {
        save_options = save_options.with_description(desc);
    }

    save(stored, ModelType::Custom, path, save_options)
        .map_err(|e| Error::Model(format!("cannot save {}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), samples = stored.metadata.training_samples, "model saved");
    Ok(())
}

/// Load a model from `.apr` format
pub fn load_model(path: impl AsRef<Path>) -> Result<StoredModel> {
    use aprender::format::{load, ModelType};

    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::Model(format!("model file not found: {}", path.display())));
    }
    load::<StoredModel>(path, ModelType::Custom)
        .map_err(|e| Error::Model(format!("cannot load {}: {}", path.display(), e)))
}

/// Save `model` with default options; `metadata` defaults to an unlabelled record
pub fn save_autoencoder(model: &Autoencoder, path: &Path, metadata: Option<ModelMetadata>) -> Result<()> {
    let stored = StoredModel {
        model: model.clone(),
        metadata: metadata.unwrap_or_else(|| ModelMetadata::describe(model, 0)),
    };
    save_model(&stored, path, PersistenceOptions::new())
}

pub fn load_autoencoder(path: &Path) -> Result<StoredModel> {
    load_model(path)
}

/// Generate a status line for model information
pub fn model_status_line(metadata: &ModelMetadata) -> String {
    let shape = metadata
        .hyperparameters
        .get("shape")
        .map(String::as_str)
        .unwrap_or("?");
    format!(
        "model: autoperf v{}, shape {}, trained with {} samples",
        metadata.autoperf_version, shape, metadata.training_samples
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoencoder::{Activation, AutoencoderConfig};
    use crate::config::TrainingConfig;
    use tempfile::TempDir;

    fn small_model() -> Autoencoder {
        Autoencoder::new(AutoencoderConfig {
            input_dim: 3,
            hidden: vec![2],
            encoding: 1,
            activation: Activation::Tanh,
            training: TrainingConfig::default(),
        })
        .unwrap()
    }

    #[test]
    fn test_model_metadata_creation() {
        let metadata = ModelMetadata::new(1000);
        assert_eq!(metadata.autoperf_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(metadata.training_samples, 1000);
        assert!(metadata.hyperparameters.is_empty());
        assert!(metadata.description.is_none());
    }

    #[test]
    fn test_describe_records_shape() {
        let metadata = ModelMetadata::describe(&small_model(), 12).with_description("baseline");
        assert_eq!(metadata.hyperparameters.get("shape"), Some(&"3-2-1-2-3".to_string()));
        assert_eq!(metadata.hyperparameters.get("activation"), Some(&"tanh".to_string()));
        assert_eq!(metadata.description.as_deref(), Some("baseline"));
        assert!(model_status_line(&metadata).contains("3-2-1-2-3"));
    }

    #[test]
    fn test_persistence_options_builder() {
        let options = PersistenceOptions::new()
            .with_compression(false)
            .with_name("candidate")
            .with_description("nightly");
        assert!(!options.compress);
        assert_eq!(options.name.as_deref(), Some("candidate"));
        assert_eq!(options.description.as_deref(), Some("nightly"));
        assert!(PersistenceOptions::default().compress);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = model_path(&tmp.path().join("model"));
        let model = small_model();
        let stored = StoredModel {
            model: model.clone(),
            metadata: ModelMetadata::describe(&model, 40),
        };
        save_model(&stored, &path, PersistenceOptions::new()).unwrap();
        assert!(model_exists(&tmp.path().join("model")));

        let loaded = load_model(&path).unwrap();
        assert_eq!(loaded.metadata.training_samples, 40);
        let row = vec![0.1, 0.5, 0.9];
        assert_eq!(loaded.model.forward(&row), model.forward(&row));
    }

    #[test]
    fn test_uncompressed_save_loads_the_same_model() {
        let tmp = TempDir::new().unwrap();
        let model = small_model();
        let stored = StoredModel {
            model: model.clone(),
            metadata: ModelMetadata::describe(&model, 40),
        };
        let packed = tmp.path().join("packed.apr");
        let plain = tmp.path().join("plain.apr");
        save_model(&stored, &packed, PersistenceOptions::new()).unwrap();
        save_model(&stored, &plain, PersistenceOptions::new().with_compression(false)).unwrap();

        let row = vec![0.1, 0.5, 0.9];
        let from_plain = load_model(&plain).unwrap();
        let from_packed = load_model(&packed).unwrap();
        assert_eq!(from_plain.model.config(), model.config());
        assert_eq!(from_plain.model.forward(&row), from_packed.model.forward(&row));
        assert_eq!(from_plain.metadata.training_samples, 40);
    }

    #[test]
    fn test_load_missing_model() {
        let err = load_model("/nonexistent/autoencoder.apr").unwrap_err();
        assert!(matches!(err, Error::Model(msg) if msg.contains("not found")));
    }
}
