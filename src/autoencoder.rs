//! Dense denoising autoencoder for HPC trace rows
//!
//! # Architecture
//!
//! ```text
//! input (n events) → hidden[0] → … → encoding → … → hidden[0] → output (n events)
//! ```
//!
//! The decoder mirrors the encoder. Hidden and bottleneck layers use the
//! configured activation; the output layer is a sigmoid because inputs are
//! min-max scaled into [0, 1].
//!
//! # Algorithm
//!
//! Training: mini-batch gradient descent on mean squared error, with
//! gaussian noise added to the inputs (targets stay clean), rows shuffled
//! every epoch and a held-out validation split.
//! Inference: a high reconstruction error marks a row as unlike the
//! training data.
//!
//! All randomness comes from one `StdRng` seeded from the configuration, so
//! identical inputs and seed give identical weights.
//!
//! # References
//!
//! Goodfellow, I., Bengio, Y., & Courville, A. (2016).
//! Deep Learning. MIT Press. Chapter 14: Autoencoders.
//! Vincent, P., et al. (2008). Extracting and composing robust features
//! with denoising autoencoders. ICML.
//! Alam, M., et al. (2019). A zero-positive learning approach for diagnosing
//! software performance regressions. NeurIPS.

use crate::config::{RepoConfig, TrainingConfig};
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hidden-layer nonlinearity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Tanh,
    Sigmoid,
    Relu,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Relu => x.max(0.0),
        }
    }

    /// Derivative expressed through the activation's output `y`
    fn derivative(self, y: f64) -> f64 {
        match self {
            Activation::Tanh => 1.0 - y * y,
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Relu => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Relu => "relu",
        };
        f.write_str(name)
    }
}

/// Fully connected layer; `weights[i][j]` connects input `i` to output `j`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    activation: Activation,
}

impl Layer {
    /// Xavier-initialized layer
    fn new(inputs: usize, outputs: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let scale = (2.0 / (inputs as f64 + outputs as f64)).sqrt();
        let weights = (0..inputs)
            .map(|_| (0..outputs).map(|_| rng.gen_range(-scale..scale)).collect())
            .collect();
        Self {
            weights,
            bias: vec![0.0; outputs],
            activation,
        }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut out = self.bias.clone();
        for (o, value) in out.iter_mut().enumerate() {
            for (i, &x) in input.iter().enumerate() {
                *value += self.weights[i][o] * x;
            }
        }
        out.into_iter().map(|z| self.activation.apply(z)).collect()
    }
}

/// Layer widths and hyperparameters of an [`Autoencoder`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    pub input_dim: usize,
    /// Encoder hidden widths, outermost first
    pub hidden: Vec<usize>,
    pub encoding: usize,
    pub activation: Activation,
    pub training: TrainingConfig,
}

impl AutoencoderConfig {
    pub fn from_repo(config: &RepoConfig, input_dim: usize) -> Self {
        Self {
            input_dim,
            hidden: config.model.hidden.clone(),
            encoding: config.model.encoding,
            activation: config.model.activation,
            training: config.training.clone(),
        }
    }

    /// Widths of every layer boundary, input to output
    pub fn shape(&self) -> Vec<usize> {
        let mut dims = vec![self.input_dim];
        dims.extend(&self.hidden);
        dims.push(self.encoding);
        dims.extend(self.hidden.iter().rev());
        dims.push(self.input_dim);
        dims
    }
}

/// Per-epoch losses recorded while fitting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Mean training loss (on noisy inputs) per epoch
    pub loss: Vec<f64>,
    /// Mean clean reconstruction error on the validation rows per epoch
    pub val_loss: Vec<f64>,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }
}

/// Interface the pipeline uses for any reconstruction-based model
pub trait ReconstructionModel {
    /// Train on scaled rows
    fn fit(&mut self, rows: &[Vec<f64>]) -> Result<TrainingHistory>;

    /// Reconstruct each row
    fn reconstruct(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>>;

    fn save(&self, path: &Path) -> Result<()>;

    fn load(path: &Path) -> Result<Self>
    where
        Self: Sized;

    /// Mean squared reconstruction error per row
    fn reconstruction_errors(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        self.reconstruct(rows)
            .iter()
            .zip(rows)
            .map(|(out, row)| mse(row, out))
            .collect()
    }
}

/// Mean squared error between two equally long rows
pub fn mse(target: &[f64], output: &[f64]) -> f64 {
    if target.is_empty() {
        return 0.0;
    }
    let sum: f64 = target
        .iter()
        .zip(output)
        .map(|(&t, &o)| (t - o) * (t - o))
        .sum();
    sum / target.len() as f64
}

/// Standard normal sample via Box-Muller
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Autoencoder {
    config: AutoencoderConfig,
    layers: Vec<Layer>,
}

impl Autoencoder {
    /// Freshly initialized network
    pub fn new(config: AutoencoderConfig) -> Result<Self> {
        if config.input_dim == 0 {
            return Err(Error::NoTrainingData("input has zero columns".to_string()));
        }
        let mut rng = StdRng::seed_from_u64(config.training.seed);
        let shape = config.shape();
        let last = shape.len() - 2;
        let layers = shape
            .windows(2)
            .enumerate()
            .map(|(idx, pair)| {
                let activation = if idx == last {
                    Activation::Sigmoid
                } else {
                    config.activation
                };
                Layer::new(pair[0], pair[1], activation, &mut rng)
            })
            .collect();
        Ok(Self { config, layers })
    }

    pub fn config(&self) -> &AutoencoderConfig {
        &self.config
    }

    pub fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    /// Outputs of every layer, the input first
    fn activations(&self, input: &[f64]) -> Vec<Vec<f64>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(input.to_vec());
        for layer in &self.layers {
            let next = layer.forward(&acts[acts.len() - 1]);
            acts.push(next);
        }
        acts
    }

    pub fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.layers
            .iter()
            .fold(input.to_vec(), |acc, layer| layer.forward(&acc))
    }

    /// Bottleneck representation of one row
    pub fn encode(&self, input: &[f64]) -> Vec<f64> {
        let depth = self.config.hidden.len() + 1;
        self.layers[..depth]
            .iter()
            .fold(input.to_vec(), |acc, layer| layer.forward(&acc))
    }

    fn zero_gradients(&self) -> Vec<(Vec<Vec<f64>>, Vec<f64>)> {
        self.layers
            .iter()
            .map(|l| {
                (
                    vec![vec![0.0; l.bias.len()]; l.weights.len()],
                    vec![0.0; l.bias.len()],
                )
            })
            .collect()
    }

    /// Accumulate gradients of one sample into `grads`, returning its loss
    fn backprop(&self, input: &[f64], target: &[f64], grads: &mut [(Vec<Vec<f64>>, Vec<f64>)]) -> f64 {
        let acts = self.activations(input);
        let output = &acts[acts.len() - 1];
        let n = target.len() as f64;
        let loss = mse(target, output);

        let mut delta: Vec<f64> = output
            .iter()
            .zip(target)
            .map(|(&y, &t)| 2.0 * (y - t) / n)
            .collect();

        for l in (0..self.layers.len()).rev() {
            let layer = &self.layers[l];
            let out = &acts[l + 1];
            for (d, &y) in delta.iter_mut().zip(out) {
                *d *= layer.activation.derivative(y);
            }
            let prev = &acts[l];
            let (gw, gb) = &mut grads[l];
            for (i, &x) in prev.iter().enumerate() {
                for (j, &d) in delta.iter().enumerate() {
                    gw[i][j] += x * d;
                }
            }
            for (j, &d) in delta.iter().enumerate() {
                gb[j] += d;
            }
            if l > 0 {
                delta = (0..prev.len())
                    .map(|i| {
                        layer.weights[i]
                            .iter()
                            .zip(&delta)
                            .map(|(&w, &d)| w * d)
                            .sum()
                    })
                    .collect();
            }
        }
        loss
    }

    fn apply(&mut self, grads: &[(Vec<Vec<f64>>, Vec<f64>)], scale: f64) {
        for (layer, (gw, gb)) in self.layers.iter_mut().zip(grads) {
            for (row, grow) in layer.weights.iter_mut().zip(gw) {
                for (w, g) in row.iter_mut().zip(grow) {
                    *w -= scale * g;
                }
            }
            for (b, g) in layer.bias.iter_mut().zip(gb) {
                *b -= scale * g;
            }
        }
    }
}

impl ReconstructionModel for Autoencoder {
    fn fit(&mut self, rows: &[Vec<f64>]) -> Result<TrainingHistory> {
        if rows.is_empty() {
            return Err(Error::NoTrainingData("no rows to train on".to_string()));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != self.input_dim()) {
            return Err(Error::Model(format!(
                "model expects {} columns, got a row with {}",
                self.input_dim(),
                bad.len()
            )));
        }

        let training = self.config.training.clone();
        // Offset keeps the shuffling stream apart from weight initialization
        let mut rng = StdRng::seed_from_u64(training.seed.wrapping_add(1));

        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.shuffle(&mut rng);
        let mut val_count = (rows.len() as f64 * training.validation_split).floor() as usize;
        if val_count >= rows.len() {
            val_count = 0;
        }
        let (validation, train) = order.split_at(val_count);
        let validation: Vec<Vec<f64>> = validation.iter().map(|&i| rows[i].clone()).collect();
        let mut train: Vec<usize> = train.to_vec();

        let mut history = TrainingHistory::default();
        for epoch in 0..training.epochs {
            train.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in train.chunks(training.batch_size.max(1)) {
                let mut grads = self.zero_gradients();
                for &idx in batch {
                    let target = &rows[idx];
                    let noisy: Vec<f64> = target
                        .iter()
                        .map(|&x| x + training.noise * gaussian(&mut rng))
                        .collect();
                    epoch_loss += self.backprop(&noisy, target, &mut grads);
                }
                self.apply(&grads, training.learning_rate / batch.len() as f64);
            }

            let loss = epoch_loss / train.len() as f64;
            if !loss.is_finite() {
                return Err(Error::NumericInstability(format!(
                    "training loss became {} in epoch {}",
                    loss,
                    epoch + 1
                )));
            }
            let val_loss = if validation.is_empty() {
                loss
            } else {
                let errors = self.reconstruction_errors(&validation);
                errors.iter().sum::<f64>() / errors.len() as f64
            };
            tracing::debug!(epoch = epoch + 1, loss, val_loss, "epoch finished");

            let previous = history.loss.last().copied();
            history.loss.push(loss);
            history.val_loss.push(val_loss);

            if let Some(prev) = previous {
                let improvement = if prev > 0.0 { (prev - loss) / prev } else { 0.0 };
                if training.min_delta > 0.0 && improvement < training.min_delta {
                    tracing::info!(epoch = epoch + 1, improvement, "loss plateaued, stopping early");
                    history.stopped_early = true;
                    break;
                }
            }
        }
        Ok(history)
    }

    fn reconstruct(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|row| self.forward(row)).collect()
    }

    fn save(&self, path: &Path) -> Result<()> {
        crate::model_persistence::save_autoencoder(self, path, None)
    }

    fn load(path: &Path) -> Result<Self> {
        crate::model_persistence::load_autoencoder(path).map(|stored| stored.model)
    }
}
