//! Per-column min-max scaling into [0, 1]
//!
//! Fitted once on the nominal training set and persisted as JSON so that
//! detection scales candidate data with exactly the same parameters.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl MinMaxScaler {
    /// Learn column ranges from `rows`
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(Error::NoTrainingData("cannot fit scaler on zero rows".to_string()));
        };
        let num_features = first.len();
        let mut min = vec![f64::MAX; num_features];
        let mut max = vec![f64::MIN; num_features];

        for sample in rows {
            for (i, &val) in sample.iter().enumerate() {
                min[i] = min[i].min(val);
                max[i] = max[i].max(val);
            }
        }
        Ok(Self { min, max })
    }

    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    /// Scale one value of column `i`; constant columns map to 0.5
    fn scale(&self, i: usize, val: f64) -> f64 {
        let range = self.max[i] - self.min[i];
        if range < f64::EPSILON {
            0.5
        } else {
            (val - self.min[i]) / range
        }
    }

    /// Scale `rows` with the fitted parameters
    ///
    /// Values outside the fitted range map outside [0, 1]; they are not clipped.
    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if let Some(bad) = rows.iter().find(|r| r.len() != self.n_features()) {
            return Err(Error::Model(format!(
                "scaler fitted on {} columns, got a row with {}",
                self.n_features(),
                bad.len()
            )));
        }
        Ok(rows
            .iter()
            .map(|sample| {
                sample
                    .iter()
                    .enumerate()
                    .map(|(i, &val)| self.scale(i, val))
                    .collect()
            })
            .collect())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Model(format!("cannot serialize scaler: {}", e)))?;
        fs::write(path, json).map_err(|e| Error::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Model(format!("corrupt scaler {}: {}", path.display(), e)))
    }
}
