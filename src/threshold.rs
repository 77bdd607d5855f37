//! Reconstruction-error threshold and its `threshold.npy` file
//!
//! θ is the configured quantile (R-7) of the per-row reconstruction errors on
//! the training set. It is stored as a NumPy v1.0 array of one little-endian
//! f64 so downstream tooling can read it with `numpy.load`.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use trueno::Vector;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_HEADER: &str = "{'descr': '<f8', 'fortran_order': False, 'shape': (1,), }";

/// `q`-quantile of `errors`
///
/// Fails with `NoTrainingData` on an empty slice and `NumericInstability` when
/// any error is not finite.
pub fn compute_threshold(errors: &[f64], q: f64) -> Result<f64> {
    if errors.is_empty() {
        return Err(Error::NoTrainingData(
            "no reconstruction errors to threshold".to_string(),
        ));
    }
    if let Some(bad) = errors.iter().find(|e| !e.is_finite()) {
        return Err(Error::NumericInstability(format!(
            "reconstruction error {} on the training set",
            bad
        )));
    }

    if !(q > 0.0 && q <= 1.0) {
        return Err(Error::ConfigInvalid(format!("percentile {} outside (0, 1]", q)));
    }

    // kept in f64 so an error equal to θ never rounds above it
    let mut sorted = errors.to_vec();
    sorted.sort_by(f64::total_cmp);
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    Ok(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// Count, mean and maximum of a set of reconstruction errors
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorSummary {
    pub count: usize,
    pub mean: f64,
    pub max: f64,
}

impl ErrorSummary {
    pub fn of(errors: &[f64]) -> Self {
        if errors.is_empty() {
            return Self::default();
        }
        let values: Vec<f32> = errors.iter().map(|&e| e as f32).collect();
        let vector = Vector::from_slice(&values);
        Self {
            count: errors.len(),
            mean: f64::from(vector.mean().unwrap_or(0.0)),
            max: f64::from(vector.max().unwrap_or(0.0)),
        }
    }
}

/// Encode a scalar as a `(1,)`-shaped `<f8` `.npy` file
pub fn encode_npy(value: f64) -> Vec<u8> {
    // magic + version + u16 length, then header padded so data starts on a 64-byte boundary
    let prefix = NPY_MAGIC.len() + 2 + 2;
    let unpadded = prefix + NPY_HEADER.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    let header_len = NPY_HEADER.len() + padding + 1;

    let mut out = Vec::with_capacity(prefix + header_len + 8);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(NPY_HEADER.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    out.extend_from_slice(&value.to_le_bytes());
    out
}

/// Decode the scalar written by [`encode_npy`]
pub fn decode_npy(bytes: &[u8]) -> Result<f64> {
    let corrupt = |reason: &str| Error::Model(format!("invalid threshold file: {}", reason));

    if !bytes.starts_with(NPY_MAGIC) {
        return Err(corrupt("missing NUMPY magic"));
    }
    if bytes.len() < 10 || bytes[6] != 1 {
        return Err(corrupt("unsupported format version"));
    }
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let data_start = 10 + header_len;
    let header = bytes
        .get(10..data_start)
        .map(String::from_utf8_lossy)
        .ok_or_else(|| corrupt("truncated header"))?;
    if !header.contains("'<f8'") {
        return Err(corrupt("dtype is not <f8"));
    }
    let data: [u8; 8] = bytes
        .get(data_start..data_start + 8)
        .and_then(|d| d.try_into().ok())
        .ok_or_else(|| corrupt("missing value"))?;
    Ok(f64::from_le_bytes(data))
}

pub fn write_threshold(path: &Path, value: f64) -> Result<()> {
    fs::write(path, encode_npy(value)).map_err(|e| Error::io(path, e))
}

pub fn read_threshold(path: &Path) -> Result<f64> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    decode_npy(&bytes)
}
