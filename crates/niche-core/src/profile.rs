//! Discretised niche occupancy profiles and probability correction.
//!
//! Density estimators emit bin probabilities whose total drifts away from 1
//! by rounding. The drift is spread evenly over all bins; a bin below zero
//! is then clamped and its deficit charged to the current maximum bin. The
//! clamp runs as a single pass, so pathological inputs can keep a residual
//! negative bin no larger in magnitude than the total clamped deficit.

use crate::error::{Error, Result};

/// Tolerance on |sum − 1| below which no uniform shift is applied.
pub const SUM_TOLERANCE: f64 = 1e-10;

/// One bin of a PNO file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinRecord {
    /// Bin midpoint on the environmental variable's axis.
    pub bin_value: f64,
    pub probability: f64,
}

/// Occupancy distribution of one species over one niche variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub bins: Vec<BinRecord>,
}

impl Profile {
    pub fn new(bins: Vec<BinRecord>) -> Self {
        Self { bins }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.bin_value).collect()
    }

    pub fn probabilities(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.probability).collect()
    }

    pub fn probability_sum(&self) -> f64 {
        self.bins.iter().map(|b| b.probability).sum()
    }

    /// Copy of this profile with probabilities corrected to sum to 1.
    pub fn corrected(&self) -> Result<Profile> {
        let mut probs = self.probabilities();
        correct_probabilities(&mut probs)?;
        Ok(Profile {
            bins: self
                .bins
                .iter()
                .zip(probs)
                .map(|(b, probability)| BinRecord { bin_value: b.bin_value, probability })
                .collect(),
        })
    }
}

/// Correct `probs` in place so they sum to 1 and none is negative.
pub fn correct_probabilities(probs: &mut [f64]) -> Result<()> {
    if probs.is_empty() {
        return Err(Error::degenerate("cannot correct an empty probability list"));
    }
    if probs.iter().any(|p| !p.is_finite()) {
        return Err(Error::degenerate("probability list contains a non-finite value"));
    }

    let sum: f64 = probs.iter().sum();
    if (sum - 1.0).abs() > SUM_TOLERANCE {
        let correction = (sum - 1.0) / probs.len() as f64;
        for p in probs.iter_mut() {
            *p -= correction;
        }
    }

    for i in 0..probs.len() {
        let v = probs[i];
        if v < 0.0 {
            probs[i] = 0.0;
            let max_idx = argmax(probs);
            probs[max_idx] += v;
        }
    }
    Ok(())
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
