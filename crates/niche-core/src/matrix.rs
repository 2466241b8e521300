//! Species × species distance matrices, normalisation and aggregation.
//!
//! Missing cells are stored as `NaN`. The diagonal is always missing: a
//! species' distance to itself carries no information and must not enter the
//! normalisation statistics.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::io;

/// Linear rescaling applied to a raw distance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// (x − mean) / (max − min)
    MeanRange,
    /// (x − min) / (max − min)
    MinMax,
    /// (x − mean) / std
    ZScore,
    /// Copy values unchanged.
    None,
}

/// Square distance matrix labelled by species, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    pub species: Vec<String>,
    pub data: Vec<f64>,
}

impl DistanceMatrix {
    /// Build from row-major cell values; the diagonal is forced to missing.
    pub fn from_rows(species: Vec<String>, data: Vec<f64>) -> Result<Self> {
        let n = species.len();
        if data.len() != n * n {
            return Err(Error::ShapeMismatch(format!(
                "{} cells for {} species",
                data.len(),
                n
            )));
        }
        let mut m = Self { species, data };
        for i in 0..n {
            m.set(i, i, f64::NAN);
        }
        Ok(m)
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.species.len()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n() + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        let n = self.n();
        self.data[row * n + col] = val;
    }

    pub fn is_missing(&self, row: usize, col: usize) -> bool {
        self.get(row, col).is_nan()
    }

    /// Present (non-missing) cells, excluding the diagonal.
    pub fn present_values(&self) -> Vec<f64> {
        let n = self.n();
        (0..n)
            .flat_map(|r| (0..n).filter(move |&c| c != r).map(move |c| (r, c)))
            .map(|(r, c)| self.get(r, c))
            .filter(|v| !v.is_nan())
            .collect()
    }

    /// Rescale every present cell using statistics over all present cells.
    ///
    /// When the present cells have no spread they all map to 0.
    pub fn normalized(&self, method: Normalization) -> DistanceMatrix {
        let values = self.present_values();
        if values.is_empty() {
            return self.clone();
        }

        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count).sqrt();

        let (offset, scale) = match method {
            Normalization::MeanRange => (mean, max - min),
            Normalization::MinMax => (min, max - min),
            Normalization::ZScore => (mean, std),
            Normalization::None => return self.clone(),
        };

        let data = if scale > 0.0 {
            self.data.iter().map(|&v| (v - offset) / scale).collect()
        } else {
            log::warn!("Distance matrix has no spread; {method:?} normalisation yields zeros");
            self.data.iter().map(|&v| if v.is_nan() { v } else { 0.0 }).collect()
        };
        DistanceMatrix { species: self.species.clone(), data }
    }

    /// Dense rows with missing cells replaced by `fill`, for clustering.
    pub fn filled(&self, fill: f64) -> Vec<Vec<f64>> {
        self.data
            .chunks(self.n().max(1))
            .take(self.n())
            .map(|row| row.iter().map(|&v| if v.is_nan() { fill } else { v }).collect())
            .collect()
    }
}

/// Cell-wise mean of matrices sharing one species ordering.
///
/// A cell missing in any input is missing in the result.
pub fn aggregate(matrices: &[DistanceMatrix]) -> Result<DistanceMatrix> {
    let first = matrices
        .first()
        .ok_or_else(|| Error::degenerate("no matrices to aggregate"))?;
    for (i, m) in matrices.iter().enumerate().skip(1) {
        if m.species != first.species {
            return Err(Error::ShapeMismatch(format!(
                "matrix {i} species ordering differs from matrix 0"
            )));
        }
    }

    let k = matrices.len() as f64;
    let data = (0..first.data.len())
        .map(|cell| matrices.iter().map(|m| m.data[cell]).sum::<f64>() / k)
        .collect();
    Ok(DistanceMatrix { species: first.species.clone(), data })
}

/// Read the matrices named by `manifest`, in order, and aggregate them.
pub fn aggregate_files(manifest: &[PathBuf]) -> Result<DistanceMatrix> {
    let matrices = manifest
        .iter()
        .map(|p| io::read_matrix(p))
        .collect::<Result<Vec<_>>>()?;
    aggregate(&matrices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("sp{i}")).collect()
    }

    fn sample_matrix() -> DistanceMatrix {
        DistanceMatrix::from_rows(
            names(3),
            vec![
                0.0, 1.0, 2.0, //
                1.0, 0.0, 3.0, //
                2.0, 3.0, 0.0,
            ],
        )
        .unwrap()
    }

    #[test]
    fn diagonal_is_missing() {
        let m = sample_matrix();
        for i in 0..3 {
            assert!(m.is_missing(i, i));
        }
        assert_eq!(m.present_values().len(), 6);
    }

    #[test]
    fn mean_range_ignores_diagonal() {
        let m = sample_matrix().normalized(Normalization::MeanRange);
        // mean = 2, range = 2
        assert_abs_diff_eq!(m.get(0, 1), -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(m.get(1, 2), 0.5, epsilon = 1e-12);
        assert!(m.is_missing(1, 1));
    }

    #[test]
    fn min_max_spans_unit_interval() {
        let m = sample_matrix().normalized(Normalization::MinMax);
        let v = m.present_values();
        assert_abs_diff_eq!(v.iter().cloned().fold(f64::INFINITY, f64::min), 0.0);
        assert_abs_diff_eq!(v.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 1.0);
    }

    #[test]
    fn z_score_has_zero_mean() {
        let m = sample_matrix().normalized(Normalization::ZScore);
        let v = m.present_values();
        assert_abs_diff_eq!(v.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn none_keeps_raw_values() {
        let raw = sample_matrix();
        let m = raw.normalized(Normalization::None);
        assert_eq!(m.present_values(), raw.present_values());
        assert!(m.is_missing(2, 2));
    }

    #[test]
    fn flat_matrix_normalises_to_zero() {
        let m = DistanceMatrix::from_rows(names(2), vec![0.0, 4.0, 4.0, 0.0]).unwrap();
        let n = m.normalized(Normalization::MeanRange);
        assert_eq!(n.get(0, 1), 0.0);
        assert!(n.is_missing(0, 0));
    }

    #[test]
    fn aggregate_is_cellwise_mean() {
        let a = sample_matrix();
        let mut b = sample_matrix();
        b.set(0, 1, 5.0);
        let avg = aggregate(&[a, b]).unwrap();
        assert_abs_diff_eq!(avg.get(0, 1), 3.0);
        assert_abs_diff_eq!(avg.get(2, 1), 3.0);
        assert!(avg.is_missing(2, 2));
    }

    #[test]
    fn aggregate_single_matrix_is_identity() {
        let a = sample_matrix();
        let avg = aggregate(std::slice::from_ref(&a)).unwrap();
        assert_eq!(avg.present_values(), a.present_values());
    }

    #[test]
    fn aggregate_propagates_missing() {
        let a = sample_matrix();
        let mut b = sample_matrix();
        b.set(0, 2, f64::NAN);
        let avg = aggregate(&[a, b]).unwrap();
        assert!(avg.is_missing(0, 2));
    }

    #[test]
    fn aggregate_rejects_reordered_species() {
        let a = sample_matrix();
        let mut b = sample_matrix();
        b.species.swap(0, 1);
        assert!(matches!(aggregate(&[a, b]), Err(Error::ShapeMismatch(_))));
        assert!(aggregate(&[]).is_err());
    }

    #[test]
    fn aggregate_files_follows_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let a = sample_matrix();
        let mut b = sample_matrix();
        b.set(1, 2, 7.0);
        let manifest = vec![dir.path().join("m1.csv"), dir.path().join("m2.csv")];
        io::write_matrix(&manifest[0], &a).unwrap();
        io::write_matrix(&manifest[1], &b).unwrap();
        let avg = aggregate_files(&manifest).unwrap();
        assert_abs_diff_eq!(avg.get(1, 2), 5.0);
        assert!(aggregate_files(&[dir.path().join("absent.csv")]).is_err());
    }

    #[test]
    fn filled_replaces_missing() {
        let rows = sample_matrix().filled(0.0);
        assert_eq!(rows[0], vec![0.0, 1.0, 2.0]);
        assert_eq!(rows.len(), 3);
    }
}
