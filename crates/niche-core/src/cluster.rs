//! K-means clustering of species feature vectors.
//!
//! Rows of the feature matrix are species; columns are either per-variable
//! medians or the columns of a filled distance matrix.

use std::cmp::Ordering;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::KmeansParams;
use crate::error::{Error, Result};

/// Best k-means solution found for one k.
#[derive(Debug, Clone)]
pub struct KmeansResult {
    pub centroids: Vec<Vec<f64>>,
    /// Cluster id per input row.
    pub labels: Vec<usize>,
    /// Sum of squared distances from each row to its centroid.
    pub distortion: f64,
}

/// Species → cluster assignment for one k.
#[derive(Debug, Clone)]
pub struct Classification {
    pub k: usize,
    pub species: Vec<String>,
    pub labels: Vec<usize>,
    pub distortion: f64,
}

/// Scale every column to unit population variance. Constant columns are left
/// as they are.
pub fn whiten(data: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(first) = data.first() else {
        return Vec::new();
    };
    let n = data.len() as f64;
    let dims = first.len();
    let stds: Vec<f64> = (0..dims)
        .map(|d| {
            let mean = data.iter().map(|row| row[d]).sum::<f64>() / n;
            (data.iter().map(|row| (row[d] - mean).powi(2)).sum::<f64>() / n).sqrt()
        })
        .collect();
    data.iter()
        .map(|row| {
            row.iter()
                .zip(&stds)
                .map(|(&v, &s)| if s > 0.0 { v / s } else { v })
                .collect()
        })
        .collect()
}

/// Number of distinct rows in `data`. `0.0` and `-0.0` count as equal.
pub fn distinct_rows(data: &[Vec<f64>]) -> usize {
    let mut rows: Vec<&Vec<f64>> = data.iter().collect();
    rows.sort_by(|a, b| lexicographic(a.as_slice(), b.as_slice()));
    rows.dedup_by(|a, b| lexicographic(a.as_slice(), b.as_slice()) == Ordering::Equal);
    rows.len()
}

fn lexicographic(a: &[f64], b: &[f64]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.partial_cmp(y).unwrap_or_else(|| x.total_cmp(y)))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the nearest centroid and the squared distance to it.
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(point, c)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .unwrap_or((0, f64::INFINITY))
}

/// Nearest-centroid label for every row.
pub fn assign(data: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    data.iter().map(|p| nearest(p, centroids).0).collect()
}

fn validate(data: &[Vec<f64>], k: usize) -> Result<()> {
    let Some(first) = data.first() else {
        return Err(Error::degenerate("k-means on an empty feature matrix"));
    };
    if first.is_empty() || data.iter().any(|r| r.len() != first.len()) {
        return Err(Error::degenerate("feature rows must share a non-zero length"));
    }
    if data.iter().flatten().any(|v| !v.is_finite()) {
        return Err(Error::degenerate("feature matrix contains non-finite values"));
    }
    if k == 0 {
        return Err(Error::degenerate("k must be at least 1"));
    }
    let distinct = distinct_rows(data);
    if k > distinct {
        return Err(Error::degenerate(format!(
            "k = {k} exceeds the {distinct} distinct feature rows"
        )));
    }
    Ok(())
}

/// k-means++ seeding.
fn init_centroids<R: Rng + ?Sized>(data: &[Vec<f64>], k: usize, rng: &mut R) -> Result<Vec<Vec<f64>>> {
    let mut centroids = vec![data[rng.gen_range(0..data.len())].clone()];
    while centroids.len() < k {
        let weights: Vec<f64> = data.iter().map(|p| nearest(p, &centroids).1).collect();
        let pick = WeightedIndex::new(&weights)
            .map_err(|e| Error::degenerate(format!("k-means++ seeding failed: {e}")))?;
        centroids.push(data[pick.sample(rng)].clone());
    }
    Ok(centroids)
}

/// One Lloyd run from a k-means++ start.
fn lloyd<R: Rng + ?Sized>(data: &[Vec<f64>], params: &KmeansParams, rng: &mut R) -> Result<KmeansResult> {
    let dims = data[0].len();
    let mut centroids = init_centroids(data, params.k, rng)?;
    let mut labels = assign(data, &centroids);

    for _ in 0..params.max_iterations {
        let mut sums = vec![vec![0.0; dims]; params.k];
        let mut counts = vec![0usize; params.k];
        for (p, &l) in data.iter().zip(&labels) {
            counts[l] += 1;
            for (s, v) in sums[l].iter_mut().zip(p) {
                *s += v;
            }
        }

        let mut max_shift = 0.0f64;
        for (j, (sum, &count)) in sums.into_iter().zip(&counts).enumerate() {
            // Empty clusters keep their previous centroid.
            if count == 0 {
                continue;
            }
            let updated: Vec<f64> = sum.into_iter().map(|s| s / count as f64).collect();
            max_shift = max_shift.max(squared_distance(&updated, &centroids[j]).sqrt());
            centroids[j] = updated;
        }

        labels = assign(data, &centroids);
        if max_shift < params.tolerance {
            break;
        }
    }

    let distortion = data
        .iter()
        .zip(&labels)
        .map(|(p, &l)| squared_distance(p, &centroids[l]))
        .sum();
    Ok(KmeansResult { centroids, labels, distortion })
}

/// Cluster `data` into `params.k` groups, keeping the lowest-distortion
/// solution over `params.restarts` initialisations.
pub fn kmeans<R: Rng + ?Sized>(data: &[Vec<f64>], params: &KmeansParams, rng: &mut R) -> Result<KmeansResult> {
    validate(data, params.k)?;
    let mut best: Option<KmeansResult> = None;
    for _ in 0..params.restarts.max(1) {
        let run = lloyd(data, params, rng)?;
        if best.as_ref().map_or(true, |b| run.distortion < b.distortion) {
            best = Some(run);
        }
    }
    best.ok_or_else(|| Error::degenerate("k-means produced no solution"))
}

/// Cluster once for a fixed k and pair labels with species.
pub fn classify(
    species: &[String],
    data: &[Vec<f64>],
    params: &KmeansParams,
    seed: u64,
) -> Result<Classification> {
    if species.len() != data.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} species but {} feature rows",
            species.len(),
            data.len()
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed ^ (params.k as u64).wrapping_mul(0x2545_F491_4F6C_DD1D));
    let result = kmeans(data, params, &mut rng)?;
    Ok(Classification {
        k: params.k,
        species: species.to_vec(),
        labels: result.labels,
        distortion: result.distortion,
    })
}

/// Classifications for every k in `2..=k_max`.
pub fn sweep(
    species: &[String],
    data: &[Vec<f64>],
    k_max: usize,
    params: &KmeansParams,
    seed: u64,
) -> Result<Vec<Classification>> {
    if k_max < 2 {
        return Err(Error::Argument(format!("maximum k must be at least 2, got {k_max}")));
    }
    validate(data, k_max)?;
    (2..=k_max)
        .map(|k| {
            let run = classify(species, data, &KmeansParams { k, ..params.clone() }, seed)?;
            log::info!("k = {k}: distortion {:.6}", run.distortion);
            Ok(run)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn two_pairs() -> Vec<Vec<f64>> {
        vec![vec![0.0, 0.0], vec![0.1, 0.0], vec![10.0, 10.0], vec![10.0, 10.1]]
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("sp{i}")).collect()
    }

    #[test]
    fn separates_two_well_spaced_pairs() {
        let data = two_pairs();
        for seed in 0..10 {
            let params = KmeansParams { k: 2, ..Default::default() };
            let c = classify(&names(4), &data, &params, seed).unwrap();
            assert_eq!(c.labels[0], c.labels[1]);
            assert_eq!(c.labels[2], c.labels[3]);
            assert_ne!(c.labels[0], c.labels[2]);
        }
    }

    #[test]
    fn distortion_is_within_cluster_sum_of_squares() {
        let data = two_pairs();
        let mut rng = StdRng::seed_from_u64(4);
        let r = kmeans(&data, &KmeansParams { k: 2, ..Default::default() }, &mut rng).unwrap();
        // Each pair contributes 2 × 0.05² = 0.005.
        assert_abs_diff_eq!(r.distortion, 0.01, epsilon = 1e-9);
    }

    #[test]
    fn k_equal_to_points_has_zero_distortion() {
        let data = two_pairs();
        let mut rng = StdRng::seed_from_u64(2);
        let r = kmeans(&data, &KmeansParams { k: 4, ..Default::default() }, &mut rng).unwrap();
        assert_abs_diff_eq!(r.distortion, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn k_above_distinct_points_is_rejected() {
        let data = vec![vec![1.0], vec![1.0], vec![2.0]];
        let mut rng = StdRng::seed_from_u64(0);
        let err = kmeans(&data, &KmeansParams { k: 3, ..Default::default() }, &mut rng);
        assert!(matches!(err, Err(Error::NumericDegenerate(_))));
    }

    #[test]
    fn signed_zeros_are_one_point() {
        let data = vec![vec![0.0, 1.0], vec![-0.0, 1.0]];
        assert_eq!(distinct_rows(&data), 1);
        let mut rng = StdRng::seed_from_u64(0);
        let err = kmeans(&data, &KmeansParams { k: 2, ..Default::default() }, &mut rng);
        assert!(matches!(err, Err(Error::NumericDegenerate(_))));
    }

    #[test]
    fn sweep_covers_every_k() {
        let data = two_pairs();
        let runs = sweep(&names(4), &data, 4, &KmeansParams::default(), 1).unwrap();
        let ks: Vec<usize> = runs.iter().map(|r| r.k).collect();
        assert_eq!(ks, vec![2, 3, 4]);
        assert!(runs[0].distortion >= runs[2].distortion);
    }

    #[test]
    fn sweep_validates_k_max() {
        let data = two_pairs();
        assert!(matches!(
            sweep(&names(4), &data, 1, &KmeansParams::default(), 0),
            Err(Error::Argument(_))
        ));
        assert!(matches!(
            sweep(&names(4), &data, 5, &KmeansParams::default(), 0),
            Err(Error::NumericDegenerate(_))
        ));
    }

    #[test]
    fn whiten_gives_unit_variance() {
        let data = vec![vec![1.0, 5.0], vec![3.0, 5.0], vec![5.0, 5.0]];
        let w = whiten(&data);
        let mean = w.iter().map(|r| r[0]).sum::<f64>() / 3.0;
        let var = w.iter().map(|r| (r[0] - mean).powi(2)).sum::<f64>() / 3.0;
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-12);
        // Constant column untouched.
        assert!(w.iter().all(|r| r[1] == 5.0));
    }

    #[test]
    fn assign_picks_nearest_centroid() {
        let centroids = vec![vec![0.0], vec![10.0]];
        assert_eq!(assign(&[vec![1.0], vec![9.0], vec![4.0]], &centroids), vec![0, 1, 0]);
    }

    #[test]
    fn distinct_rows_ignores_duplicates() {
        assert_eq!(distinct_rows(&[vec![1.0, 2.0], vec![1.0, 2.0], vec![2.0, 1.0]]), 2);
    }
}
