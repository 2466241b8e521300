//! Pairwise species distance engine.
//!
//! Point clouds: each cell is the mean Euclidean distance over at most
//! `pair_cap` point pairs. Small cartesian products are enumerated and
//! shuffled down to the cap; large ones are sampled with replacement so the
//! cost per cell stays bounded.
//!
//! Bootstrap profiles: each cell draws fresh sample vectors for both species
//! and takes the Euclidean distance between the two vectors.
//!
//! Rows are computed in parallel. Every cell owns an RNG seeded from the run
//! seed and its coordinates, so output does not depend on scheduling.

use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::{PAIR_CAP, PRODUCT_LIMIT};
use crate::error::{Error, Result};
use crate::matrix::DistanceMatrix;
use crate::profile::Profile;
use crate::sampler::sample_profile;
use crate::Point;

/// Limits on how many point pairs feed one cell.
#[derive(Debug, Clone, Copy)]
pub struct PairSampling {
    pub pair_cap: usize,
    pub product_limit: usize,
}

impl Default for PairSampling {
    fn default() -> Self {
        Self { pair_cap: PAIR_CAP, product_limit: PRODUCT_LIMIT }
    }
}

pub fn euclidean(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.is_empty() || b.is_empty() {
        return Err(Error::degenerate("Euclidean distance of an empty vector"));
    }
    if a.len() != b.len() {
        return Err(Error::degenerate(format!(
            "Euclidean distance between lengths {} and {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt())
}

/// Index pairs `(i, j)` into `a` and `b` that feed one cell.
pub fn select_pairs<R: Rng + ?Sized>(
    a_len: usize,
    b_len: usize,
    sampling: PairSampling,
    rng: &mut R,
) -> Vec<(usize, usize)> {
    let product = a_len.saturating_mul(b_len);
    if product <= sampling.product_limit {
        let mut pairs: Vec<(usize, usize)> =
            (0..a_len).flat_map(|i| (0..b_len).map(move |j| (i, j))).collect();
        if pairs.len() > sampling.pair_cap {
            pairs.shuffle(rng);
            pairs.truncate(sampling.pair_cap);
        }
        pairs
    } else {
        (0..sampling.pair_cap)
            .map(|_| (rng.gen_range(0..a_len), rng.gen_range(0..b_len)))
            .collect()
    }
}

/// Mean Euclidean distance between two point sets.
pub fn mean_pair_distance<R: Rng + ?Sized>(
    a: &[Point],
    b: &[Point],
    sampling: PairSampling,
    rng: &mut R,
) -> Result<f64> {
    if a.is_empty() || b.is_empty() {
        return Err(Error::degenerate("mean distance with an empty point set"));
    }
    if sampling.pair_cap == 0 {
        return Err(Error::degenerate("pair cap must be positive"));
    }
    let pairs = select_pairs(a.len(), b.len(), sampling, rng);
    let mut total = 0.0;
    for &(i, j) in &pairs {
        total += euclidean(&a[i], &b[j])?;
    }
    Ok(total / pairs.len() as f64)
}

/// Distance matrix over cleaned point clouds, one cloud per species.
pub fn point_cloud_matrix(
    species: &[String],
    clouds: &[Vec<Point>],
    sampling: PairSampling,
    seed: u64,
    cancel: &AtomicBool,
) -> Result<DistanceMatrix> {
    if species.len() != clouds.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} species but {} point clouds",
            species.len(),
            clouds.len()
        )));
    }
    let n = species.len();
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|r| {
            (0..n)
                .map(|c| {
                    if cancel.load(Ordering::Relaxed) {
                        return Err(Error::Interrupted);
                    }
                    if r == c {
                        return Ok(f64::NAN);
                    }
                    let mut rng = cell_rng(seed, 0, r, c);
                    mean_pair_distance(&clouds[r], &clouds[c], sampling, &mut rng)
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<_>>()?;
    DistanceMatrix::from_rows(species.to_vec(), rows.concat())
}

/// Distance matrix for one niche variable from bootstrap draws.
///
/// `profiles[i]` is the corrected profile of `species[i]`, or `None` when the
/// species has no data for this variable; such cells stay missing.
pub fn bootstrap_variable_matrix(
    species: &[String],
    profiles: &[Option<Profile>],
    samples: usize,
    variable: usize,
    seed: u64,
    cancel: &AtomicBool,
) -> Result<DistanceMatrix> {
    if species.len() != profiles.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} species but {} profiles",
            species.len(),
            profiles.len()
        )));
    }
    let n = species.len();
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|r| {
            (0..n)
                .map(|c| {
                    if cancel.load(Ordering::Relaxed) {
                        return Err(Error::Interrupted);
                    }
                    let (Some(pr), Some(pc)) = (&profiles[r], &profiles[c]) else {
                        return Ok(f64::NAN);
                    };
                    if r == c {
                        return Ok(f64::NAN);
                    }
                    let mut rng = cell_rng(seed, variable as u64 + 1, r, c);
                    let row_sample = sample_profile(pr, samples, &mut rng)?;
                    let col_sample = sample_profile(pc, samples, &mut rng)?;
                    euclidean(&row_sample, &col_sample)
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<_>>()?;
    DistanceMatrix::from_rows(species.to_vec(), rows.concat())
}

/// Independent RNG stream for one cell.
fn cell_rng(seed: u64, stream: u64, row: usize, col: usize) -> StdRng {
    let mut h = splitmix64(seed ^ 0x9E37_79B9_7F4A_7C15);
    h = splitmix64(h ^ stream);
    h = splitmix64(h ^ row as u64);
    h = splitmix64(h ^ col as u64);
    StdRng::seed_from_u64(h)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}
