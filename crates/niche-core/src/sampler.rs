//! Per-species observation sources.
//!
//! Distributional draws reconstruct occupancy samples from a PNO profile.
//! Point clouds are the cleaned occurrence coordinates themselves and need no
//! sampling distribution.

use std::path::Path;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::{Error, Result};
use crate::io;
use crate::profile::Profile;
use crate::Point;

/// Draw `n` bin values with replacement, weighted by bin probability.
///
/// Each call is independent: two calls for different variables of the same
/// species are not paired by draw index.
pub fn sample_profile<R: Rng + ?Sized>(profile: &Profile, n: usize, rng: &mut R) -> Result<Vec<f64>> {
    if n == 0 {
        return Err(Error::degenerate("sample count must be positive"));
    }
    if profile.is_empty() {
        return Err(Error::degenerate("cannot sample from an empty profile"));
    }
    let weights = WeightedIndex::new(profile.bins.iter().map(|b| b.probability))
        .map_err(|e| Error::degenerate(format!("invalid bin weights: {e}")))?;
    Ok((0..n).map(|_| profile.bins[weights.sample(rng)].bin_value).collect())
}

/// Cleaned point cloud of every species, read from `<species>_cleaned.csv`
/// under `dir`, in species order. `None` marks a species whose file is
/// absent or holds no points.
pub fn load_point_clouds(dir: &Path, species: &[String]) -> Result<Vec<Option<Vec<Point>>>> {
    species
        .iter()
        .map(|sp| {
            let path = dir.join(io::cleaned_file_name(sp));
            let cloud = io::read_point_cloud(&path).and_then(|cloud| {
                if cloud.is_empty() {
                    Err(Error::AllDataMissing { species: sp.clone() })
                } else {
                    Ok(cloud)
                }
            });
            match cloud {
                Ok(cloud) => {
                    log::debug!("{sp}: {} cleaned points", cloud.len());
                    Ok(Some(cloud))
                }
                Err(e) if e.is_data_absence() => {
                    log::warn!("{sp}: {e}; treated as missing data");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::BinRecord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn profile(entries: &[(f64, f64)]) -> Profile {
        Profile::new(
            entries
                .iter()
                .map(|&(bin_value, probability)| BinRecord { bin_value, probability })
                .collect(),
        )
    }

    #[test]
    fn draws_only_weighted_bins() {
        let p = profile(&[(1.0, 0.0), (2.0, 1.0), (3.0, 0.0)]);
        let mut rng = StdRng::seed_from_u64(1);
        let s = sample_profile(&p, 500, &mut rng).unwrap();
        assert_eq!(s.len(), 500);
        assert!(s.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn draw_frequencies_follow_probabilities() {
        let p = profile(&[(0.0, 0.25), (1.0, 0.75)]);
        let mut rng = StdRng::seed_from_u64(99);
        let s = sample_profile(&p, 20_000, &mut rng).unwrap();
        let frac = s.iter().filter(|&&v| v == 1.0).count() as f64 / s.len() as f64;
        assert!((frac - 0.75).abs() < 0.02, "frac={frac}");
    }

    #[test]
    fn zero_samples_is_degenerate() {
        let p = profile(&[(1.0, 1.0)]);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sample_profile(&p, 0, &mut rng).is_err());
    }

    #[test]
    fn all_zero_weights_is_degenerate() {
        let p = profile(&[(1.0, 0.0), (2.0, 0.0)]);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(sample_profile(&p, 5, &mut rng), Err(Error::NumericDegenerate(_))));
    }

    #[test]
    fn loads_clouds_in_species_order() {
        let dir = tempfile::tempdir().unwrap();
        io::write_point_cloud(&dir.path().join("b_cleaned.csv"), &[vec![1.0, 2.0]]).unwrap();
        io::write_point_cloud(&dir.path().join("a_cleaned.csv"), &[vec![3.0, 4.0], vec![5.0, 6.0]])
            .unwrap();
        let species = vec!["a".to_string(), "b".to_string()];
        let clouds = load_point_clouds(dir.path(), &species).unwrap();
        assert_eq!(clouds[0].as_ref().map(Vec::len), Some(2));
        assert_eq!(clouds[1], Some(vec![vec![1.0, 2.0]]));
    }

    #[test]
    fn absent_or_empty_clouds_are_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blank_cleaned.csv"), "\n").unwrap();
        let species = vec!["blank".to_string(), "absent".to_string()];
        let clouds = load_point_clouds(dir.path(), &species).unwrap();
        assert_eq!(clouds, vec![None, None]);
    }
}
