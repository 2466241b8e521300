use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::matrix::Normalization;

/// Sentinel written by upstream occurrence extractors for a missing value.
pub const MISSING_SENTINEL: f64 = -9999.0;

/// Cartesian products at or below this size are enumerated exhaustively.
pub const PRODUCT_LIMIT: usize = 10_000;

/// Number of point pairs averaged per matrix cell.
pub const PAIR_CAP: usize = 100;

/// K-means parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KmeansParams {
    /// Number of clusters.
    pub k: usize,
    /// Lloyd iterations per restart.
    pub max_iterations: usize,
    /// Stop when no centroid moves further than this.
    pub tolerance: f64,
    /// Independent initialisations; the lowest-distortion run wins.
    pub restarts: usize,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            k: 2,
            max_iterations: 300,
            tolerance: 1e-5,
            restarts: 20,
        }
    }
}

/// Run-wide parameters shared by both pipelines.
///
/// Every field has a default, so a partial JSON file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Base seed. `None` draws one at start-up and logs it.
    pub seed: Option<u64>,
    pub sentinel: f64,
    /// `None` selects the variant default (MeanRange for bootstrap, MinMax
    /// for point clouds).
    pub normalization: Option<Normalization>,
    /// Whiten features before clustering. `None` selects the variant default.
    pub whiten: Option<bool>,
    pub pair_cap: usize,
    pub product_limit: usize,
    pub kmeans: KmeansParams,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: None,
            sentinel: MISSING_SENTINEL,
            normalization: None,
            whiten: None,
            pair_cap: PAIR_CAP,
            product_limit: PRODUCT_LIMIT,
            kmeans: KmeansParams::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The configured seed, or a fresh one that is logged so the run can be
    /// repeated.
    pub fn resolve_seed(&self) -> u64 {
        match self.seed {
            Some(s) => s,
            None => {
                let s: u64 = rand::random();
                log::info!("No seed configured; using {s}");
                s
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: RunConfig =
            serde_json::from_str(r#"{ "seed": 7, "kmeans": { "restarts": 3 } }"#).unwrap();
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(cfg.kmeans.restarts, 3);
        assert_eq!(cfg.kmeans.max_iterations, 300);
        assert_eq!(cfg.pair_cap, PAIR_CAP);
        assert_eq!(cfg.sentinel, MISSING_SENTINEL);
    }

    #[test]
    fn normalization_parses_from_snake_case() {
        let cfg: RunConfig = serde_json::from_str(r#"{ "normalization": "z_score" }"#).unwrap();
        assert_eq!(cfg.normalization, Some(Normalization::ZScore));
        let cfg: RunConfig = serde_json::from_str(r#"{ "normalization": "none" }"#).unwrap();
        assert_eq!(cfg.normalization, Some(Normalization::None));
    }
}
