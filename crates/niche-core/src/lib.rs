//! Niche dissimilarity and clustering from probabilistic niche occupancy data.

pub mod cleaner;
pub mod cluster;
pub mod config;
pub mod distance;
pub mod error;
pub mod io;
pub mod matrix;
pub mod pipeline;
pub mod profile;
pub mod sampler;
pub mod summary;

/// One cleaned occurrence: a coordinate per niche variable.
pub type Point = Vec<f64>;

pub use config::{KmeansParams, RunConfig};
pub use error::{Error, ProfileError, Result};
pub use matrix::{DistanceMatrix, Normalization};
pub use pipeline::{run_bootstrap, run_point_cloud, BootstrapJob, PointCloudJob, RunSummary};
