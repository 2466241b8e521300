//! End-to-end runs for the two input variants.
//!
//! Bootstrap: PNO profiles → per-variable sampled distance matrices →
//! normalised → averaged → single-k classification.
//!
//! Point cloud: raw occurrence columns → cleaned point clouds → sampled mean
//! pair distances → medians → k sweep with distortions.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use log::{debug, info, warn};

use crate::cleaner::{clean_species, RawObservations};
use crate::cluster::{classify, sweep, whiten, Classification};
use crate::config::{KmeansParams, RunConfig};
use crate::distance::{bootstrap_variable_matrix, point_cloud_matrix, PairSampling};
use crate::error::{Error, ProfileError, Result};
use crate::io;
use crate::matrix::{aggregate_files, Normalization};
use crate::profile::Profile;
use crate::sampler::load_point_clouds;
use crate::summary::median_features;

/// Inputs of a bootstrap run.
#[derive(Debug, Clone)]
pub struct BootstrapJob {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Number of niche variables; files are numbered `1..=variables`.
    pub variables: usize,
    /// Draws per species per cell.
    pub samples: usize,
    pub clusters: usize,
    pub config: RunConfig,
}

/// Inputs of a point-cloud run.
#[derive(Debug, Clone)]
pub struct PointCloudJob {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub variables: usize,
    pub max_k: usize,
    /// Read existing `<species>_cleaned.csv` files from `data_dir` instead of
    /// cleaning raw occurrence columns.
    pub skip_clean: bool,
    pub config: RunConfig,
}

/// What a run produced, beyond the files it wrote.
#[derive(Debug)]
pub struct RunSummary {
    pub species: Vec<String>,
    pub missing: Vec<String>,
    pub classifications: Vec<Classification>,
}

impl BootstrapJob {
    fn validate(&self) -> Result<()> {
        if self.variables == 0 {
            return Err(Error::Argument("number of variables must be at least 1".into()));
        }
        if self.samples == 0 {
            return Err(Error::Argument("number of samples must be at least 1".into()));
        }
        if self.clusters == 0 {
            return Err(Error::Argument("number of clusters must be at least 1".into()));
        }
        Ok(())
    }
}

impl PointCloudJob {
    fn validate(&self) -> Result<()> {
        if self.variables == 0 {
            return Err(Error::Argument("number of variables must be at least 1".into()));
        }
        if self.max_k < 2 {
            return Err(Error::Argument(format!(
                "maximum number of clusters must be at least 2, got {}",
                self.max_k
            )));
        }
        Ok(())
    }
}

/// Corrected profile, or `None` when the file is absent.
fn load_profile(path: &Path, species: &str, variable: usize) -> Result<Option<Profile>> {
    match io::read_profile(path) {
        Ok(p) => Ok(Some(p.corrected()?)),
        Err(ProfileError::Missing { .. }) => {
            warn!("PNO {variable} file not found for {species}; treated as missing data");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn report_missing(output_dir: &Path, missing: &[String]) -> Result<()> {
    io::write_species_list(&output_dir.join(io::MISSING_SPECIES), missing)?;
    if !missing.is_empty() {
        warn!(
            "{} species excluded for missing data: {}",
            missing.len(),
            missing.join(", ")
        );
    }
    Ok(())
}

pub fn run_bootstrap(job: &BootstrapJob, cancel: &AtomicBool) -> Result<RunSummary> {
    job.validate()?;
    std::fs::create_dir_all(&job.output_dir)?;
    let all_species = io::read_species_list(&job.data_dir.join(io::SPECIES_LIST))?;
    let seed = job.config.resolve_seed();
    let normalization = job.config.normalization.unwrap_or(Normalization::MeanRange);
    info!(
        "{} species, {} variables, {} samples per draw",
        all_species.len(),
        job.variables,
        job.samples
    );

    // profiles[v][s]
    let mut profiles: Vec<Vec<Option<Profile>>> = Vec::with_capacity(job.variables);
    for v in 1..=job.variables {
        let row = all_species
            .iter()
            .map(|sp| load_profile(&job.data_dir.join(io::pno_file_name(v, sp)), sp, v))
            .collect::<Result<Vec<_>>>()?;
        profiles.push(row);
    }

    let (keep, missing): (Vec<usize>, Vec<usize>) = (0..all_species.len())
        .partition(|&s| profiles.iter().any(|row| row[s].is_some()));
    let species: Vec<String> = keep.iter().map(|&s| all_species[s].clone()).collect();
    let missing: Vec<String> = missing.iter().map(|&s| all_species[s].clone()).collect();
    if species.is_empty() {
        return Err(Error::degenerate("no species has any PNO data"));
    }

    let manifest = io::normalized_manifest(&job.output_dir, job.variables);
    for (vi, (row, path)) in profiles.iter().zip(&manifest).enumerate() {
        let v = vi + 1;
        let retained: Vec<Option<Profile>> = keep.iter().map(|&s| row[s].clone()).collect();
        let raw = bootstrap_variable_matrix(&species, &retained, job.samples, v, seed, cancel)?;
        io::write_matrix(&job.output_dir.join(io::raw_matrix_file_name(v)), &raw)?;
        io::write_matrix(path, &raw.normalized(normalization))?;
        debug!("variable {v}: wrote {}", path.display());
    }
    info!("Computed {} per-variable distance matrices", manifest.len());

    let averaged = aggregate_files(&manifest)?;
    io::write_matrix(&job.output_dir.join(io::AVERAGED_MATRIX), &averaged)?;

    let mut features = averaged.filled(0.0);
    if job.config.whiten.unwrap_or(false) {
        features = whiten(&features);
    }
    let params = KmeansParams { k: job.clusters, ..job.config.kmeans.clone() };
    let classification = classify(&species, &features, &params, seed)?;
    io::write_classification(&job.output_dir.join(io::FINAL_CLASSIFICATION), &classification)?;
    info!(
        "Classified {} species into {} clusters (distortion {:.6})",
        species.len(),
        job.clusters,
        classification.distortion
    );

    report_missing(&job.output_dir, &missing)?;
    Ok(RunSummary { species, missing, classifications: vec![classification] })
}

pub fn run_point_cloud(job: &PointCloudJob, cancel: &AtomicBool) -> Result<RunSummary> {
    job.validate()?;
    std::fs::create_dir_all(&job.output_dir)?;
    let all_species = io::read_species_list(&job.data_dir.join(io::SPECIES_LIST))?;
    let seed = job.config.resolve_seed();
    let normalization = job.config.normalization.unwrap_or(Normalization::MinMax);

    let (cleaned_dir, candidates, mut missing) = if job.skip_clean {
        (job.data_dir.clone(), all_species, Vec::new())
    } else {
        let raw = all_species
            .iter()
            .map(|sp| read_raw_observations(&job.data_dir, sp, job.variables))
            .collect::<Result<Vec<_>>>()?;
        let report = clean_species(raw, job.config.sentinel);
        for (sp, points) in &report.retained {
            io::write_point_cloud(&job.output_dir.join(io::cleaned_file_name(sp)), points)?;
        }
        (job.output_dir.clone(), report.species(), report.missing)
    };

    let loaded = load_point_clouds(&cleaned_dir, &candidates)?;
    let mut species = Vec::with_capacity(candidates.len());
    let mut clouds = Vec::with_capacity(candidates.len());
    for (sp, cloud) in candidates.into_iter().zip(loaded) {
        match cloud {
            Some(cloud) => {
                species.push(sp);
                clouds.push(cloud);
            }
            None => missing.push(sp),
        }
    }
    if species.is_empty() {
        return Err(Error::degenerate("no species retained after cleaning"));
    }
    info!("{} species retained, {} excluded", species.len(), missing.len());

    if let Some((sp, _)) = species
        .iter()
        .zip(&clouds)
        .find(|(_, cloud)| cloud.iter().any(|p| p.len() != job.variables))
    {
        return Err(Error::Malformed {
            path: cleaned_dir.join(io::cleaned_file_name(sp)),
            reason: format!("expected {} coordinates per point", job.variables),
        });
    }

    let sampling = PairSampling {
        pair_cap: job.config.pair_cap,
        product_limit: job.config.product_limit,
    };
    let raw = point_cloud_matrix(&species, &clouds, sampling, seed, cancel)?;
    io::write_matrix(&job.output_dir.join(io::POINT_CLOUD_RAW_MATRIX), &raw)?;
    io::write_matrix(&job.output_dir.join(io::POINT_CLOUD_MATRIX), &raw.normalized(normalization))?;
    info!("Distance matrix written for {} species", species.len());

    let medians = clouds
        .iter()
        .map(|c| median_features(c))
        .collect::<Result<Vec<_>>>()?;
    io::write_medians(&job.output_dir.join(io::MEDIANS), &species, &medians)?;

    let features = if job.config.whiten.unwrap_or(true) { whiten(&medians) } else { medians };
    let runs = sweep(&species, &features, job.max_k, &job.config.kmeans, seed)?;
    for run in &runs {
        io::write_classification(&job.output_dir.join(io::classification_file_name(run.k)), run)?;
    }
    io::write_distortions(&job.output_dir.join(io::DISTORTIONS), &runs)?;

    report_missing(&job.output_dir, &missing)?;
    Ok(RunSummary { species, missing, classifications: runs })
}

/// Occurrence columns of one species; absent files become `None`.
fn read_raw_observations(dir: &Path, species: &str, variables: usize) -> Result<RawObservations> {
    let columns = (1..=variables)
        .map(|v| match io::read_occurrence_column(&dir.join(io::occurrence_file_name(v, species))) {
            Ok(col) => Ok(Some(col)),
            Err(e) if e.is_data_absence() => {
                warn!("Occurrence file {v} not found for {species}; treated as missing data");
                Ok(None)
            }
            Err(e) => Err(e),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RawObservations { species: species.to_string(), columns })
}
