//! Point-cloud niche classification.
//! Cleans per-variable occurrence records, measures species distances over
//! sampled point pairs and sweeps k-means over k = 2..=MAX_K on species medians.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use niche_core::{run_point_cloud, PointCloudJob, RunConfig};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "pointcloud",
    about = "Cluster species into niche classes from cleaned occurrence points",
    after_help = "Example: pointcloud 12 10"
)]
struct Args {
    /// Number of niche variables (files occ1_* .. occN_*).
    #[arg(value_parser = at_least(1))]
    variables: usize,

    /// Largest number of clusters to try; every k from 2 up is run.
    #[arg(value_parser = at_least(2))]
    max_k: usize,

    /// Directory holding specieslist.csv and the occurrence files.
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Output directory (created if absent).
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Seed for pair sampling and k-means; drawn at random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// JSON run config; command-line flags take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Missing-value sentinel in occurrence files.
    #[arg(long, allow_hyphen_values = true)]
    sentinel: Option<f64>,

    /// Use existing <species>_cleaned.csv files in the data directory.
    #[arg(long)]
    skip_clean: bool,

    /// Cluster raw medians instead of whitened ones.
    #[arg(long)]
    no_whiten: bool,
}

fn at_least(
    min: usize,
) -> impl Fn(&str) -> std::result::Result<usize, String> + Clone + Send + Sync + 'static {
    move |s: &str| match s.parse::<usize>() {
        Ok(n) if n >= min => Ok(n),
        Ok(_) => Err(format!("must be at least {min}")),
        Err(e) => Err(e.to_string()),
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RunConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => RunConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(s) = args.sentinel {
        config.sentinel = s;
    }
    if args.no_whiten {
        config.whiten = Some(false);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
        .context("installing Ctrl-C handler")?;

    let job = PointCloudJob {
        data_dir: args.data_dir,
        output_dir: args.output.clone(),
        variables: args.variables,
        max_k: args.max_k,
        skip_clean: args.skip_clean,
        config,
    };
    let summary = run_point_cloud(&job, &cancel).context("point-cloud classification failed")?;

    info!(
        "Done. {} species, k = 2..={} written to {}; {} excluded.",
        summary.species.len(),
        args.max_k,
        args.output.display(),
        summary.missing.len()
    );
    Ok(())
}
