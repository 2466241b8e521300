//! Bootstrap niche discretisation.
//! Samples every species' PNO profiles, builds one normalised distance matrix
//! per niche variable, averages them and clusters species into niche classes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use niche_core::{run_bootstrap, BootstrapJob, Normalization, RunConfig};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "discretize",
    about = "Cluster species into niche classes from bootstrapped PNO profiles",
    after_help = "Example: discretize 12 10000 10"
)]
struct Args {
    /// Number of niche variables (files pno1_* .. pnoN_*).
    #[arg(value_parser = positive)]
    variables: usize,

    /// Number of values sampled from each variable's occupancy range.
    #[arg(value_parser = positive)]
    samples: usize,

    /// Desired number of clusters.
    #[arg(value_parser = positive)]
    clusters: usize,

    /// Directory holding specieslist.csv and the pno*_<species>.csv files.
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Output directory (created if absent).
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Seed for sampling and k-means; drawn at random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// JSON run config; command-line flags take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Normalisation of per-variable matrices.
    #[arg(long, value_enum)]
    normalization: Option<NormArg>,

    /// Whiten the averaged matrix columns before clustering.
    #[arg(long)]
    whiten: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum NormArg {
    MeanRange,
    MinMax,
    ZScore,
    None,
}

impl From<NormArg> for Normalization {
    fn from(n: NormArg) -> Self {
        match n {
            NormArg::MeanRange => Normalization::MeanRange,
            NormArg::MinMax => Normalization::MinMax,
            NormArg::ZScore => Normalization::ZScore,
            NormArg::None => Normalization::None,
        }
    }
}

fn positive(s: &str) -> std::result::Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".into()),
        Ok(n) => Ok(n),
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
    if let Some(n) = args.normalization {
        config.normalization = Some(n.into());
    }
    if args.whiten {
        config.whiten = Some(true);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
        .context("installing Ctrl-C handler")?;

    let job = BootstrapJob {
        data_dir: args.data_dir,
        output_dir: args.output.clone(),
        variables: args.variables,
        samples: args.samples,
        clusters: args.clusters,
        config,
    };
    let summary = run_bootstrap(&job, &cancel).context("bootstrap discretisation failed")?;

    info!(
        "Done. {} species classified, {} excluded; results in {}.",
        summary.species.len(),
        summary.missing.len(),
        args.output.display()
    );
    Ok(())
}
