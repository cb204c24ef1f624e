//! Resolve free-text place strings to administrative units.
//!
//! Reads any CSV with a `place` column, resolves each distinct string through
//! lookup, geocoder and spatial fallbacks, and writes the resolved table.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use locus::config::Config;
use locus::geocoder::BingMapsClient;
use locus::records::{read_places, read_resolved, write_resolved};
use locus::{ResolutionPipeline, ResolverContext};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "resolve")]
#[command(about = "Resolve place strings to administrative units")]
struct Args {
    /// CSV with a `place` column (a posts table works too)
    #[arg(short, long)]
    input: PathBuf,

    /// Resolved table to write
    #[arg(short, long, default_value = "resolved.csv")]
    output: PathBuf,

    /// Configuration file
    #[arg(short, long, default_value = "locus.toml")]
    config: PathBuf,

    /// Resolved table from an earlier run; its places are reused as-is
    #[arg(long)]
    known: Option<PathBuf>,

    /// Skip the geocoder fallback
    #[arg(long)]
    no_geocoder: bool,

    /// Debug logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let level = if verbose { Level::DEBUG } else { Level::INFO };
        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("Locus place resolution");
    let config = Config::load_from_file(&args.config)?;
    let context = Arc::new(ResolverContext::load(&config)?);

    let geocoder = if args.no_geocoder {
        None
    } else {
        BingMapsClient::from_config(&config.geocoder).context("Failed to set up geocoder")?
    };
    let geocoding = geocoder.is_some();
    if !geocoding {
        info!("Geocoder fallback disabled");
    }

    let places = read_places(&args.input)?;
    info!("Read {} place strings from {}", places.len(), args.input.display());

    let mut pipeline = ResolutionPipeline::new(context, geocoder)
        .with_concurrency(config.geocoder.concurrency);
    if geocoding {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
                )?
                .progress_chars("#>-"),
        );
        pipeline = pipeline.with_progress(pb);
    }
    if let Some(path) = &args.known {
        let known = read_resolved(path)
            .with_context(|| format!("Failed to read known places from {}", path.display()))?;
        info!("Reusing {} known places", known.len());
        pipeline = pipeline.with_known(known);
    }

    let (resolved, stats) = pipeline.run(&places).await;

    write_resolved(&args.output, &resolved)?;
    info!(
        "Wrote {} resolved places to {} ({} unresolved)",
        resolved.len(),
        args.output.display(),
        stats.unresolved
    );

    Ok(())
}
