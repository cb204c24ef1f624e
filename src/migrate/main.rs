//! Monthly homes and migration flows from resolved posts.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hashbrown::HashMap;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use locus::config::Config;
use locus::context::load_tiers;
use locus::flows::{net_migration, MigrationFlowComputer};
use locus::home::{roll_up, PostCounter, UserHomeLocator};
use locus::records::{read_posts, read_resolved, write_flows, write_homes, write_net};
use locus::{AdminLevel, ResolvedPlace};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "migrate")]
#[command(about = "Infer monthly homes and migration flows from resolved posts")]
struct Args {
    /// Posts table: user_id,month,place[,count]
    #[arg(short, long)]
    posts: PathBuf,

    /// Resolved table written by `resolve`
    #[arg(short, long)]
    resolved: PathBuf,

    /// Per-month home table to write
    #[arg(long, default_value = "homes.csv")]
    homes: PathBuf,

    /// Flow table to write
    #[arg(long, default_value = "flows.csv")]
    flows: PathBuf,

    /// Optional per-locality net migration table
    #[arg(long)]
    net: Option<PathBuf>,

    /// Configuration file; `[thresholds]`, and `[reference]` when rolling up
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Level flows are counted at: lad, itl3, itl2 or itl1
    #[arg(short, long, default_value = "lad")]
    level: AdminLevel,

    /// Share the modal locality must exceed (overrides the config)
    #[arg(long)]
    home_share: Option<f64>,

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

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = match &args.config {
        Some(path) => Some(Config::load_from_file(path)?),
        None => None,
    };
    let config_share = config.as_ref().map(|c| c.thresholds.home_share);
    let tiers = match (&config, args.level.is_finest()) {
        (_, true) => None,
        (Some(config), false) => Some(load_tiers(&config.reference)?),
        (None, false) => {
            anyhow::bail!("--level {} needs --config for the hierarchy table", args.level)
        }
    };
    let home_share = args.home_share.or(config_share).unwrap_or(0.65);
    if !(0.0..1.0).contains(&home_share) {
        anyhow::bail!("--home-share must be in [0, 1), got {}", home_share);
    }

    let resolved: HashMap<String, ResolvedPlace> = read_resolved(&args.resolved)
        .context("Failed to read resolved table")?
        .into_iter()
        .map(|p| (p.place.trim().to_string(), p))
        .collect();
    info!("Loaded {} resolved places", resolved.len());

    let posts = read_posts(&args.posts).context("Failed to read posts")?;
    let mut counter = PostCounter::new();
    let mut missing = 0usize;
    for post in &posts {
        match resolved.get(post.place.trim()) {
            Some(place) => counter.add(&post.user_id, post.month, place, post.count),
            None => {
                missing += 1;
                let unresolved = ResolvedPlace::unresolved(post.place.clone());
                counter.add(&post.user_id, post.month, &unresolved, post.count);
            }
        }
    }
    if missing > 0 {
        warn!(
            "{} posts name places absent from {}; run `resolve` on the posts first",
            missing,
            args.resolved.display()
        );
    }
    info!(
        "{} posts read, {} without a district-level locality",
        posts.len(),
        counter.dropped()
    );

    let mut homes = UserHomeLocator::new(home_share).locate_all(counter);
    if let Some(tiers) = &tiers {
        roll_up(&mut homes, tiers, args.level);
        info!("Homes rolled up to {}", args.level);
    }
    write_homes(&args.homes, &homes)?;
    info!("Wrote homes for {} months to {}", homes.len(), args.homes.display());

    let flows = MigrationFlowComputer::series(&homes)?;
    write_flows(&args.flows, &flows)?;
    info!("Wrote {} flow rows to {}", flows.len(), args.flows.display());

    if let Some(path) = &args.net {
        let net = net_migration(&flows);
        write_net(path, &net)?;
        info!("Wrote net migration for {} localities to {}", net.len(), path.display());
    }

    Ok(())
}
