use std::time::Duration;

use clap::Parser;
use mediacache_engine::{CacheConfig, MediaCache};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod cli;
mod commands;
mod error;
mod utils;

use cli::{Args, Commands};
use commands::CommandExecutor;
use error::AppError;
use utils::{parse_rewrite, parse_size};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = Args::parse();

    // Setup logging: results go to stdout, logs to stderr and the log file
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("mediacache.log")?;

    let multi_writer = MakeWriterExt::and(std::io::stderr, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    // Max size in bytes
    let max_total_bytes = parse_size(&args.max_size)?;

    let mut builder = CacheConfig::builder(&args.cache_dir)
        .with_max_total_bytes(max_total_bytes)
        .with_timeout(Duration::from_secs(args.timeout));
    for raw in &args.rewrite_hosts {
        let (from, to) = parse_rewrite(raw)?;
        builder = builder.with_host_rewrite(from, to);
    }
    let config = builder.build();

    info!(
        cache_dir = ?args.cache_dir,
        max_total_bytes,
        timeout_s = args.timeout,
        "starting media cache"
    );

    let cache = MediaCache::new(config).await?;
    let executor = CommandExecutor::new(cache);

    match args.command {
        Commands::Fetch { url, kind } => executor.fetch(&url, kind).await?,
        Commands::Prefetch { urls, kind, input } => {
            executor.prefetch(&urls, input.as_deref(), kind).await?
        }
        Commands::Stats { json } => executor.stats(json).await?,
        Commands::Sweep {
            prune,
            max_age_only,
            size_only,
        } => executor.sweep(prune, max_age_only, size_only).await?,
        Commands::Clear { yes } => executor.clear(yes).await?,
    }

    Ok(())
}
