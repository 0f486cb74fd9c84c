//! modsort - sort model files into per-type folders.
//!
//! Thin driver over `modsort-core`: builds a `SortConfig` from a config file
//! and flags, starts a run, logs its progress events and prints a summary.

mod report;

use anyhow::{Context, Result};
use clap::Parser;
use modsort_core::{CachePersistence, LookupMode, Orchestrator, SortConfig};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "modsort")]
#[command(about = "Sort model files into Checkpoint/LORA/VAE/... folders")]
struct Args {
    /// Directory containing the model files
    source: PathBuf,

    /// Root for the type folders (defaults to the source directory)
    #[arg(long)]
    dest: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API key (falls back to CIVITAI_API_KEY, then the config directory)
    #[arg(long)]
    api_key: Option<String>,

    /// Cache log location
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Delete the cache log when the run ends
    #[arg(long)]
    ephemeral_cache: bool,

    /// Look files up by name instead of by content hash
    #[arg(long)]
    by_name: bool,

    /// Attempts per lookup, including the first
    #[arg(long)]
    retries: Option<u32>,

    /// Minimum milliseconds between remote requests
    #[arg(long)]
    request_interval_ms: Option<u64>,

    /// Create every type folder before moving anything
    #[arg(long)]
    precreate_folders: bool,

    /// Skip the API key check before the first lookup
    #[arg(long)]
    no_verify: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    /// Configuration file (or defaults) with command-line overrides applied.
    fn to_config(&self) -> Result<SortConfig> {
        let mut config = match &self.config {
            Some(path) => SortConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SortConfig::default(),
        };

        if let Some(ref key) = self.api_key {
            config.api_key = Some(key.clone());
        }
        if let Some(ref dest) = self.dest {
            config.destination_root = Some(dest.clone());
        }
        if let Some(ref cache) = self.cache {
            config.cache_path = Some(cache.clone());
        }
        if self.ephemeral_cache {
            config.cache_persistence = CachePersistence::Ephemeral;
        }
        if self.by_name {
            config.lookup_mode = LookupMode::ByName;
        }
        if let Some(retries) = self.retries {
            config.retry.max_attempts = retries.max(1);
        }
        if let Some(interval) = self.request_interval_ms {
            config.request_interval_ms = interval;
        }
        if self.precreate_folders {
            config.precreate_folders = true;
        }
        if self.no_verify {
            config.verify_credentials = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = args.to_config()?;
    info!("Sorting {}", args.source.display());

    let orchestrator = Orchestrator::from_config(config)?;
    let mut handle = orchestrator.start(&args.source);

    let events = handle.events().context("progress events already taken")?;
    let printer = tokio::spawn(report::log_events(events));

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current file");
            cancel.cancel();
        }
    });

    let result = handle.wait().await;
    // The channel closes once the run task drops its sink.
    let _ = printer.await;

    let run = result.context("Run failed")?;
    report::print_summary(&run);
    Ok(())
}
