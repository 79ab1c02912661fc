use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::{error, info, warn};
use logpulse::config::Config;
use logpulse::driver::StreamDriver;
use logpulse::error::ConfigError;
use logpulse::events::Snapshot;
use logpulse::strategies::StrategyKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Command-line arguments for the log stream aggregator
#[derive(Parser)]
#[command(
    name = "logpulse",
    about = "Streaming log aggregator - live metrics over a directory of JSON log batches",
    long_about = "Polls a directory for newly arrived JSON log artifacts, folds their events \
                  through one aggregation strategy, and prints the latest metric snapshot \
                  on every refresh tick."
)]
struct Cli {
    /// Directory receiving log artifacts
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Aggregation strategy to run
    #[arg(
        short,
        long,
        default_value = "success-ratio",
        help = "Strategy: success-ratio, failure-window, status-mode or anomaly"
    )]
    strategy: StrategyKind,

    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Display refresh interval
    #[arg(long, value_name = "MS", default_value_t = 300)]
    refresh_ms: u64,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if self.source.exists() && !self.source.is_dir() {
            return Err(format!(
                "Source path is not a directory: {}",
                self.source.display()
            ));
        }

        if self.refresh_ms == 0 {
            return Err("Refresh interval must be greater than 0".to_string());
        }

        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in load_config
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        Ok(())
    }

    fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

/// Load configuration from file or use defaults
///
/// A missing or invalid file is reported and replaced by the defaults.
fn load_config(config_path: Option<&Path>) -> Config {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            match Config::from_file(path) {
                Ok(config) => config,
                Err(ConfigError::ReadError(_)) => {
                    warn!(
                        "Configuration file '{}' not found or unreadable, using defaults",
                        path.display()
                    );
                    Config::default()
                }
                Err(e) => {
                    error!("Configuration error in '{}': {}", path.display(), e);
                    warn!("Using default configuration due to invalid config file");
                    Config::default()
                }
            }
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    }
}

/// Field/value table for the latest snapshot
fn render(kind: StrategyKind, latest: Option<&(Snapshot, DateTime<Utc>)>) -> String {
    match latest {
        Some((snapshot, received_at)) => format!(
            "{:<18} {}\n{:<18} {:.4}\n{:<18} {}\n{:<18} {}\n{:<18} {}\n",
            "Strategy",
            kind,
            "Value",
            snapshot.value,
            "Newest Considered",
            snapshot.newest_considered.format(TIME_FORMAT),
            "Oldest Considered",
            snapshot.oldest_considered.format(TIME_FORMAT),
            "Last updated",
            received_at.format(TIME_FORMAT),
        ),
        None => format!("{:<18} {}\n{:<18} waiting for data\n", "Strategy", kind, "Value"),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    cli.validate().map_err(|e| anyhow!("Invalid arguments: {}", e))?;

    let config = load_config(cli.config.as_deref());
    let strategy = cli
        .strategy
        .build(&config)
        .with_context(|| format!("Failed to build strategy '{}'", cli.strategy))?;

    let driver = StreamDriver::from_config(&cli.source, strategy, &config.driver);
    let running = driver.shutdown_flag();

    let signal_flag = running.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        signal_flag.store(false, Ordering::SeqCst);
    })
    .context("Error setting SIGINT handler for graceful shutdown")?;

    let (sender, receiver) = mpsc::channel();
    let handle = driver.spawn(sender);

    info!(
        "Aggregating {} with strategy '{}'. Press Ctrl+C to stop.",
        cli.source.display(),
        cli.strategy
    );

    let mut latest: Option<(Snapshot, DateTime<Utc>)> = None;
    loop {
        thread::sleep(cli.refresh_interval());

        if let Some(snapshot) = receiver.try_iter().last() {
            latest = Some((snapshot, Utc::now()));
        }
        println!("{}", render(cli.strategy, latest.as_ref()));

        if !running.load(Ordering::SeqCst) || handle.is_finished() {
            break;
        }
    }

    // A bounded run may finish between the last drain and the exit check
    if let Some(snapshot) = receiver.try_iter().last() {
        latest = Some((snapshot, Utc::now()));
        println!("{}", render(cli.strategy, latest.as_ref()));
    }

    match handle.stop() {
        Some(stats) => info!(
            "Stopped after {} artifacts ({} skipped), {} events, {} snapshots",
            stats.artifacts_processed,
            stats.artifacts_skipped,
            stats.events_folded,
            stats.snapshots_emitted
        ),
        None => warn!("Stream driver did not report statistics"),
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting logpulse");

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("logpulse shutdown complete");
}
