//! Online aggregation strategies
//!
//! Every strategy folds events one at a time into its own state and exposes
//! the current statistic as a [`Snapshot`]. Batch-oriented strategies emit
//! from [`Strategy::emit`] once the driver has folded a whole batch;
//! event-oriented strategies emit straight out of [`Strategy::fold`].

/// Running success ratio per service
pub mod success_ratio;

/// Event-time sliding window of failures
pub mod failure_window;

/// Reservoir sampling of status codes for mode estimation
pub mod reservoir;

/// Bloom-filter gated anomaly detection
pub mod bloom;

pub use bloom::{AnomalyDetector, BloomFilter};
pub use failure_window::FailureWindow;
pub use reservoir::{Reservoir, StatusMode};
pub use success_ratio::SuccessRatio;

use crate::config::Config;
use crate::error::StrategyError;
use crate::events::{LogEvent, Snapshot};
use std::fmt;
use std::str::FromStr;

/// Capability shared by all aggregation strategies
///
/// A strategy instance is owned by a single driver; fold and emit are never
/// called concurrently.
#[cfg_attr(test, mockall::automock)]
pub trait Strategy: Send {
    /// Fold one event into the running state
    ///
    /// Event-oriented strategies return a snapshot for every qualifying event.
    fn fold(&mut self, event: &LogEvent) -> Option<Snapshot>;

    /// Produce a snapshot after a batch has been folded
    ///
    /// Event-oriented strategies return `None`.
    fn emit(&mut self) -> Option<Snapshot>;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn fold(&mut self, event: &LogEvent) -> Option<Snapshot> {
        (**self).fold(event)
    }

    fn emit(&mut self) -> Option<Snapshot> {
        (**self).emit()
    }
}

/// Selector for the available strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    SuccessRatio,
    FailureWindow,
    StatusMode,
    Anomaly,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::SuccessRatio,
        StrategyKind::FailureWindow,
        StrategyKind::StatusMode,
        StrategyKind::Anomaly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::SuccessRatio => "success-ratio",
            StrategyKind::FailureWindow => "failure-window",
            StrategyKind::StatusMode => "status-mode",
            StrategyKind::Anomaly => "anomaly",
        }
    }

    /// Construct the strategy from configuration
    ///
    /// # Errors
    ///
    /// Returns `StrategyError` when a parameter is invalid or, for the
    /// reservoir without a fixed seed, when the OS random source fails.
    pub fn build(&self, config: &Config) -> Result<Box<dyn Strategy>, StrategyError> {
        let strategy: Box<dyn Strategy> = match self {
            StrategyKind::SuccessRatio => {
                Box::new(SuccessRatio::new(config.success_ratio.service.clone()))
            }
            StrategyKind::FailureWindow => Box::new(FailureWindow::new(
                config.failure_window.service.clone(),
                config.failure_window.window_seconds,
            )?),
            StrategyKind::StatusMode => {
                let reservoir = match config.reservoir.seed {
                    Some(seed) => Reservoir::with_seed(config.reservoir.capacity, seed)?,
                    None => Reservoir::from_os_rng(config.reservoir.capacity)?,
                };
                Box::new(StatusMode::new(reservoir))
            }
            StrategyKind::Anomaly => {
                let mut filter = BloomFilter::new(config.bloom.size, config.bloom.hash_count)?;
                match &config.bloom.signatures {
                    Some(signatures) => filter.extend(signatures.iter().map(String::as_str)),
                    None => filter.extend(bloom::DEFAULT_SIGNATURES.iter().copied()),
                }
                Box::new(AnomalyDetector::new(filter))
            }
        };
        Ok(strategy)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "success-ratio" | "task_1" => Ok(StrategyKind::SuccessRatio),
            "failure-window" | "task_2" => Ok(StrategyKind::FailureWindow),
            "status-mode" | "task_3" => Ok(StrategyKind::StatusMode),
            "anomaly" | "task_4" => Ok(StrategyKind::Anomaly),
            other => Err(format!(
                "unknown strategy '{}', expected one of: {}",
                other,
                StrategyKind::ALL.map(|k| k.name()).join(", ")
            )),
        }
    }
}
