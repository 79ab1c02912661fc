/// Error types for sources, strategies and configuration
pub mod error;

/// Core event and snapshot types
pub mod events;

/// Artifact discovery and parsing
pub mod source;

/// Aggregation strategies folded over the event stream
pub mod strategies;

/// Polling driver that runs a strategy against a source directory
pub mod driver;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use config::Config;
pub use driver::{DriverHandle, DriverStats, StreamDriver};
pub use error::{ConfigError, FieldError, SourceError, StrategyError};
pub use events::{LogEvent, Snapshot};
pub use strategies::{Strategy, StrategyKind};
