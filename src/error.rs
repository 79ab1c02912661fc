use thiserror::Error;

/// Errors that can occur while discovering or reading input artifacts
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to list source directory: {0}")]
    Discovery(String),

    #[error("Failed to parse artifact {artifact}: {source}")]
    Parse {
        artifact: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported payload in artifact {0}: expected an object or an array")]
    UnsupportedPayload(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised while extracting a single field from an event object
///
/// These never abort a fold: the field is defaulted and the event is kept.
#[derive(Error, Debug, PartialEq)]
pub enum FieldError {
    #[error("Field '{0}' is missing")]
    Missing(&'static str),

    #[error("Field '{field}' has unexpected type {found}")]
    WrongType { field: &'static str, found: String },
}

/// Errors that can occur while constructing an aggregation strategy
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Random source unavailable: {0}")]
    RandomSource(String),

    #[error("Invalid strategy parameter: {0}")]
    InvalidParameter(String),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
