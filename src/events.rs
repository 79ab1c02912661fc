//! Core event types shared by every aggregation strategy
//!
//! This module defines the minimal log event schema parsed out of input
//! artifacts, the uniform [`Snapshot`] record emitted by strategies, and the
//! message classification helpers (success marker, HTTP status extraction).

use crate::error::FieldError;
use chrono::{DateTime, Utc};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Literal marker identifying a successful request in a log message
pub const SUCCESS_MARKER: &str = "HTTP Status Code: 200";

static STATUS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"HTTP Status Code:\s*(\d{3})").expect("status pattern is a valid regex")
});

/// A single log event read from an artifact
///
/// Every field is optional in the input; extraction is best-effort and
/// missing values fall back to defaults instead of rejecting the event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogEvent {
    /// Name of the emitting service, empty when absent
    pub service: String,
    /// Seconds since the Unix epoch; `None` when absent or zero
    pub timestamp: Option<f64>,
    /// Free-form message, empty when absent
    pub message: String,
}

impl LogEvent {
    pub fn new(service: impl Into<String>, timestamp: Option<f64>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            timestamp: timestamp.filter(|ts| is_usable_timestamp(*ts)),
            message: message.into(),
        }
    }

    /// Build an event from a decoded JSON value
    ///
    /// Returns `None` when the value is not a JSON object. Malformed
    /// individual fields are logged and defaulted.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        let service = string_field(object, "service").unwrap_or_else(|e| {
            debug!("Defaulting service: {}", e);
            String::new()
        });
        let timestamp = timestamp_field(object).unwrap_or_else(|e| {
            debug!("Defaulting timestamp: {}", e);
            None
        });
        let message = string_field(object, "message").unwrap_or_else(|e| {
            debug!("Defaulting message: {}", e);
            String::new()
        });

        Some(Self {
            service,
            timestamp,
            message,
        })
    }

    /// Whether the message carries the success marker
    pub fn is_success(&self) -> bool {
        self.message.contains(SUCCESS_MARKER)
    }

    /// HTTP status code mentioned in the message, if any
    pub fn status_code(&self) -> Option<u16> {
        extract_status_code(&self.message)
    }

    /// The event timestamp, or the current wall-clock time when it has none
    pub fn timestamp_or_now(&self) -> Timestamp {
        self.timestamp.map(seconds_to_timestamp).unwrap_or_else(Utc::now)
    }
}

/// Extract the three-digit code following `HTTP Status Code:` in a message
pub fn extract_status_code(message: &str) -> Option<u16> {
    STATUS_PATTERN
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn timestamp_from_seconds(seconds: f64) -> Option<Timestamp> {
    if !seconds.is_finite() {
        return None;
    }
    // Saturating cast; chrono rejects anything beyond its year range
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
}

/// Whether epoch seconds are non-zero and representable as a UTC timestamp
pub fn is_usable_timestamp(seconds: f64) -> bool {
    seconds != 0.0 && timestamp_from_seconds(seconds).is_some()
}

/// Convert fractional epoch seconds into a UTC timestamp (microsecond precision)
///
/// Values outside the representable range map to the epoch; event parsing
/// already drops them via [`is_usable_timestamp`].
pub fn seconds_to_timestamp(seconds: f64) -> Timestamp {
    timestamp_from_seconds(seconds).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Uniform result record produced by every strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// The statistic itself (ratio, count, status code)
    pub value: f64,
    /// Newest event time taken into account
    pub newest_considered: Timestamp,
    /// Oldest event time (or window start) taken into account
    pub oldest_considered: Timestamp,
}

impl Snapshot {
    pub fn new(value: f64, newest_considered: Timestamp, oldest_considered: Timestamp) -> Self {
        Self {
            value,
            newest_considered,
            oldest_considered,
        }
    }

    /// Build a snapshot from epoch seconds
    pub fn from_seconds(value: f64, newest: f64, oldest: f64) -> Self {
        Self::new(value, seconds_to_timestamp(newest), seconds_to_timestamp(oldest))
    }
}

fn string_field(object: &Map<String, Value>, field: &'static str) -> Result<String, FieldError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(FieldError::Missing(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(FieldError::WrongType {
            field,
            found: value_kind(other).to_string(),
        }),
    }
}

fn timestamp_field(object: &Map<String, Value>) -> Result<Option<f64>, FieldError> {
    let seconds = match object.get("timestamp") {
        None | Some(Value::Null) => return Err(FieldError::Missing("timestamp")),
        Some(Value::Number(n)) => n.as_f64(),
        // Some producers quote numbers
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(other) => {
            return Err(FieldError::WrongType {
                field: "timestamp",
                found: value_kind(other).to_string(),
            })
        }
    };

    match seconds {
        Some(ts) if is_usable_timestamp(ts) => Ok(Some(ts)),
        Some(_) => Ok(None),
        None => Err(FieldError::WrongType {
            field: "timestamp",
            found: "non-numeric string".to_string(),
        }),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
