use crate::error::StrategyError;
use crate::events::{LogEvent, Snapshot};
use crate::strategies::Strategy;
use log::debug;
use std::collections::{HashMap, VecDeque};

/// Default window length in seconds
pub const DEFAULT_WINDOW_SECONDS: f64 = 60.0;

/// Event-time sliding window counting failures per service
///
/// The window ends at the highest timestamp observed so far, not at the wall
/// clock, so a long pause between artifacts never shrinks it. Eviction runs on
/// every emission.
#[derive(Debug)]
pub struct FailureWindow {
    /// Service whose failure count is emitted
    service: String,
    /// Window length in seconds
    window_seconds: f64,
    /// Timestamps of retained failures per service
    failures: HashMap<String, VecDeque<f64>>,
    /// Highest timestamp seen, 0 before any
    newest_ts: f64,
}

impl FailureWindow {
    /// Create a window tracking `service` over `window_seconds`
    ///
    /// # Errors
    ///
    /// Returns `StrategyError::InvalidParameter` for a non-positive or
    /// non-finite window length.
    pub fn new(service: impl Into<String>, window_seconds: f64) -> Result<Self, StrategyError> {
        if !(window_seconds.is_finite() && window_seconds > 0.0) {
            return Err(StrategyError::InvalidParameter(format!(
                "window length must be positive, got {}",
                window_seconds
            )));
        }

        Ok(Self {
            service: service.into(),
            window_seconds,
            failures: HashMap::new(),
            newest_ts: 0.0,
        })
    }

    /// Window of the default length over `service`
    pub fn with_defaults(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            window_seconds: DEFAULT_WINDOW_SECONDS,
            failures: HashMap::new(),
            newest_ts: 0.0,
        }
    }

    /// Inclusive lower bound of the current window
    pub fn window_start(&self) -> f64 {
        self.newest_ts - self.window_seconds
    }

    /// Retained failures for any service (as of the last eviction)
    pub fn failures_for(&self, service: &str) -> usize {
        self.failures.get(service).map_or(0, VecDeque::len)
    }

    /// Retained failures across all services (as of the last eviction)
    pub fn total_failures(&self) -> usize {
        self.failures.values().map(VecDeque::len).sum()
    }

    /// Drop every failure older than the window start
    fn evict(&mut self) {
        let cutoff = self.window_start();

        // Events may arrive out of order, so filter the whole sequence
        for timestamps in self.failures.values_mut() {
            timestamps.retain(|&ts| ts >= cutoff);
        }
        self.failures.retain(|_, timestamps| !timestamps.is_empty());
    }
}

impl Strategy for FailureWindow {
    fn fold(&mut self, event: &LogEvent) -> Option<Snapshot> {
        if let Some(ts) = event.timestamp {
            self.newest_ts = self.newest_ts.max(ts);
        }

        if event.is_success() {
            return None;
        }

        match event.timestamp {
            Some(ts) if !event.service.is_empty() => {
                self.failures
                    .entry(event.service.clone())
                    .or_default()
                    .push_back(ts);
            }
            _ => debug!(
                "Not retaining failure without service or timestamp: {:?}",
                event.message
            ),
        }

        None
    }

    fn emit(&mut self) -> Option<Snapshot> {
        self.evict();
        Some(Snapshot::from_seconds(
            self.failures_for(&self.service) as f64,
            self.newest_ts,
            self.window_start(),
        ))
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    /// Timestamp offsets (seconds) with a success flag, in arrival order
    #[derive(Debug, Clone)]
    struct Arrivals(Vec<(u16, bool)>);

    impl Arbitrary for Arrivals {
        fn arbitrary(g: &mut Gen) -> Self {
            let size = usize::arbitrary(g) % 80 + 1;
            Arrivals(
                (0..size)
                    .map(|_| (u16::arbitrary(g) % 600, bool::arbitrary(g)))
                    .collect(),
            )
        }
    }

    // After eviction every retained failure lies inside the window, and every
    // failure inside the window is counted
    #[quickcheck]
    fn prop_retained_failures_are_inside_window(arrivals: Arrivals) -> bool {
        let base = 1_700_000_000.0;
        let mut window = FailureWindow::with_defaults("monitoring");

        for &(offset, success) in &arrivals.0 {
            let code = if success { 200 } else { 500 };
            window.fold(&LogEvent::new(
                "monitoring",
                Some(base + offset as f64),
                format!("HTTP Status Code: {}", code),
            ));
        }
        let snapshot = window.emit().unwrap();

        let newest = arrivals.0.iter().map(|&(o, _)| base + o as f64).fold(0.0, f64::max);
        let cutoff = newest - DEFAULT_WINDOW_SECONDS;
        let expected = arrivals
            .0
            .iter()
            .filter(|&&(o, success)| !success && base + o as f64 >= cutoff)
            .count();

        let retained_inside = window
            .failures
            .get("monitoring")
            .map_or(true, |ts| ts.iter().all(|&t| t >= cutoff));

        retained_inside && snapshot.value == expected as f64
    }
}
