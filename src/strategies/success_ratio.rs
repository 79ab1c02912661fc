use crate::events::{LogEvent, Snapshot};
use crate::strategies::Strategy;
use std::collections::HashMap;

/// Per-service success and total counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceCounts {
    pub success_count: u64,
    pub total_count: u64,
}

impl ServiceCounts {
    pub fn ratio(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_count as f64
        }
    }
}

/// Running ratio of successful requests for a tracked service
///
/// Counts are kept for every service; the emitted value is the ratio of the
/// tracked one. The timestamp range covers all services.
#[derive(Debug)]
pub struct SuccessRatio {
    /// Service whose ratio is emitted
    service: String,
    counts: HashMap<String, ServiceCounts>,
    /// Highest timestamp seen, 0 before any
    newest_ts: f64,
    /// Lowest non-zero timestamp seen
    oldest_ts: Option<f64>,
}

impl SuccessRatio {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            counts: HashMap::new(),
            newest_ts: 0.0,
            oldest_ts: None,
        }
    }

    /// Success ratio of any service, 0.0 when it has no events
    pub fn ratio_for(&self, service: &str) -> f64 {
        self.counts
            .get(service)
            .map(ServiceCounts::ratio)
            .unwrap_or(0.0)
    }

    pub fn counts_for(&self, service: &str) -> Option<ServiceCounts> {
        self.counts.get(service).copied()
    }
}

impl Strategy for SuccessRatio {
    fn fold(&mut self, event: &LogEvent) -> Option<Snapshot> {
        let counts = self.counts.entry(event.service.clone()).or_default();
        counts.total_count += 1;
        if event.is_success() {
            counts.success_count += 1;
        }

        if let Some(ts) = event.timestamp {
            self.newest_ts = self.newest_ts.max(ts);
            self.oldest_ts = Some(self.oldest_ts.map_or(ts, |oldest| oldest.min(ts)));
        }

        None
    }

    fn emit(&mut self) -> Option<Snapshot> {
        // Before any timestamp the range collapses onto the newest value
        let oldest = self.oldest_ts.unwrap_or(self.newest_ts);
        Some(Snapshot::from_seconds(
            self.ratio_for(&self.service),
            self.newest_ts,
            oldest,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: f64 = 1_700_000_000.0;

    fn event(service: &str, offset: f64, code: u16) -> LogEvent {
        LogEvent::new(
            service,
            Some(BASE + offset),
            format!("HTTP Status Code: {}", code),
        )
    }

    #[test]
    fn test_scenario_two_batches() {
        let mut strategy = SuccessRatio::new("monitoring");

        strategy.fold(&event("monitoring", 48.0, 200));
        strategy.fold(&event("monitoring", 96.0, 500));
        let first = strategy.emit().unwrap();
        assert_eq!(first, Snapshot::from_seconds(0.5, BASE + 96.0, BASE + 48.0));

        strategy.fold(&event("monitoring", 144.0, 200));
        let second = strategy.emit().unwrap();
        assert_eq!(second.value, 2.0 / 3.0);
        assert_eq!(second.newest_considered.timestamp(), (BASE + 144.0) as i64);
        assert_eq!(second.oldest_considered.timestamp(), (BASE + 48.0) as i64);
    }

    #[test]
    fn test_unknown_service_is_zero() {
        let mut strategy = SuccessRatio::new("monitoring");
        strategy.fold(&event("training", 1.0, 200));
        assert_eq!(strategy.emit().unwrap().value, 0.0);
        assert_eq!(strategy.ratio_for("training"), 1.0);
    }

    #[test]
    fn test_emit_is_idempotent() {
        let mut strategy = SuccessRatio::new("monitoring");
        strategy.fold(&event("monitoring", 5.0, 200));
        strategy.fold(&event("monitoring", 6.0, 404));
        assert_eq!(strategy.emit(), strategy.emit());
    }

    #[test]
    fn test_timestamp_extrema_span_all_services() {
        let mut strategy = SuccessRatio::new("monitoring");
        strategy.fold(&event("monitoring", 50.0, 200));
        strategy.fold(&event("inference", 10.0, 200));
        strategy.fold(&event("training", 90.0, 200));
        strategy.fold(&LogEvent::new("monitoring", None, "HTTP Status Code: 200"));

        let snapshot = strategy.emit().unwrap();
        assert_eq!(snapshot, Snapshot::from_seconds(1.0, BASE + 90.0, BASE + 10.0));
        assert!(snapshot.newest_considered >= snapshot.oldest_considered);
    }

    #[test]
    fn test_out_of_range_timestamp_does_not_move_extrema() {
        let mut strategy = SuccessRatio::new("monitoring");
        strategy.fold(&LogEvent::new("monitoring", Some(1e15), "HTTP Status Code: 200"));
        strategy.fold(&event("monitoring", 30.0, 500));

        let snapshot = strategy.emit().unwrap();
        assert_eq!(snapshot, Snapshot::from_seconds(0.5, BASE + 30.0, BASE + 30.0));
    }

    #[test]
    fn test_counts_for_service() {
        let mut strategy = SuccessRatio::new("monitoring");
        strategy.fold(&event("monitoring", 1.0, 200));
        strategy.fold(&event("monitoring", 2.0, 503));
        assert_eq!(
            strategy.counts_for("monitoring"),
            Some(ServiceCounts {
                success_count: 1,
                total_count: 2
            })
        );
        assert_eq!(strategy.counts_for("evaluation"), None);
    }
}
