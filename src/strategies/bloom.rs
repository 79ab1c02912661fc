//! Approximate-membership anomaly detection
//!
//! A [`BloomFilter`] is seeded with known error signatures. The
//! [`AnomalyDetector`] flags an event when the filter recognizes its message,
//! a delimited segment of it, or any run of words as long as the longest
//! seeded phrase. It also flags messages carrying an HTTP 4xx/5xx status; that
//! check is exact and covers codes that were never seeded.

use crate::error::StrategyError;
use crate::events::{LogEvent, Snapshot};
use crate::strategies::Strategy;
use bit_set::BitSet;
use log::{debug, info};
use sha2::{Digest, Sha256};

/// Default filter size in bits
pub const DEFAULT_SIZE: usize = 100_000;

/// Default number of hash rounds
pub const DEFAULT_HASH_COUNT: u32 = 5;

/// Known error signatures loaded into the default detector
pub const DEFAULT_SIGNATURES: [&str; 13] = [
    "HTTP Status Code: 400",
    "HTTP Status Code: 401",
    "HTTP Status Code: 403",
    "HTTP Status Code: 404",
    "HTTP Status Code: 408",
    "HTTP Status Code: 429",
    "HTTP Status Code: 500",
    "HTTP Status Code: 502",
    "HTTP Status Code: 503",
    "HTTP Status Code: 504",
    "Database Error",
    "Connection refused",
    "Timeout Error",
];

const SEGMENT_DELIMITERS: [char; 4] = [':', ';', '|', ','];

/// Fixed-size Bloom filter with SHA-256 derived indices
///
/// No false negatives for inserted items; false positives are possible.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: BitSet,
    size: usize,
    hash_count: u32,
    /// Number of insert calls, for the false positive estimate
    inserted: usize,
    /// Word count of the longest inserted item
    longest_phrase: usize,
}

impl BloomFilter {
    /// Create an empty filter with `size` bits and `hash_count` rounds
    ///
    /// # Errors
    ///
    /// Returns `StrategyError::InvalidParameter` when either value is zero.
    pub fn new(size: usize, hash_count: u32) -> Result<Self, StrategyError> {
        if size == 0 || hash_count == 0 {
            return Err(StrategyError::InvalidParameter(format!(
                "bloom filter needs a positive size and hash count, got {} bits and {} rounds",
                size, hash_count
            )));
        }

        Ok(Self {
            bits: BitSet::with_capacity(size),
            size,
            hash_count,
            inserted: 0,
            longest_phrase: 0,
        })
    }

    /// Size a filter for `expected_items` at the target false positive rate
    ///
    /// # Errors
    ///
    /// Returns `StrategyError::InvalidParameter` when the rate is not in
    /// `(0, 1)` or no items are expected.
    pub fn with_false_positive_rate(
        expected_items: usize,
        rate: f64,
    ) -> Result<Self, StrategyError> {
        if expected_items == 0 || !(rate > 0.0 && rate < 1.0) {
            return Err(StrategyError::InvalidParameter(format!(
                "cannot size a filter for {} items at rate {}",
                expected_items, rate
            )));
        }

        let n = expected_items as f64;
        let ln2 = std::f64::consts::LN_2;
        let size = (-n * rate.ln() / (ln2 * ln2)).ceil() as usize;
        let hash_count = ((size as f64 / n) * ln2).round().max(1.0) as u32;
        Self::new(size, hash_count)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    pub fn len(&self) -> usize {
        self.inserted
    }

    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    /// Word count of the longest inserted item
    pub fn longest_phrase(&self) -> usize {
        self.longest_phrase
    }

    /// Bit indices for an item: SHA-256 of the item followed by the round
    /// number, read as a big-endian integer modulo the filter size
    fn indices<'a>(&'a self, item: &'a str) -> impl Iterator<Item = usize> + 'a {
        (0..self.hash_count).map(move |round| {
            let mut hasher = Sha256::new();
            hasher.update(item.as_bytes());
            hasher.update(round.to_string().as_bytes());
            let digest = hasher.finalize();

            let modulus = self.size as u128;
            digest
                .iter()
                .fold(0u128, |acc, &byte| (acc * 256 + u128::from(byte)) % modulus) as usize
        })
    }

    pub fn insert(&mut self, item: &str) {
        let indices: Vec<usize> = self.indices(item).collect();
        for index in indices {
            self.bits.insert(index);
        }
        self.inserted += 1;
        self.longest_phrase = self.longest_phrase.max(item.split_whitespace().count());
    }

    pub fn extend<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) {
        for item in items {
            self.insert(item);
        }
    }

    pub fn contains(&self, item: &str) -> bool {
        self.indices(item).all(|index| self.bits.contains(index))
    }

    /// Expected false positive rate given the number of inserted items
    pub fn estimated_false_positive_rate(&self) -> f64 {
        let k = f64::from(self.hash_count);
        let exponent = -k * self.inserted as f64 / self.size as f64;
        (1.0 - exponent.exp()).powf(k)
    }
}

/// Whether the message carries an HTTP status in the 4xx/5xx range
pub fn is_http_error(message: &str) -> bool {
    crate::events::extract_status_code(message).is_some_and(|code| (400..600).contains(&code))
}

/// Running detection ratio of anomalous events
///
/// Emits only for detected events; a non-matching event produces nothing.
#[derive(Debug)]
pub struct AnomalyDetector {
    filter: BloomFilter,
    total_events: u64,
    detected_events: u64,
}

impl AnomalyDetector {
    pub fn new(filter: BloomFilter) -> Self {
        info!(
            "Anomaly detector loaded with {} signatures ({} bits, {} rounds, estimated false positive rate {:.2e})",
            filter.len(),
            filter.size(),
            filter.hash_count(),
            filter.estimated_false_positive_rate()
        );

        Self {
            filter,
            total_events: 0,
            detected_events: 0,
        }
    }

    /// Detector over the default signature vocabulary and filter size
    pub fn with_defaults() -> Self {
        let mut filter = BloomFilter {
            bits: BitSet::with_capacity(DEFAULT_SIZE),
            size: DEFAULT_SIZE,
            hash_count: DEFAULT_HASH_COUNT,
            inserted: 0,
            longest_phrase: 0,
        };
        filter.extend(DEFAULT_SIGNATURES);
        Self::new(filter)
    }

    /// Whether a message looks anomalous
    pub fn test(&self, message: &str) -> bool {
        let trimmed = message.trim();
        let known = self.filter.contains(trimmed)
            || trimmed
                .split(SEGMENT_DELIMITERS)
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .any(|segment| self.filter.contains(segment))
            || self.contains_phrase(trimmed);

        known || is_http_error(message)
    }

    /// Probe every run of up to `longest_phrase` words, with punctuation
    /// stripped from the ends of the run
    fn contains_phrase(&self, message: &str) -> bool {
        let words: Vec<&str> = message.split_whitespace().collect();
        let longest = self.filter.longest_phrase().min(words.len());

        (1..=longest).any(|n| {
            words.windows(n).any(|run| {
                let phrase = run.join(" ");
                let phrase = phrase.trim_matches(|c: char| c.is_ascii_punctuation());
                !phrase.is_empty() && self.filter.contains(phrase)
            })
        })
    }

    /// `(total_events, detected_events)`
    pub fn totals(&self) -> (u64, u64) {
        (self.total_events, self.detected_events)
    }

    pub fn detection_ratio(&self) -> f64 {
        if self.total_events == 0 {
            0.0
        } else {
            self.detected_events as f64 / self.total_events as f64
        }
    }
}

impl Strategy for AnomalyDetector {
    fn fold(&mut self, event: &LogEvent) -> Option<Snapshot> {
        self.total_events += 1;

        if !self.test(&event.message) {
            return None;
        }

        self.detected_events += 1;
        debug!(
            "Detected #{} ({}): {}",
            self.detected_events, event.service, event.message
        );

        let at = event.timestamp_or_now();
        Some(Snapshot::new(self.detection_ratio(), at, at))
    }

    fn emit(&mut self) -> Option<Snapshot> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inserted_items_are_members() {
        let mut filter = BloomFilter::new(1_000, 3).unwrap();
        filter.insert("Database Error");
        assert!(filter.contains("Database Error"));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let filter = BloomFilter::new(1_000, 3).unwrap();
        assert!(filter.is_empty());
        assert!(!filter.contains("anything"));
        assert_eq!(filter.estimated_false_positive_rate(), 0.0);
    }

    #[test]
    fn test_indices_are_deterministic_and_in_range() {
        let filter = BloomFilter::new(97, 5).unwrap();
        let first: Vec<usize> = filter.indices("Timeout Error").collect();
        let second: Vec<usize> = filter.indices("Timeout Error").collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
        assert!(first.iter().all(|&i| i < 97));
    }

    #[test]
    fn test_rejects_degenerate_parameters() {
        assert!(BloomFilter::new(0, 5).is_err());
        assert!(BloomFilter::new(10, 0).is_err());
        assert!(BloomFilter::with_false_positive_rate(100, 1.5).is_err());
        assert!(BloomFilter::with_false_positive_rate(0, 0.01).is_err());
    }

    #[test]
    fn test_sized_for_rate() {
        let filter = BloomFilter::with_false_positive_rate(1_000, 0.01).unwrap();
        // Textbook values: about 9.6 bits per item and 7 rounds
        assert_eq!(filter.size(), 9_586);
        assert_eq!(filter.hash_count(), 7);
    }

    #[test]
    fn test_default_signatures_detected() {
        let detector = AnomalyDetector::with_defaults();
        for signature in DEFAULT_SIGNATURES {
            assert!(detector.test(signature), "missed {}", signature);
        }
    }

    #[test]
    fn test_signature_as_segment_detected() {
        let detector = AnomalyDetector::with_defaults();
        assert!(detector.test("Database Error: replica lag"));
        assert!(detector.test("upstream | Connection refused"));
        assert!(detector.test("  Timeout Error  "));
    }

    #[test]
    fn test_signature_inside_free_text_detected() {
        let detector = AnomalyDetector::with_defaults();
        assert!(detector.test("replica Database Error detected"));
        assert!(detector.test("got Connection refused from db"));
        assert!(detector.test("Timeout Error."));
        assert!(detector.test("worker failed (Timeout Error) twice"));
        assert!(!detector.test("Database connection pool resized"));
    }

    #[test]
    fn test_longest_phrase_tracked() {
        let mut filter = BloomFilter::new(1_000, 3).unwrap();
        assert_eq!(filter.longest_phrase(), 0);
        filter.extend(["Timeout Error", "HTTP Status Code: 500", "panic"]);
        assert_eq!(filter.longest_phrase(), 4);
    }

    #[test]
    fn test_unseeded_error_codes_detected() {
        let filter = BloomFilter::new(1_000, 3).unwrap();
        let detector = AnomalyDetector::new(filter);
        assert!(detector.test("HTTP Status Code: 418"));
        assert!(detector.test("HTTP Status Code: 599"));
        assert!(!detector.test("HTTP Status Code: 600"));
        assert!(!detector.test("HTTP Status Code: 302"));
    }

    #[test]
    fn test_fold_emits_only_on_detection() {
        let mut detector = AnomalyDetector::with_defaults();
        let ts = Some(1_700_000_000.0);
        let events = [
            LogEvent::new("api", ts, "HTTP Status Code: 200"),
            LogEvent::new("auth", ts, "HTTP Status Code: 404"),
            LogEvent::new("monitoring", ts, "HTTP Status Code: 500"),
            LogEvent::new("db", ts, "Database Error"),
            LogEvent::new("auth", ts, "HTTP Status Code: 401"),
            LogEvent::new("frontend", ts, "User login successful"),
        ];

        let snapshots: Vec<Snapshot> = events.iter().filter_map(|e| detector.fold(e)).collect();

        assert_eq!(snapshots.len(), 4);
        assert_eq!(snapshots[0].value, 1.0 / 2.0);
        assert_eq!(snapshots[3].value, 4.0 / 5.0);
        assert!(snapshots.iter().all(|s| (0.0..=1.0).contains(&s.value)));
        assert!(snapshots
            .iter()
            .all(|s| s.newest_considered == s.oldest_considered));
        assert_eq!(detector.totals(), (6, 4));
        assert_eq!(detector.detection_ratio(), 4.0 / 6.0);
        assert!(detector.emit().is_none());
    }
}
