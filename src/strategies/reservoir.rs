//! Reservoir sampling over an unbounded stream
//!
//! [`Reservoir`] keeps a uniform random sample of fixed capacity: after `n`
//! offered items each of them is retained with probability `capacity / n`.
//! [`StatusMode`] applies it to HTTP status codes and reports the most
//! frequent code in the sample after every qualifying event.

use crate::error::StrategyError;
use crate::events::{LogEvent, Snapshot, Timestamp};
use crate::strategies::Strategy;
use chrono::Utc;
use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::hash::Hash;

/// Default reservoir capacity
pub const DEFAULT_CAPACITY: usize = 1000;

/// Fixed-capacity uniform sample of a stream
#[derive(Debug, Clone)]
pub struct Reservoir<T> {
    capacity: usize,
    items: Vec<T>,
    /// Number of items offered so far
    total_seen: u64,
    rng: ChaCha8Rng,
}

impl<T> Reservoir<T> {
    /// Create a reservoir with a reproducible random sequence
    ///
    /// # Errors
    ///
    /// Returns `StrategyError::InvalidParameter` when `capacity` is zero.
    pub fn with_seed(capacity: usize, seed: u64) -> Result<Self, StrategyError> {
        Self::with_rng(capacity, ChaCha8Rng::seed_from_u64(seed))
    }

    /// Create a reservoir seeded from the operating system
    ///
    /// # Errors
    ///
    /// Returns `StrategyError::RandomSource` when the OS cannot provide a
    /// seed, and `StrategyError::InvalidParameter` when `capacity` is zero.
    pub fn from_os_rng(capacity: usize) -> Result<Self, StrategyError> {
        let rng = ChaCha8Rng::try_from_os_rng()
            .map_err(|e| StrategyError::RandomSource(e.to_string()))?;
        Self::with_rng(capacity, rng)
    }

    fn with_rng(capacity: usize, rng: ChaCha8Rng) -> Result<Self, StrategyError> {
        if capacity == 0 {
            return Err(StrategyError::InvalidParameter(
                "reservoir capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            capacity,
            items: Vec::with_capacity(capacity),
            total_seen: 0,
            rng,
        })
    }

    /// Offer the next stream item; returns whether it entered the sample
    pub fn offer(&mut self, item: T) -> bool {
        self.total_seen += 1;

        if self.items.len() < self.capacity {
            self.items.push(item);
            return true;
        }

        let slot = self.rng.random_range(0..self.total_seen);
        if slot < self.capacity as u64 {
            self.items[slot as usize] = item;
            true
        } else {
            false
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn total_seen(&self) -> u64 {
        self.total_seen
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Copy + Eq + Hash> Reservoir<T> {
    /// Most frequent item in the sample
    ///
    /// Ties go to the value that occurs first in the sample.
    pub fn mode(&self) -> Option<T> {
        let mut counts: Vec<(T, usize)> = Vec::new();
        let mut positions: HashMap<T, usize> = HashMap::new();

        for item in &self.items {
            match positions.get(item) {
                Some(&pos) => counts[pos].1 += 1,
                None => {
                    positions.insert(*item, counts.len());
                    counts.push((*item, 1));
                }
            }
        }

        let mut best: Option<(T, usize)> = None;
        for (item, count) in counts {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((item, count));
            }
        }
        best.map(|(item, _)| item)
    }
}

/// Mode of HTTP status codes estimated from a reservoir sample
///
/// Emits once per event that carries a status code. `oldest_considered` is
/// the strategy's start time, not an event time, so replaying historical
/// events yields snapshots whose newest time precedes their oldest.
#[derive(Debug)]
pub struct StatusMode {
    reservoir: Reservoir<u16>,
    /// Captured at construction; reported as the oldest considered time
    started_at: Timestamp,
}

impl StatusMode {
    pub fn new(reservoir: Reservoir<u16>) -> Self {
        Self {
            reservoir,
            started_at: Utc::now(),
        }
    }

    pub fn reservoir(&self) -> &Reservoir<u16> {
        &self.reservoir
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }
}

impl Strategy for StatusMode {
    fn fold(&mut self, event: &LogEvent) -> Option<Snapshot> {
        let Some(code) = event.status_code() else {
            debug!("No status code in {:?}, not sampled", event.message);
            return None;
        };

        self.reservoir.offer(code);
        let mode = self.reservoir.mode()?;

        Some(Snapshot::new(
            f64::from(mode),
            event.timestamp_or_now(),
            self.started_at,
        ))
    }

    fn emit(&mut self) -> Option<Snapshot> {
        None
    }
}
