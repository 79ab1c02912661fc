//! Polling stream driver
//!
//! The [`StreamDriver`] ties a [`FileCursor`], the artifact parser and one
//! [`Strategy`] into an unbounded, lazily produced sequence of snapshots.
//! It can be consumed directly as an [`Iterator`] or moved onto its own
//! thread with [`StreamDriver::spawn`], which forwards snapshots over a
//! channel.

use crate::config::DriverConfig;
use crate::events::Snapshot;
use crate::source::{parse_artifact, FileCursor};
use crate::strategies::Strategy;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default delay between directory polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest single sleep, so shutdown stays responsive
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Counters describing the work done by a driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Artifacts whose events were folded
    pub artifacts_processed: u64,
    /// Artifacts skipped because they could not be read or parsed
    pub artifacts_skipped: u64,
    pub events_folded: u64,
    pub snapshots_emitted: u64,
}

/// Drives one strategy against one source directory
pub struct StreamDriver<S> {
    cursor: FileCursor,
    strategy: S,
    poll_interval: Duration,
    /// Optional bound on artifacts handled before the sequence ends
    max_artifacts: Option<usize>,
    /// Snapshots produced but not yet handed to the consumer
    pending: VecDeque<Snapshot>,
    stats: DriverStats,
    running: Arc<AtomicBool>,
}

impl<S: Strategy> StreamDriver<S> {
    /// Create a driver polling `directory` every second
    pub fn new(directory: impl Into<PathBuf>, strategy: S) -> Self {
        Self {
            cursor: FileCursor::new(directory),
            strategy,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_artifacts: None,
            pending: VecDeque::new(),
            stats: DriverStats::default(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create a driver using the `[driver]` configuration section
    pub fn from_config(directory: impl Into<PathBuf>, strategy: S, config: &DriverConfig) -> Self {
        let driver = Self::new(directory, strategy).with_poll_interval(config.poll_interval());
        match config.max_artifacts {
            Some(max) => driver.with_max_artifacts(max),
            None => driver,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// End the sequence once `max` artifacts have been handled
    pub fn with_max_artifacts(mut self, max: usize) -> Self {
        self.max_artifacts = Some(max);
        self
    }

    /// Flag that stops the driver when cleared
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_exhausted(&self) -> bool {
        self.max_artifacts
            .is_some_and(|max| self.cursor.processed_count() >= max)
    }

    fn queue(&mut self, snapshot: Snapshot) {
        self.stats.snapshots_emitted += 1;
        self.pending.push_back(snapshot);
    }

    /// Run one poll tick and return the number of artifacts handled
    ///
    /// Every new artifact is folded as a unit and then marked processed, even
    /// when it could not be parsed. After a non-empty batch the strategy's
    /// batch-level emission is queued.
    pub fn poll_once(&mut self) -> usize {
        let mut names = self.cursor.discover();
        if let Some(max) = self.max_artifacts {
            names.truncate(max.saturating_sub(self.cursor.processed_count()));
        }
        if names.is_empty() {
            return 0;
        }

        debug!(
            "Discovered {} new artifacts in {}",
            names.len(),
            self.cursor.directory().display()
        );

        let mut handled = 0;
        for name in names {
            // Checked between artifacts only, so an artifact is never half folded
            if !self.is_running() {
                break;
            }

            match parse_artifact(&self.cursor.path_of(&name)) {
                Ok(events) => {
                    for event in &events {
                        if let Some(snapshot) = self.strategy.fold(event) {
                            self.queue(snapshot);
                        }
                    }
                    self.stats.events_folded += events.len() as u64;
                    self.stats.artifacts_processed += 1;
                    debug!("Folded {} events from {}", events.len(), name);
                }
                Err(e) => {
                    warn!("Skipping artifact {}: {}", name, e);
                    self.stats.artifacts_skipped += 1;
                }
            }

            self.cursor.mark_processed(name);
            handled += 1;
        }

        if handled > 0 {
            if let Some(snapshot) = self.strategy.emit() {
                self.queue(snapshot);
            }
            info!(
                "Batch of {} artifacts: processed={} skipped={} events={} snapshots={}",
                handled,
                self.stats.artifacts_processed,
                self.stats.artifacts_skipped,
                self.stats.events_folded,
                self.stats.snapshots_emitted
            );
        }

        handled
    }

    /// Block until the next snapshot is available
    ///
    /// Returns `None` only after shutdown, or once the artifact bound is
    /// reached and every pending snapshot has been handed out.
    pub fn next_snapshot(&mut self) -> Option<Snapshot> {
        loop {
            if let Some(snapshot) = self.pending.pop_front() {
                return Some(snapshot);
            }
            if !self.is_running() || self.is_exhausted() {
                return None;
            }
            if self.poll_once() == 0 {
                self.sleep_until_next_tick();
            }
        }
    }

    fn sleep_until_next_tick(&self) {
        let mut remaining = self.poll_interval;
        while remaining > Duration::ZERO && self.is_running() {
            let sleep_time = std::cmp::min(remaining, SLEEP_SLICE);
            thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }
}

impl<S: Strategy + 'static> StreamDriver<S> {
    /// Move the driver onto its own thread, forwarding snapshots to `sender`
    ///
    /// The thread ends on shutdown, when the bound is reached, or when the
    /// receiving side hangs up.
    pub fn spawn(mut self, sender: Sender<Snapshot>) -> DriverHandle {
        let running = self.shutdown_flag();

        let thread = thread::spawn(move || {
            info!(
                "Stream driver started on {}",
                self.cursor.directory().display()
            );

            while let Some(snapshot) = self.next_snapshot() {
                if sender.send(snapshot).is_err() {
                    info!("Snapshot receiver disconnected");
                    break;
                }
            }

            info!("Stream driver stopped");
            self.stats
        });

        DriverHandle {
            running,
            thread: Some(thread),
        }
    }
}

impl<S: Strategy> Iterator for StreamDriver<S> {
    type Item = Snapshot;

    fn next(&mut self) -> Option<Snapshot> {
        self.next_snapshot()
    }
}

/// Handle to a driver running on its own thread
pub struct DriverHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<DriverStats>>,
}

impl DriverHandle {
    /// Signal shutdown, wait for the thread, and return its final stats
    pub fn stop(mut self) -> Option<DriverStats> {
        self.shutdown()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn shutdown(&mut self) -> Option<DriverStats> {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.thread.take()?;
        match handle.join() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Stream driver thread panicked: {:?}", e);
                None
            }
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
