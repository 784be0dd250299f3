//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps the periodic counters to get a
/// consistent snapshot.
pub struct Metrics {
    /// Total events fed into the dispatch channel (monotonic)
    events_received: AtomicU64,
    /// Events dropped because the channel was full (monotonic)
    events_dropped: AtomicU64,
    /// Payloads that did not decode to a recognized event (monotonic)
    payloads_ignored: AtomicU64,
    /// Events dispatched against the state machine (monotonic)
    events_dispatched: AtomicU64,
    /// Dispatched events that matched no table row (monotonic)
    events_absorbed: AtomicU64,
    /// Events dispatched since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of dispatch latencies in microseconds (reset on report)
    dispatch_sum_us: AtomicU64,
    /// Max dispatch latency in microseconds (reset on report)
    dispatch_max_us: AtomicU64,
    /// Door commands written (monotonic)
    door_commands: AtomicU64,
    /// Door commands that failed at the serial layer (monotonic)
    door_failures: AtomicU64,
    /// Training sessions started (monotonic)
    runs_started: AtomicU64,
    /// Experiment cycles completed back to start (monotonic)
    runs_completed: AtomicU64,
    /// Last report time (only accessed from the reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            payloads_ignored: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            events_absorbed: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            dispatch_sum_us: AtomicU64::new(0),
            dispatch_max_us: AtomicU64::new(0),
            door_commands: AtomicU64::new(0),
            door_failures: AtomicU64::new(0),
            runs_started: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_payload_ignored(&self) {
        self.payloads_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one dispatch with its latency (lock-free)
    #[inline]
    pub fn record_dispatch(&self, latency_us: u64, absorbed: bool) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.dispatch_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.dispatch_max_us, latency_us);
        if absorbed {
            self.events_absorbed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_door_command(&self) {
        self.door_commands.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_door_failure(&self) {
        self.door_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_run_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn door_commands(&self) -> u64 {
        self.door_commands.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn door_failures(&self) -> u64 {
        self.door_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn runs_completed(&self) -> u64 {
        self.runs_completed.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self, state: &'static str) -> MetricsSummary {
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);
        let dispatch_sum = self.dispatch_sum_us.swap(0, Ordering::Relaxed);
        let dispatch_max = self.dispatch_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_dispatch = if events_count > 0 { dispatch_sum / events_count } else { 0 };

        MetricsSummary {
            state,
            events_received: self.events_received.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            payloads_ignored: self.payloads_ignored.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            events_absorbed: self.events_absorbed.load(Ordering::Relaxed),
            events_per_sec,
            avg_dispatch_us: avg_dispatch,
            max_dispatch_us: dispatch_max,
            door_commands: self.door_commands.load(Ordering::Relaxed),
            door_failures: self.door_failures.load(Ordering::Relaxed),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub state: &'static str,
    pub events_received: u64,
    pub events_dropped: u64,
    pub payloads_ignored: u64,
    pub events_dispatched: u64,
    pub events_absorbed: u64,
    pub events_per_sec: f64,
    pub avg_dispatch_us: u64,
    pub max_dispatch_us: u64,
    pub door_commands: u64,
    pub door_failures: u64,
    pub runs_started: u64,
    pub runs_completed: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            state = %self.state,
            events_received = %self.events_received,
            events_dispatched = %self.events_dispatched,
            events_absorbed = %self.events_absorbed,
            events_dropped = %self.events_dropped,
            payloads_ignored = %self.payloads_ignored,
            events_per_sec = format!("{:.1}", self.events_per_sec),
            avg_dispatch_us = %self.avg_dispatch_us,
            max_dispatch_us = %self.max_dispatch_us,
            door_cmds = %self.door_commands,
            door_failures = %self.door_failures,
            runs_started = %self.runs_started,
            runs_completed = %self.runs_completed,
            "metrics"
        );
    }
}
