//! In-process request counters backing `GET /stats`.
//!
//! Unlike the OpenTelemetry instruments in [`telemetry`](crate::server::telemetry)
//! these are always compiled in.

use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ServiceStats {
    started: Instant,
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    latency_total_us: AtomicU64,
    latency_max_us: AtomicU64,
    item_latency_total_us: AtomicU64,
    item_latency_max_us: AtomicU64,
}

/// Point-in-time view of [`ServiceStats`] plus pool gauges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    /// Enqueue-to-reply latency over successful files.
    pub avg_item_latency_ms: f64,
    pub max_item_latency_ms: f64,
    pub busy_workers: usize,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub uptime_secs: u64,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            latency_total_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            item_latency_total_us: AtomicU64::new(0),
            item_latency_max_us: AtomicU64::new(0),
        }
    }

    /// Counts one compressed file (a single request or one batch item) and
    /// its enqueue-to-reply latency.
    pub fn record_success(&self, bytes_in: usize, bytes_out: usize, latency: Duration) {
        let micros = as_micros(latency);
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes_in as u64, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out as u64, Ordering::Relaxed);
        self.item_latency_total_us.fetch_add(micros, Ordering::Relaxed);
        self.item_latency_max_us.fetch_max(micros, Ordering::Relaxed);
    }

    /// Counts one failed file (a single request or one batch item).
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one finished HTTP request and its latency.
    pub fn record_request(&self, latency: Duration) {
        let micros = as_micros(latency);
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.latency_total_us.fetch_add(micros, Ordering::Relaxed);
        self.latency_max_us.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        busy_workers: usize,
        worker_count: usize,
        queue_capacity: usize,
    ) -> StatsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);

        StatsSnapshot {
            requests,
            successes,
            failures: self.failures.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            avg_latency_ms: average_ms(self.latency_total_us.load(Ordering::Relaxed), requests),
            max_latency_ms: self.latency_max_us.load(Ordering::Relaxed) as f64 / 1000.0,
            avg_item_latency_ms: average_ms(
                self.item_latency_total_us.load(Ordering::Relaxed),
                successes,
            ),
            max_item_latency_ms: self.item_latency_max_us.load(Ordering::Relaxed) as f64 / 1000.0,
            busy_workers,
            worker_count,
            queue_capacity,
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

fn as_micros(latency: Duration) -> u64 {
    u64::try_from(latency.as_micros()).unwrap_or(u64::MAX)
}

fn average_ms(total_us: u64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    total_us as f64 / count as f64 / 1000.0
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_have_zero_latency() {
        let snapshot = ServiceStats::new().snapshot(0, 4, 8);
        assert_eq!(snapshot.requests, 0);
        assert_eq!(snapshot.avg_latency_ms, 0.0);
        assert_eq!(snapshot.avg_item_latency_ms, 0.0);
        assert_eq!(snapshot.worker_count, 4);
        assert_eq!(snapshot.queue_capacity, 8);
    }

    #[test]
    fn tracks_counts_bytes_and_latency() {
        let stats = ServiceStats::new();
        stats.record_success(1000, 400, Duration::from_millis(4));
        stats.record_success(500, 100, Duration::from_millis(8));
        stats.record_failure();
        stats.record_request(Duration::from_millis(10));
        stats.record_request(Duration::from_millis(30));

        let snapshot = stats.snapshot(1, 2, 4);
        assert_eq!(snapshot.successes, 2);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.bytes_in, 1500);
        assert_eq!(snapshot.bytes_out, 500);
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.avg_latency_ms, 20.0);
        assert_eq!(snapshot.max_latency_ms, 30.0);
        assert_eq!(snapshot.avg_item_latency_ms, 6.0);
        assert_eq!(snapshot.max_item_latency_ms, 8.0);
        assert_eq!(snapshot.busy_workers, 1);
    }
}
