// Run counters and timings for the odds service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::parallel::ExecutionMode;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_runs: u64,
    pub total_trials: u64,
    pub parallel_runs: u64,
    pub sequential_runs: u64,
    pub total_duration_ms: u64,
    pub fastest_run_ms: u64,
    pub slowest_run_ms: u64,
    pub average_run_ms: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Percentage in `[0, 100]`.
    pub cache_hit_rate: f64,
    pub what_if_hits: u64,
    pub what_if_misses: u64,
    pub what_if_hit_rate: f64,
}

/// Lock-free counters, updated from any thread.
#[derive(Debug)]
pub struct SimulationMetrics {
    total_runs: AtomicU64,
    total_trials: AtomicU64,
    parallel_runs: AtomicU64,
    sequential_runs: AtomicU64,
    total_duration_us: AtomicU64,
    fastest_run_us: AtomicU64,
    slowest_run_us: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    what_if_hits: AtomicU64,
    what_if_misses: AtomicU64,
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationMetrics {
    pub fn new() -> Self {
        Self {
            total_runs: AtomicU64::new(0),
            total_trials: AtomicU64::new(0),
            parallel_runs: AtomicU64::new(0),
            sequential_runs: AtomicU64::new(0),
            total_duration_us: AtomicU64::new(0),
            fastest_run_us: AtomicU64::new(u64::MAX),
            slowest_run_us: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            what_if_hits: AtomicU64::new(0),
            what_if_misses: AtomicU64::new(0),
        }
    }

    pub fn record_run(&self, trials: usize, mode: ExecutionMode, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.total_trials.fetch_add(trials as u64, Ordering::Relaxed);
        match mode {
            ExecutionMode::Parallel { .. } => self.parallel_runs.fetch_add(1, Ordering::Relaxed),
            ExecutionMode::Sequential => self.sequential_runs.fetch_add(1, Ordering::Relaxed),
        };
        self.total_duration_us.fetch_add(us, Ordering::Relaxed);
        self.fastest_run_us.fetch_min(us, Ordering::Relaxed);
        self.slowest_run_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_what_if_hit(&self) {
        self.what_if_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_what_if_miss(&self) {
        self.what_if_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_runs = self.total_runs.load(Ordering::Relaxed);
        let total_us = self.total_duration_us.load(Ordering::Relaxed);
        let fastest_us = match self.fastest_run_us.load(Ordering::Relaxed) {
            u64::MAX => 0,
            us => us,
        };
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let what_if_hits = self.what_if_hits.load(Ordering::Relaxed);
        let what_if_misses = self.what_if_misses.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_runs,
            total_trials: self.total_trials.load(Ordering::Relaxed),
            parallel_runs: self.parallel_runs.load(Ordering::Relaxed),
            sequential_runs: self.sequential_runs.load(Ordering::Relaxed),
            total_duration_ms: total_us / 1000,
            fastest_run_ms: fastest_us / 1000,
            slowest_run_ms: self.slowest_run_us.load(Ordering::Relaxed) / 1000,
            average_run_ms: if total_runs == 0 {
                0.0
            } else {
                total_us as f64 / total_runs as f64 / 1000.0
            },
            cache_hits,
            cache_misses,
            cache_hit_rate: hit_rate(cache_hits, cache_misses),
            what_if_hits,
            what_if_misses,
            what_if_hit_rate: hit_rate(what_if_hits, what_if_misses),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            "simulation metrics: {} runs ({} parallel, {} sequential), {} trials, avg {:.1} ms, cache hit rate {:.1}%, what-if hit rate {:.1}%",
            s.total_runs,
            s.parallel_runs,
            s.sequential_runs,
            s.total_trials,
            s.average_run_ms,
            s.cache_hit_rate,
            s.what_if_hit_rate
        );
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}
