// Sequential or worker-pool execution of a batch of independent trials.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, Scope};
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, warn};

use crate::config::TrialConfig;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Batches at or above this size use the worker pool.
    pub parallel_threshold: usize,
    pub progress_interval: Duration,
    /// Trial `i` draws from an RNG seeded by `(base_seed, i)`.
    pub base_seed: u64,
    /// Upper bound on workers; hardware parallelism when `None`.
    pub max_workers: Option<usize>,
}

impl ExecutionSettings {
    /// Settings from config; a missing seed is drawn at random per batch.
    pub fn from_config(trials: &TrialConfig) -> Self {
        Self {
            parallel_threshold: trials.parallel_threshold,
            progress_interval: trials.progress_interval(),
            base_seed: trials.seed.unwrap_or_else(rand::random),
            max_workers: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.base_seed = seed;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers.max(1));
        self
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            parallel_threshold: 1000,
            progress_interval: Duration::from_secs(1),
            base_seed: 0,
            max_workers: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel { workers: usize },
}

/// How a batch of `n` trials will run.
pub fn execution_mode(n: usize, settings: &ExecutionSettings) -> ExecutionMode {
    if n < settings.parallel_threshold {
        ExecutionMode::Sequential
    } else {
        ExecutionMode::Parallel {
            workers: worker_count(n, settings.max_workers),
        }
    }
}

/// `min(available_parallelism, n)`, further capped by `max_workers`.
pub fn worker_count(n: usize, max_workers: Option<usize>) -> usize {
    let hardware = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let workers = hardware.min(n).max(1);
    match max_workers {
        Some(cap) => workers.min(cap.max(1)),
        None => workers,
    }
}

/// RNG for one trial. Depends only on the base seed and the trial index, so
/// results do not depend on which worker ran the trial.
pub fn trial_rng(base_seed: u64, index: usize) -> SmallRng {
    SmallRng::seed_from_u64(base_seed.wrapping_add(index as u64))
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run `n` trials and return their results in trial-index order.
///
/// Blocks until every trial has finished. A panic inside `trial` is
/// propagated to the caller after all workers have stopped.
pub fn run_trials<T, F>(n: usize, settings: &ExecutionSettings, trial: F) -> Vec<T>
where
    T: Send,
    F: Fn(&mut SmallRng) -> T + Sync,
{
    let started = Instant::now();
    let results = match execution_mode(n, settings) {
        ExecutionMode::Sequential => run_sequential(n, settings.base_seed, &trial),
        ExecutionMode::Parallel { workers } => run_parallel(n, workers, settings, &trial),
    };
    debug!("{} trials finished in {:?}", n, started.elapsed());
    results
}

fn run_sequential<T, F>(n: usize, base_seed: u64, trial: &F) -> Vec<T>
where
    F: Fn(&mut SmallRng) -> T,
{
    (0..n)
        .map(|i| trial(&mut trial_rng(base_seed, i)))
        .collect()
}

fn run_parallel<T, F>(n: usize, workers: usize, settings: &ExecutionSettings, trial: &F) -> Vec<T>
where
    T: Send,
    F: Fn(&mut SmallRng) -> T + Sync,
{
    let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool,
        Err(e) => {
            warn!("failed to build worker pool, running {n} trials sequentially: {e}");
            return run_sequential(n, settings.base_seed, trial);
        }
    };
    info!("running {n} trials on {workers} workers");

    let completed = AtomicUsize::new(0);
    let base_seed = settings.base_seed;

    // A panicking trial unwinds out of `install`; the reporter guard drops
    // first and the scope joins its thread before the panic resumes.
    thread::scope(|scope| {
        let _reporter = ProgressReporter::start(scope, &completed, n, settings.progress_interval);
        pool.install(|| {
            (0..n)
                .into_par_iter()
                .map(|i| {
                    let result = trial(&mut trial_rng(base_seed, i));
                    completed.fetch_add(1, Ordering::Relaxed);
                    result
                })
                .collect::<Vec<T>>()
        })
    })
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Logs batch progress on a background thread until dropped.
///
/// The thread waits on a channel with a timeout; dropping the guard sends
/// the stop signal (or disconnects the channel during unwinding), so the
/// reporter ends with its batch on every exit path.
pub struct ProgressReporter {
    stop: Option<Sender<()>>,
}

impl ProgressReporter {
    pub fn start<'scope, 'env>(
        scope: &'scope Scope<'scope, 'env>,
        completed: &'env AtomicUsize,
        total: usize,
        interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        scope.spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let done = completed.load(Ordering::Relaxed);
                    let pct = if total == 0 {
                        100.0
                    } else {
                        done as f64 / total as f64 * 100.0
                    };
                    info!("simulation progress: {done}/{total} ({pct:.1}%)");
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        Self { stop: Some(tx) }
    }

    /// Signal the reporter thread to exit. Later calls do nothing.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn settings(seed: u64) -> ExecutionSettings {
        ExecutionSettings {
            progress_interval: Duration::from_millis(5),
            ..ExecutionSettings::default()
        }
        .with_seed(seed)
    }

    #[test]
    fn small_batches_run_sequentially() {
        assert_eq!(execution_mode(999, &settings(1)), ExecutionMode::Sequential);
        assert!(matches!(
            execution_mode(1000, &settings(1)),
            ExecutionMode::Parallel { .. }
        ));
    }

    #[test]
    fn worker_count_is_bounded() {
        assert_eq!(worker_count(1, None), 1);
        assert!(worker_count(10_000, None) >= 1);
        assert!(worker_count(10_000, Some(2)) <= 2);
        assert_eq!(worker_count(3, Some(0)), 1);
    }

    #[test]
    fn every_trial_runs_exactly_once_in_order() {
        let calls = AtomicUsize::new(0);
        let results = run_trials(5000, &settings(42), |rng| {
            calls.fetch_add(1, Ordering::Relaxed);
            rng.gen::<u64>()
        });
        assert_eq!(results.len(), 5000);
        assert_eq!(calls.load(Ordering::Relaxed), 5000);
        for (i, value) in results.iter().enumerate().step_by(97) {
            assert_eq!(*value, trial_rng(42, i).gen::<u64>());
        }
    }

    #[test]
    fn parallel_matches_sequential_for_fixed_seed() {
        let parallel = run_trials(2000, &settings(9).with_max_workers(4), |rng| {
            rng.gen_range(0..1000u32)
        });
        let sequential = run_sequential(2000, 9, &|rng: &mut SmallRng| rng.gen_range(0..1000u32));
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn zero_trials_is_empty() {
        let results: Vec<u8> = run_trials(0, &settings(1), |_| 1);
        assert!(results.is_empty());
    }

    #[test]
    fn worker_panic_propagates_after_join() {
        let s = ExecutionSettings {
            parallel_threshold: 10,
            ..settings(3)
        };
        let calls = AtomicUsize::new(0);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            run_trials(100, &s, |_| {
                if calls.fetch_add(1, Ordering::Relaxed) == 37 {
                    panic!("trial failed");
                }
                1u8
            })
        }));
        assert!(outcome.is_err());
    }

    #[test]
    fn reporter_stops_once() {
        let completed = AtomicUsize::new(0);
        thread::scope(|scope| {
            let mut reporter =
                ProgressReporter::start(scope, &completed, 10, Duration::from_millis(1));
            thread::sleep(Duration::from_millis(5));
            reporter.stop();
            reporter.stop();
        });
    }

    #[test]
    fn trial_rngs_differ_by_index_and_seed() {
        let a = trial_rng(1, 0).gen::<u64>();
        let b = trial_rng(1, 1).gen::<u64>();
        let c = trial_rng(2, 0).gen::<u64>();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn trial_seed_is_base_plus_index() {
        let mut expected = SmallRng::seed_from_u64(10);
        assert_eq!(trial_rng(7, 3).gen::<u64>(), expected.gen::<u64>());
        // Offsets wrap instead of overflowing.
        assert_eq!(trial_rng(u64::MAX, 1).gen::<u64>(), trial_rng(0, 0).gen::<u64>());
    }

    #[test]
    fn pool_runs_on_requested_worker_count() {
        let s = ExecutionSettings {
            parallel_threshold: 1,
            ..settings(5)
        }
        .with_max_workers(2);
        let threads = run_trials(400, &s, |_| rayon::current_num_threads());
        assert!(threads.iter().all(|&t| t <= 2));
        assert!(rayon::current_thread_index().is_none());
    }
}
