//! Bounded worker pool for conversation sessions.
//!
//! A dedicated tokio runtime whose blocking pool is capped at the configured
//! number of workers. Jobs beyond that capacity queue inside the runtime
//! until a worker frees up; the submitting thread never waits. Dropping the
//! pool abandons whatever is still running or sleeping.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::error::{CivicError, Result};

/// Thread pool running blocking jobs off the tick thread.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    capacity: usize,
    stats: Arc<PoolStats>,
}

#[derive(Debug, Default)]
struct PoolStats {
    submitted: AtomicU64,
    completed: AtomicU64,
}

/// Counts a job as completed when dropped, so a panicking job still leaves
/// the in-flight count.
struct Completion(Arc<PoolStats>);

impl Drop for Completion {
    fn drop(&mut self) {
        self.0.completed.fetch_add(1, Ordering::Release);
    }
}

impl WorkerPool {
    /// Start a pool with at most `max_workers` concurrent jobs.
    ///
    /// # Errors
    /// Returns `CivicError::WorkerPool` if the runtime cannot be built.
    pub fn new(max_workers: usize) -> Result<Self> {
        let capacity = max_workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(capacity)
            .thread_name("civic-worker")
            .enable_time()
            .build()
            .map_err(|e| CivicError::WorkerPool(e.to_string()))?;
        info!(capacity, "Conversation worker pool started");
        Ok(Self {
            runtime: Some(runtime),
            capacity,
            stats: Arc::new(PoolStats::default()),
        })
    }

    /// Queue a blocking job.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(runtime) = &self.runtime else { return };
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        let stats = Arc::clone(&self.stats);
        runtime.spawn_blocking(move || {
            let _done = Completion(stats);
            job();
        });
    }

    /// Run a background future (e.g. a periodic sweep) on the pool runtime.
    pub fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(runtime) = &self.runtime {
            runtime.spawn(task);
        }
    }

    /// Maximum number of concurrently running jobs.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs submitted but not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        let submitted = self.stats.submitted.load(Ordering::Relaxed);
        submitted.saturating_sub(self.stats.completed.load(Ordering::Acquire))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            debug!(in_flight = self.in_flight(), "Abandoning conversation workers");
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn runs_submitted_jobs() {
        let pool = WorkerPool::new(2).expect("pool starts");
        let (tx, rx) = mpsc::channel();
        for i in 0..4 {
            let tx = tx.clone();
            pool.submit(move || {
                tx.send(i).expect("receiver alive");
            });
        }
        let mut got: Vec<i32> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("job ran"))
            .collect();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 3]);
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn panicking_job_still_completes() {
        let pool = WorkerPool::new(1).expect("pool starts");
        pool.submit(|| panic!("job blew up"));
        let (tx, rx) = mpsc::channel();
        pool.submit(move || tx.send(()).expect("receiver alive"));
        rx.recv_timeout(Duration::from_secs(5)).expect("pool survives the panic");

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while pool.in_flight() > 0 {
            assert!(std::time::Instant::now() < deadline, "in_flight stuck at {}", pool.in_flight());
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn drop_does_not_wait_for_sleeping_jobs() {
        let pool = WorkerPool::new(1).expect("pool starts");
        pool.submit(|| std::thread::sleep(Duration::from_secs(30)));
        let started = std::time::Instant::now();
        drop(pool);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
