//! Bounded parallel execution with performance accounting, used for
//! parallel-by-schema processing and reference fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture};
use kubecore_core::{KubeCoreError, Result};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// Snapshot of executor metrics. Reads are approximate.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_queries: u64,
    pub avg_response_time_ms: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub parallel_operations: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    total_queries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    parallel_operations: AtomicU64,
    errors: AtomicU64,
}

pub struct ParallelExecutor {
    max_workers: usize,
    batch_timeout: Duration,
    counters: Counters,
    avg_response_time_ms: Mutex<f64>,
}

impl ParallelExecutor {
    pub fn new(max_workers: usize, batch_timeout: Duration) -> Self {
        Self {
            max_workers: max_workers.max(1),
            batch_timeout,
            counters: Counters::default(),
            avg_response_time_ms: Mutex::new(0.0),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run a batch of tasks with at most `max_workers` in flight, under
    /// the batch deadline. Per-task failures are returned in place; a
    /// deadline expiry fails the whole batch with `Timeout`.
    pub async fn run_batch<'a, T: Send + 'a>(
        &self,
        tasks: Vec<BoxFuture<'a, Result<T>>>,
    ) -> Result<Vec<Result<T>>> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        self.counters
            .parallel_operations
            .fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let guarded = tasks.into_iter().map(|task| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await;
                task.await
            }
        });

        let results = match tokio::time::timeout(self.batch_timeout, join_all(guarded)).await {
            Ok(results) => results,
            Err(_) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                error!(
                    timeout_ms = self.batch_timeout.as_millis() as u64,
                    "parallel batch timed out"
                );
                return Err(KubeCoreError::Timeout(format!(
                    "batch exceeded {:.1}s",
                    self.batch_timeout.as_secs_f64()
                )));
            }
        };

        let failures = results.iter().filter(|r| r.is_err()).count() as u64;
        if failures > 0 {
            self.counters.errors.fetch_add(failures, Ordering::Relaxed);
        }

        debug!(
            tasks = results.len(),
            failures,
            duration_ms = started.elapsed().as_millis() as u64,
            "parallel batch completed"
        );
        Ok(results)
    }

    /// Record one completed query and fold its duration into the
    /// running average.
    pub fn record_query(&self, duration: Duration) {
        let total = self.counters.total_queries.fetch_add(1, Ordering::Relaxed) + 1;
        let mut avg = self.avg_response_time_ms.lock();
        *avg += (duration.as_secs_f64() * 1000.0 - *avg) / total as f64;
    }

    pub fn record_cache_access(&self, hit: bool) {
        if hit {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            total_queries: self.counters.total_queries.load(Ordering::Relaxed),
            avg_response_time_ms: *self.avg_response_time_ms.lock(),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            parallel_operations: self.counters.parallel_operations.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.counters.cache_hits.load(Ordering::Relaxed);
        let misses = self.counters.cache_misses.load(Ordering::Relaxed);
        if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        }
    }

    pub fn reset_metrics(&self) {
        self.counters.total_queries.store(0, Ordering::Relaxed);
        self.counters.cache_hits.store(0, Ordering::Relaxed);
        self.counters.cache_misses.store(0, Ordering::Relaxed);
        self.counters.parallel_operations.store(0, Ordering::Relaxed);
        self.counters.errors.store(0, Ordering::Relaxed);
        *self.avg_response_time_ms.lock() = 0.0;
    }
}
