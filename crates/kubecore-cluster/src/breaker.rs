//! Per-kind circuit breakers guarding list operations during discovery.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use kubecore_core::ResourceKind;
use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    last_failure: Option<Instant>,
}

/// Consecutive-failure breaker: closed -> open after `failure_threshold`
/// failures, open -> half-open after `cooldown`, half-open -> closed on
/// success or back to open on failure.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    failures: AtomicU32,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            failures: AtomicU32::new(0),
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                last_failure: None,
            }),
        }
    }

    /// Whether a call may proceed. An open breaker flips to half-open
    /// (allowing one trial) once the cooldown has elapsed.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let cooled = inner
                    .last_failure
                    .map(|at| at.elapsed() > self.cooldown)
                    .unwrap_or(true);
                if cooled {
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
    }

    pub fn record_failure(&self) {
        let count = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        let mut inner = self.inner.lock();
        inner.last_failure = Some(Instant::now());
        if inner.state == BreakerState::HalfOpen || count >= self.failure_threshold {
            inner.state = BreakerState::Open;
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Concurrent registry of breakers keyed by kind.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<ResourceKind, Arc<CircuitBreaker>>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            breakers: DashMap::new(),
            failure_threshold,
            cooldown,
        }
    }

    pub fn breaker_for(&self, kind: &ResourceKind) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(kind.clone())
            .or_insert_with(|| {
                debug!(kind = %kind, "creating circuit breaker");
                Arc::new(CircuitBreaker::new(self.failure_threshold, self.cooldown))
            })
            .clone()
    }

    pub fn states(&self) -> Vec<(ResourceKind, BreakerState, u32)> {
        self.breakers
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().state(),
                    entry.value().failure_count(),
                )
            })
            .collect()
    }

    /// Fraction of known breakers currently open. 0.0 when none exist.
    pub fn open_fraction(&self) -> f64 {
        let total = self.breakers.len();
        if total == 0 {
            return 0.0;
        }
        let open = self
            .breakers
            .iter()
            .filter(|entry| entry.value().state() == BreakerState::Open)
            .count();
        open as f64 / total as f64
    }
}
