//! Bounded concurrency for model evaluation tasks.
//!
//! Built on `tokio::sync::Semaphore`, which hands permits out in request order, so
//! saturated callers are admitted FIFO. A slot is held by a guard and released when
//! the guard drops: on completion, on error, on panic unwind, or when the caller's
//! future is dropped (deadline, cancellation, abort).

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LimiterError {
    #[error("task was cancelled")]
    Cancelled,

    #[error("task deadline exceeded")]
    DeadlineExceeded,

    #[error("limiter is closed")]
    Closed,
}

/// Cooperative cancellation shared between a caller and the tasks it submitted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancellationInner>,
}

#[derive(Debug, Default)]
struct CancellationInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Per-submission limits.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Covers both queue wait and execution.
    pub timeout: Option<Duration>,
    pub cancellation: Option<CancellationToken>,
}

impl TaskOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

#[derive(Debug)]
struct Counters {
    running: AtomicUsize,
    peak: AtomicUsize,
}

/// Held for as long as a task occupies a slot.
struct SlotGuard {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl SlotGuard {
    fn new(permit: OwnedSemaphorePermit, counters: Arc<Counters>) -> Self {
        let now = counters.running.fetch_add(1, Ordering::AcqRel) + 1;
        counters.peak.fetch_max(now, Ordering::AcqRel);
        Self {
            _permit: permit,
            counters,
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.counters.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Caps how many tasks run at once. Cheap to clone; clones share slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
    counters: Arc<Counters>,
}

impl ConcurrencyLimiter {
    /// `max` below 1 is raised to 1.
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            counters: Arc::new(Counters {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max
    }

    pub fn running(&self) -> usize {
        self.counters.running.load(Ordering::Acquire)
    }

    /// Highest `running` value observed since construction.
    pub fn peak_running(&self) -> usize {
        self.counters.peak.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Queued and future submissions fail with [`LimiterError::Closed`]; running tasks finish.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub async fn run<F, Fut, T>(&self, task: F) -> Result<T, LimiterError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.run_with(TaskOptions::default(), task).await
    }

    pub async fn run_with<F, Fut, T>(&self, options: TaskOptions, task: F) -> Result<T, LimiterError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let TaskOptions { timeout, cancellation } = options;
        let semaphore = self.semaphore.clone();
        let counters = self.counters.clone();

        let work = async move {
            let permit = semaphore.acquire_owned().await.map_err(|_| LimiterError::Closed)?;
            let _slot = SlotGuard::new(permit, counters);
            Ok::<T, LimiterError>(task().await)
        };

        let bounded = async move {
            match timeout {
                Some(timeout) => tokio::time::timeout(timeout, work)
                    .await
                    .map_err(|_| LimiterError::DeadlineExceeded)?,
                None => work.await,
            }
        };

        match cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(LimiterError::Cancelled),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        }
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(5)
    }
}
