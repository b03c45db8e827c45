//! Recoverable background task pool.
//!
//! # Responsibilities
//! - Run long-lived background work (config reload, cache sweeps) on tokio
//! - Contain panics: a panicking task is logged, siblings keep running
//! - Coordinate shutdown through a shared [`StopSignal`]
//!
//! # Design Decisions
//! - Cancellation is cooperative. Every task receives a [`StopSignal`] and must
//!   check it at each blocking point (loop iteration, channel receive, sleep).
//!   [`Pool::stop`] waits for every task to return, so a task that never checks
//!   its signal keeps `stop` waiting forever. That is the caller's obligation.
//! - Panics are caught with `catch_unwind` around the task future rather than
//!   surfaced through `JoinError`, so the payload is logged next to a backtrace.

use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::observability::metrics;

/// Cancellation token handed to every pooled task.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Returns true once the owning pool has been asked to stop.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the owning pool is stopped (or dropped).
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// A set of managed background tasks sharing one stop signal.
pub struct Pool {
    stop_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: Arc<AtomicUsize>,
}

impl Pool {
    /// Create an empty pool.
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            tasks: Mutex::new(Vec::new()),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Register and start a task.
    ///
    /// The closure receives the task's [`StopSignal`]. A panic inside the task is
    /// recovered and logged; it does not affect the pool or other tasks.
    pub fn go<F, Fut>(&self, task: F)
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop = StopSignal {
            rx: self.stop_tx.subscribe(),
        };
        let running = self.running.clone();
        running.fetch_add(1, Ordering::SeqCst);

        let fut = task(stop);

        // Spawn under the lock so `stop` either awaits this task or resets the
        // signal before it starts.
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(tokio::spawn(async move {
            recover(fut).await;
            running.fetch_sub(1, Ordering::SeqCst);
        }));
    }

    /// Number of tasks that have not returned yet.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal every task to stop and wait until all of them have returned.
    ///
    /// Tasks registered while stopping (for example by a task that is itself
    /// shutting down) are awaited too. The signal is reset only once the task
    /// list is empty, so the pool can accept new tasks afterwards.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);

        loop {
            let handles = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                if tasks.is_empty() {
                    self.stop_tx.send_replace(false);
                    break;
                }
                std::mem::take(&mut *tasks)
            };
            tracing::debug!(tasks = handles.len(), "Stopping task pool");

            for handle in handles {
                if let Err(e) = handle.await {
                    // Panics are caught inside the task; this only fires on runtime shutdown.
                    tracing::warn!(error = %e, "Pooled task did not complete");
                }
            }
        }

        tracing::debug!("Task pool stopped");
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

/// Launch an unmanaged, recoverable unit of work.
///
/// There is no stop signal: use this for fire-and-forget work that does not take
/// part in coordinated shutdown.
pub fn go<Fut>(fut: Fut) -> JoinHandle<()>
where
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(recover(fut))
}

async fn recover<Fut>(fut: Fut)
where
    Fut: Future<Output = ()>,
{
    if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
        log_panic(panic.as_ref());
    }
}

fn log_panic(panic: &(dyn Any + Send)) {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());

    metrics::record_task_panic();
    tracing::error!(error = %message, "Background task panicked, recovered");
    tracing::error!("Stack: {}", Backtrace::force_capture());
}
