//! Scheduler Module
//!
//! Cancellable periodic tasks driven by the tokio clock. The body of a task
//! returns `ControlFlow::Break(())` to end the loop on its own; the owner
//! can end it from outside through [`TaskHandle::cancel`].
//!
//! Cancellation is observed between iterations only. A body that is already
//! running completes before the task exits.
//!
//! Because everything goes through `tokio::time`, tests can drive tasks on
//! a paused clock (`#[tokio::test(start_paused = true)]`).

use crate::error::SchedulerError;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Builder for a periodic task
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    name: String,
    period: Duration,
    immediate: bool,
}

impl PeriodicTask {
    /// Task that first fires one `period` after spawning
    #[must_use]
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            // tokio rejects a zero period
            period: period.max(Duration::from_millis(1)),
            immediate: false,
        }
    }

    /// Fire the first iteration as soon as the task is spawned
    #[inline]
    #[must_use]
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn the task on the current runtime
    ///
    /// Iterations never overlap: if a body overruns its period, the next
    /// tick is delayed rather than bunched up.
    pub fn spawn<F, Fut>(self, mut body: F) -> TaskHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let name = self.name.clone();
        let period = self.period;
        let first = if self.immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };

        let task_name = name.clone();
        let join = tokio::spawn(async move {
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!(task = %task_name, "periodic task cancelled");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if body().await.is_break() {
                            tracing::debug!(task = %task_name, "periodic task finished");
                            break;
                        }
                    }
                }
            }
        });

        TaskHandle {
            name,
            shutdown: shutdown_tx,
            join,
        }
    }
}

/// Owner's handle on a spawned periodic task
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the loop has exited (cancelled, finished or panicked)
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Request cancellation and wait for the loop to exit
    ///
    /// Must not be awaited from inside the task's own body.
    ///
    /// # Errors
    /// Returns `SchedulerError` if the body panicked or the task was aborted.
    pub async fn cancel(self) -> Result<(), SchedulerError> {
        // The receiver is gone if the loop already ended on its own
        let _ = self.shutdown.send(true);
        self.wait().await
    }

    /// Wait for the loop to exit without requesting cancellation
    ///
    /// # Errors
    /// Returns `SchedulerError` if the body panicked or the task was aborted.
    pub async fn wait(self) -> Result<(), SchedulerError> {
        let name = self.name;
        self.join.await.map_err(|e| {
            if e.is_panic() {
                SchedulerError::Panicked { name }
            } else {
                SchedulerError::Aborted { name }
            }
        })
    }

    /// Stop the task immediately, dropping any in-flight iteration
    pub fn abort(&self) {
        self.join.abort();
    }
}
