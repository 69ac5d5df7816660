//! Background execution for deferred queues.
//!
//! A [`Worker`] drains the pending records of an [`InMemoryTaskQueue`]
//! configured with [`ExecutionMode::Deferred`](super::ExecutionMode). It
//! can be driven by hand with [`Worker::run_pending`] (handy in tests) or
//! spawned onto the Tokio runtime with [`Worker::spawn`], which polls the
//! queue until [`WorkerHandle::shutdown`] is called.
//!
//! Shutdown is cooperative: the loop finishes the pass it is in, then
//! exits. Records claimed during that pass are always finalized.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::memory::InMemoryTaskQueue;
use crate::error::TaskError;

/// Runs pending records of an [`InMemoryTaskQueue`].
#[derive(Debug, Clone)]
pub struct Worker {
    queue: Arc<InMemoryTaskQueue>,
}

impl Worker {
    /// Creates a worker for `queue`.
    pub fn new(queue: Arc<InMemoryTaskQueue>) -> Self {
        Self { queue }
    }

    /// The queue this worker drains.
    pub fn queue(&self) -> &Arc<InMemoryTaskQueue> {
        &self.queue
    }

    /// Executes every record that is pending when the call starts, oldest
    /// first. Returns how many were run by this call.
    ///
    /// Records claimed concurrently by another worker are skipped.
    ///
    /// # Errors
    ///
    /// Stops at the first record whose executable is not registered and
    /// returns [`TaskError::UnknownExecutable`]. That record stays pending.
    pub async fn run_pending(&self) -> Result<usize, TaskError> {
        let mut executed = 0;
        for task_id in self.queue.pending_ids() {
            if self.queue.execute(task_id.as_str()).await? {
                executed += 1;
            }
        }
        Ok(executed)
    }

    /// Spawns a polling loop on the current Tokio runtime.
    ///
    /// The loop runs [`run_pending`](Self::run_pending), then sleeps for
    /// `interval` whenever a pass found nothing to do. Errors are logged
    /// and the loop keeps going.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(self, interval: Duration) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
            tracing::info!(poll_interval_ms, "task worker started");
            loop {
                let stopping = *shutdown_rx.borrow();
                if stopping {
                    break;
                }
                let idle = match self.run_pending().await {
                    Ok(0) => true,
                    Ok(executed) => {
                        tracing::debug!(executed, "task worker pass complete");
                        false
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "task worker pass failed");
                        true
                    },
                };
                if idle {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {},
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        },
                    }
                } else {
                    tokio::task::yield_now().await;
                }
            }
            tracing::info!("task worker stopped");
        });
        WorkerHandle { shutdown_tx, join }
    }
}

/// Handle to a spawned [`Worker`] loop.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signals the loop to stop and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "task worker exited abnormally");
        }
    }

    /// Returns `true` once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
