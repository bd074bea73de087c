//! Controller lifecycle: startup synchronization, the worker pool, and
//! graceful shutdown.
//!
//! The controller moves through four phases. Initializing: wait for the
//! local cache to report full synchronization, failing fatally if the
//! cancellation signal fires first. Running: `workers` concurrent loops each
//! pull a key, dispatch it to the reconcile function, and translate the
//! outcome into queue bookkeeping. ShuttingDown: cancellation shuts the
//! queue down and in-flight reconciliations finish. Terminated: every worker
//! loop has observed the shutdown signal and exited.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::ControllerError;
use crate::queue::WorkQueue;
use crate::reconcile::{EventSink, LogSink, Outcome, Reconcile};
use crate::store::CacheReadiness;

/// How often the startup wait re-checks cache readiness.
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Orchestrates the worker pool over one work queue and one reconcile
/// function.
pub struct Controller<R> {
    queue: WorkQueue,
    cache: Arc<dyn CacheReadiness>,
    reconciler: Arc<R>,
    sink: Arc<dyn EventSink>,
}

impl<R: Reconcile> Controller<R> {
    /// Creates a controller; errors are observed through [`LogSink`] unless
    /// [`Self::with_sink`] replaces it.
    pub fn new(queue: WorkQueue, cache: Arc<dyn CacheReadiness>, reconciler: Arc<R>) -> Self {
        Self {
            queue,
            cache,
            reconciler,
            sink: Arc::new(LogSink),
        }
    }

    /// Replaces the error observer.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// A handle to the controller's work queue, for wiring the event bridge
    /// or enqueueing keys directly.
    #[must_use]
    pub fn queue(&self) -> WorkQueue {
        self.queue.clone()
    }

    /// Runs the controller until `shutdown` fires.
    ///
    /// Blocks through the whole lifecycle and returns an error only if the
    /// initial cache synchronization fails. In-flight reconciliations are
    /// allowed to finish before this returns.
    pub async fn run(
        self,
        shutdown: CancellationToken,
        workers: usize,
    ) -> Result<(), ControllerError> {
        info!("Waiting for caches to sync");
        self.wait_for_cache_sync(&shutdown).await?;

        info!(count = workers, "Starting workers");
        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    self.queue.clone(),
                    Arc::clone(&self.reconciler),
                    Arc::clone(&self.sink),
                ))
            })
            .collect();

        shutdown.cancelled().await;
        info!("Shutting down, draining in-flight work");
        self.queue.shut_down();

        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                error!("worker task panicked: {err}");
            }
        }
        info!("All workers terminated");
        Ok(())
    }

    async fn wait_for_cache_sync(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<(), ControllerError> {
        loop {
            if self.cache.has_synced() {
                return Ok(());
            }
            tokio::select! {
                () = shutdown.cancelled() => return Err(ControllerError::SyncFailed),
                () = tokio::time::sleep(SYNC_POLL_INTERVAL) => {}
            }
        }
    }
}

impl<R> std::fmt::Debug for Controller<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

/// One worker loop. Terminates only when the queue reports shutdown; per-key
/// failures stay contained inside their own iteration.
async fn worker_loop<R: Reconcile>(
    worker: usize,
    queue: WorkQueue,
    reconciler: Arc<R>,
    sink: Arc<dyn EventSink>,
) {
    debug!(worker, "worker started");
    while let Some(key) = queue.get().await {
        match reconciler.reconcile(&key).await {
            Outcome::Success => {
                queue.forget(&key);
                debug!(worker, %key, "Successfully synced");
            }
            Outcome::Requeue(err) => {
                sink.error(Some(&key), &err);
                queue.add_rate_limited(key.clone());
            }
            Outcome::TerminalDrop => {
                // Already reported by the reconcile function; retrying a key
                // that cannot be parsed would loop forever.
                queue.forget(&key);
            }
        }
        queue.done(&key);
    }
    debug!(worker, "worker stopped");
}
