//! The reconcile function and its collaborator seams.
//!
//! [`Reconciler`] is the level-triggered skeleton: split the key, re-read
//! the current snapshot from the cache, ask the domain [`DriftPolicy`]
//! whether anything needs to change, and if so hand a desired copy to the
//! [`Mutator`]. Every decision is made from current observed state, never
//! from the notification that woke the worker, which is what keeps the
//! function idempotent and at-least-once delivery safe.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::key::ObjectKey;
use crate::store::ObjectStore;

/// Result of one reconciliation attempt. Drives the queue bookkeeping done
/// by the worker loop.
#[derive(Debug)]
pub enum Outcome {
    /// Observed state converged (or the object is gone, which is the same
    /// thing). The key's rate-limit state is cleared.
    Success,
    /// A transient failure; the key is re-added with backoff.
    Requeue(anyhow::Error),
    /// The key itself is unusable and retrying can never help. Reported
    /// once, then dropped.
    TerminalDrop,
}

/// The domain-specific mutation API.
///
/// Implementations are assumed idempotent and safe to retry: applying the
/// same desired change twice must not produce duplicate side effects.
#[async_trait]
pub trait Mutator: Send + Sync {
    /// The tracked object type.
    type Object: Send + Sync;

    /// Applies the desired change for `namespace`/`name`.
    async fn apply(
        &self,
        namespace: Option<&str>,
        name: &str,
        desired: &Self::Object,
    ) -> anyhow::Result<()>;
}

/// The desired-vs-observed delta predicate plus the desired-copy
/// constructor.
///
/// `desired` receives the observed snapshot by reference and must return a
/// new value; the cache's copy is shared and read-only from the engine's
/// perspective.
pub trait DriftPolicy: Send + Sync {
    /// The tracked object type.
    type Object;

    /// True when the observed state has drifted from the desired state.
    fn needs_update(&self, observed: &Self::Object) -> bool;

    /// A copy of `observed` with the desired change applied.
    fn desired(&self, observed: &Self::Object) -> Self::Object;
}

/// Sink for non-fatal errors and human-readable lifecycle events.
///
/// Purely observational: nothing reported here affects control flow.
pub trait EventSink: Send + Sync {
    /// Reports a non-fatal error, with the offending key when one exists.
    fn error(&self, key: Option<&ObjectKey>, error: &anyhow::Error);

    /// Records a human-readable lifecycle event for `key`.
    fn event(&self, key: &ObjectKey, reason: &str, note: &str);
}

/// Default [`EventSink`] that writes through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn error(&self, key: Option<&ObjectKey>, error: &anyhow::Error) {
        match key {
            Some(key) => error!(%key, "reconciliation error: {error:#}"),
            None => error!("reconciliation error: {error:#}"),
        }
    }

    fn event(&self, key: &ObjectKey, reason: &str, note: &str) {
        info!(%key, reason, "{note}");
    }
}

/// Front door for the worker pool, so tests can drive the controller with a
/// fake reconcile function.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    /// Runs one reconciliation attempt for `key`.
    async fn reconcile(&self, key: &ObjectKey) -> Outcome;
}

/// The reconcile skeleton, generic over the cache, the mutator, and the
/// drift policy.
pub struct Reconciler<S, M, P> {
    store: Arc<S>,
    mutator: Arc<M>,
    policy: P,
    sink: Arc<dyn EventSink>,
}

impl<S, M, P> Reconciler<S, M, P>
where
    S: ObjectStore,
    M: Mutator<Object = S::Object>,
    P: DriftPolicy<Object = S::Object>,
{
    /// Creates a reconciler over the given collaborators.
    pub fn new(store: Arc<S>, mutator: Arc<M>, policy: P, sink: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            mutator,
            policy,
            sink,
        }
    }
}

impl<S, M, P> std::fmt::Debug for Reconciler<S, M, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<S, M, P> Reconcile for Reconciler<S, M, P>
where
    S: ObjectStore,
    M: Mutator<Object = S::Object> + 'static,
    P: DriftPolicy<Object = S::Object> + 'static,
{
    async fn reconcile(&self, key: &ObjectKey) -> Outcome {
        let (namespace, name) = match key.split() {
            Ok(parts) => parts,
            Err(err) => {
                // A malformed key can never resolve; report and drop.
                self.sink.error(Some(key), &anyhow::Error::new(err));
                return Outcome::TerminalDrop;
            }
        };

        // Always act on the freshest snapshot, not on whatever payload the
        // triggering notification carried.
        let Some(observed) = self.store.get(key) else {
            // Deleted between notification and reconciliation; nothing left
            // to converge.
            debug!(%key, "object not found in cache, treating as already deleted");
            return Outcome::Success;
        };

        if !self.policy.needs_update(&observed) {
            debug!(%key, "observed state already matches desired state");
            return Outcome::Success;
        }

        let desired = self.policy.desired(&observed);
        match self.mutator.apply(namespace, name, &desired).await {
            Ok(()) => {
                self.sink
                    .event(key, "Synced", "Successfully applied desired state");
                Outcome::Success
            }
            Err(err) => Outcome::Requeue(err),
        }
    }
}
