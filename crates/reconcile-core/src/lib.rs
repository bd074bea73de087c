//! Level-triggered reconciliation engine
//!
//! The reusable core of a controller: a deduplicating, rate-limiting work
//! queue of object keys, an event bridge that turns change notifications
//! into queued keys, and a pool of workers that drive an idempotent
//! reconcile function until observed state converges on desired state.
//!
//! Data flow: change notification -> [`EventBridge`] -> [`WorkQueue`] ->
//! worker pool -> [`Reconciler`] -> (cache read, mutator write). Success
//! clears the key, failure requeues it with exponential backoff, so no
//! update is ever lost permanently.
//!
//! The engine is informer-independent. The local cache, the key derivation,
//! and the mutation API are collaborators reached only through the traits in
//! [`store`] and [`reconcile`], so the whole pipeline can be exercised with
//! in-memory fakes.
//!
//! # Wiring
//!
//! A controller binary assembles the pieces like this:
//!
//! 1. Build a [`WorkQueue`] and a [`Controller`] over the cache, a
//!    [`Reconciler`] (or any [`Reconcile`] implementation), and an
//!    [`EventSink`].
//! 2. Spawn an [`EventBridge`] task consuming the cache's change stream and
//!    feeding the same queue.
//! 3. Call [`Controller::run`] with a cancellation token and a worker
//!    count; it blocks until the token fires and returns an error only if
//!    the initial cache synchronization fails.
//!
//! Two guarantees matter for correctness: a key is processed by at most one
//! worker at a time, and reconciliation always re-reads current state from
//! the cache. Together they make any number of coalesced notifications safe
//! to collapse into a single wake-up.

pub mod backoff;
pub mod controller;
pub mod error;
pub mod event;
pub mod key;
pub mod queue;
pub mod reconcile;
pub mod store;

#[cfg(test)]
mod test_utils;

pub use backoff::{BackoffPolicy, RateLimiter};
pub use controller::Controller;
pub use error::{ControllerError, KeyError};
pub use event::{EventBridge, ResourceEvent};
pub use key::ObjectKey;
pub use queue::WorkQueue;
pub use reconcile::{DriftPolicy, EventSink, LogSink, Mutator, Outcome, Reconcile, Reconciler};
pub use store::{CacheReadiness, ObjectIdentity, ObjectStore};
