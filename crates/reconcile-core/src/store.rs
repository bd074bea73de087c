//! Collaborator traits for the local cache and key derivation.
//!
//! The engine never fetches objects itself. A watch-fed cache owned by the
//! caller implements [`ObjectStore`]; the engine reads point lookups from it
//! and waits on its readiness signal, nothing more. These traits exist so
//! unit tests can substitute in-memory fakes for the real informer plumbing.

use crate::error::KeyError;
use crate::key::ObjectKey;

/// Read-only view of the last-observed snapshot store.
///
/// Implementations are shared across all workers; `get` must hand out a
/// clone (or otherwise owned copy) so no caller can mutate the cached entry
/// in place.
pub trait ObjectStore: Send + Sync + 'static {
    /// The tracked object type.
    type Object: Clone + Send + Sync + 'static;

    /// Point lookup by key. `None` means the object is gone, which the
    /// reconcile function treats as already-converged.
    fn get(&self, key: &ObjectKey) -> Option<Self::Object>;

    /// One-shot readiness signal: true once the initial list has been fully
    /// replayed into the cache.
    fn has_synced(&self) -> bool;
}

/// The narrow slice of [`ObjectStore`] the controller lifecycle needs while
/// waiting for startup synchronization.
pub trait CacheReadiness: Send + Sync {
    /// See [`ObjectStore::has_synced`].
    fn has_synced(&self) -> bool;
}

impl<S: ObjectStore> CacheReadiness for S {
    fn has_synced(&self) -> bool {
        ObjectStore::has_synced(self)
    }
}

/// Key derivation for tracked objects.
///
/// `object_key` must be total and injective over valid objects and fail
/// cleanly on malformed ones; the event bridge reports the failure and drops
/// the notification rather than enqueueing an unparsable key.
pub trait ObjectIdentity {
    /// Derives the stable `namespace/name` key for this object.
    fn object_key(&self) -> Result<ObjectKey, KeyError>;

    /// The synchronization-version marker used by the default
    /// change-worthiness predicate to filter resync echoes.
    fn resource_version(&self) -> Option<&str>;
}
