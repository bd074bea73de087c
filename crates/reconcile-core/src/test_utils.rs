//! Test collaborators for exercising the engine without an informer.
//!
//! In-memory fakes for the cache, the mutator, and the event sink, plus a
//! minimal tracked object type with a marker field standing in for the
//! domain mutation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backoff::lock;
use crate::error::KeyError;
use crate::key::ObjectKey;
use crate::reconcile::{DriftPolicy, EventSink, Mutator};
use crate::store::{ObjectIdentity, ObjectStore};

/// Minimal tracked object: identity, a sync version, and a marker standing
/// in for the desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doc {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub marked: bool,
}

impl Doc {
    pub fn new(namespace: &str, name: &str, version: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            marked: false,
        }
    }

    pub fn with_marker(mut self) -> Self {
        self.marked = true;
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }
}

impl ObjectIdentity for Doc {
    fn object_key(&self) -> Result<ObjectKey, KeyError> {
        if self.name.is_empty() {
            return Err(KeyError::MissingName);
        }
        Ok(ObjectKey::from_parts(Some(&self.namespace), &self.name))
    }

    fn resource_version(&self) -> Option<&str> {
        (!self.version.is_empty()).then_some(self.version.as_str())
    }
}

/// In-memory cache fake.
#[derive(Debug, Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<ObjectKey, Doc>>,
    synced: AtomicBool,
}

impl FakeStore {
    /// A store that reports readiness immediately.
    pub fn synced() -> Self {
        let store = Self::default();
        store.synced.store(true, Ordering::SeqCst);
        store
    }

    pub fn insert(&self, doc: Doc) {
        let key = ObjectKey::from_parts(Some(&doc.namespace), &doc.name);
        lock(&self.objects).insert(key, doc);
    }

    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
    }
}

impl ObjectStore for FakeStore {
    type Object = Doc;

    fn get(&self, key: &ObjectKey) -> Option<Doc> {
        lock(&self.objects).get(key).cloned()
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

/// Drift policy over [`Doc`]: desired state is "marker set".
#[derive(Debug, Clone, Copy)]
pub struct MarkPolicy;

impl DriftPolicy for MarkPolicy {
    type Object = Doc;

    fn needs_update(&self, observed: &Doc) -> bool {
        !observed.marked
    }

    fn desired(&self, observed: &Doc) -> Doc {
        observed.clone().with_marker()
    }
}

/// Mutator mock that counts calls, remembers the last applied copy, and can
/// be told to fail its first N calls.
#[derive(Debug, Default)]
pub struct MockMutator {
    calls: AtomicUsize,
    fail_remaining: AtomicUsize,
    last_applied: Mutex<Option<Doc>>,
}

impl MockMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mutator whose first `n` calls fail transiently.
    pub fn failing_times(n: usize) -> Self {
        let mutator = Self::default();
        mutator.fail_remaining.store(n, Ordering::SeqCst);
        mutator
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_applied(&self) -> Option<Doc> {
        lock(&self.last_applied).clone()
    }
}

#[async_trait]
impl Mutator for MockMutator {
    type Object = Doc;

    async fn apply(&self, _namespace: Option<&str>, name: &str, desired: &Doc) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("injected transient failure applying {name}");
        }
        *lock(&self.last_applied) = Some(desired.clone());
        Ok(())
    }
}

/// Event sink that records everything it is told.
#[derive(Debug, Default)]
pub struct RecordingSink {
    errors: Mutex<Vec<String>>,
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    pub fn events(&self) -> Vec<String> {
        lock(&self.events).clone()
    }
}

impl EventSink for RecordingSink {
    fn error(&self, key: Option<&ObjectKey>, error: &anyhow::Error) {
        let key = key.map_or_else(|| "<none>".to_string(), ToString::to_string);
        lock(&self.errors).push(format!("{key}: {error}"));
    }

    fn event(&self, key: &ObjectKey, reason: &str, _note: &str) {
        lock(&self.events).push(format!("{key}: {reason}"));
    }
}
