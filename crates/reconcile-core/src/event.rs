//! Bridge from change notifications to queued keys.
//!
//! Notifications arrive as a tagged [`ResourceEvent`] over an mpsc channel;
//! the kind of change is decided once here, at the boundary, and everything
//! downstream works purely in keys. The bridge's only coupling to the rest
//! of the engine is the queue's non-blocking `add`, so it can run on its own
//! task concurrently with the workers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::queue::WorkQueue;
use crate::reconcile::EventSink;
use crate::store::ObjectIdentity;

/// A single change notification from the local cache's subscription.
#[derive(Debug, Clone)]
pub enum ResourceEvent<O> {
    /// A previously unseen object appeared.
    Added(O),
    /// An existing object changed.
    Updated {
        /// The previous snapshot.
        old: O,
        /// The current snapshot.
        new: O,
    },
    /// An object disappeared.
    Deleted(O),
}

/// Subscribes to the change stream and enqueues affected keys.
pub struct EventBridge<O> {
    queue: WorkQueue,
    sink: Arc<dyn EventSink>,
    changed: Box<dyn Fn(&O, &O) -> bool + Send + Sync>,
}

impl<O> EventBridge<O>
where
    O: ObjectIdentity + Send + 'static,
{
    /// Creates a bridge feeding `queue`.
    ///
    /// The default change-worthiness predicate enqueues an update only when
    /// the old and new synchronization-version markers differ, filtering the
    /// cache's own resync echoes. An object without a version marker is
    /// always considered changed, since an echo cannot be proven.
    pub fn new(queue: WorkQueue, sink: Arc<dyn EventSink>) -> Self {
        Self {
            queue,
            sink,
            changed: Box::new(|old: &O, new: &O| {
                match (old.resource_version(), new.resource_version()) {
                    (Some(old_rv), Some(new_rv)) => old_rv != new_rv,
                    _ => true,
                }
            }),
        }
    }

    /// Replaces the change-worthiness predicate.
    ///
    /// Whether fields beyond the version marker (deletion timestamps,
    /// generation counters) should trigger reconciliation is domain policy;
    /// this is the hook for it.
    #[must_use]
    pub fn with_predicate<F>(mut self, changed: F) -> Self
    where
        F: Fn(&O, &O) -> bool + Send + Sync + 'static,
    {
        self.changed = Box::new(changed);
        self
    }

    /// Consumes the change stream until the sender side closes.
    pub async fn run(self, mut events: mpsc::Receiver<ResourceEvent<O>>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        debug!("change stream closed, event bridge stopping");
    }

    /// Dispatches a single notification.
    pub fn handle(&self, event: ResourceEvent<O>) {
        match event {
            ResourceEvent::Added(obj) => self.enqueue(&obj),
            ResourceEvent::Updated { old, new } => {
                if (self.changed)(&old, &new) {
                    self.enqueue(&new);
                } else {
                    self.trace_filtered(&new);
                }
            }
            // Level-triggered: a deletion needs no work, the reconcile
            // function observes the cache miss as already-converged.
            ResourceEvent::Deleted(_) => {}
        }
    }

    fn enqueue(&self, obj: &O) {
        match obj.object_key() {
            Ok(key) => self.queue.add(key),
            Err(err) => {
                // Never enqueue a key that cannot be parsed back into an
                // identity; report and drop the notification.
                self.sink.error(None, &anyhow::Error::new(err));
            }
        }
    }

    fn trace_filtered(&self, obj: &O) {
        if let Ok(key) = obj.object_key() {
            debug!(%key, "update carries no version change, skipping");
        }
    }
}

impl<O> std::fmt::Debug for EventBridge<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ObjectKey;
    use crate::test_utils::*;

    fn bridge(queue: &WorkQueue, sink: &Arc<RecordingSink>) -> EventBridge<Doc> {
        EventBridge::new(queue.clone(), Arc::clone(sink) as Arc<dyn EventSink>)
    }

    #[tokio::test]
    async fn test_added_objects_are_enqueued_unconditionally() {
        let queue = WorkQueue::new();
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge(&queue, &sink);

        bridge.handle(ResourceEvent::Added(Doc::new("ns", "x", "1")));

        assert_eq!(queue.get().await, Some(ObjectKey::from("ns/x")));
    }

    #[tokio::test]
    async fn test_resync_echo_updates_are_filtered() {
        let queue = WorkQueue::new();
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge(&queue, &sink);

        let doc = Doc::new("ns", "x", "7");
        bridge.handle(ResourceEvent::Updated {
            old: doc.clone(),
            new: doc,
        });

        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_version_changes_are_enqueued() {
        let queue = WorkQueue::new();
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge(&queue, &sink);

        let old = Doc::new("ns", "x", "7");
        let new = old.clone().with_version("8");
        bridge.handle(ResourceEvent::Updated { old, new });

        assert_eq!(queue.get().await, Some(ObjectKey::from("ns/x")));
    }

    #[tokio::test]
    async fn test_unversioned_updates_are_not_filtered() {
        let queue = WorkQueue::new();
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge(&queue, &sink);

        let doc = Doc::new("ns", "x", "");
        bridge.handle(ResourceEvent::Updated {
            old: doc.clone(),
            new: doc,
        });

        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_objects_are_reported_and_dropped() {
        let queue = WorkQueue::new();
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge(&queue, &sink);

        bridge.handle(ResourceEvent::Added(Doc::new("ns", "", "1")));

        assert!(queue.is_empty());
        assert_eq!(sink.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_deletions_enqueue_nothing() {
        let queue = WorkQueue::new();
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge(&queue, &sink);

        bridge.handle(ResourceEvent::Deleted(Doc::new("ns", "x", "1")));

        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_custom_predicate_overrides_default() {
        let queue = WorkQueue::new();
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge(&queue, &sink).with_predicate(|_, new: &Doc| !new.marked);

        let old = Doc::new("ns", "x", "1");
        let new = old.clone().with_version("2").with_marker();
        bridge.handle(ResourceEvent::Updated { old, new });

        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_the_channel() {
        let queue = WorkQueue::new();
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge(&queue, &sink);

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(bridge.run(rx));

        tx.send(ResourceEvent::Added(Doc::new("ns", "a", "1")))
            .await
            .unwrap();
        tx.send(ResourceEvent::Added(Doc::new("ns", "b", "1")))
            .await
            .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(queue.len(), 2);
    }
}
