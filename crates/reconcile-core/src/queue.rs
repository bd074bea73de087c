//! Deduplicating, rate-limiting work queue of resource keys.
//!
//! The queue enforces the engine's core correctness property: a key is held
//! by at most one worker at a time, and re-adds of a key that is pending or
//! in-flight collapse into a single pending occurrence. That mutual
//! exclusion is what makes reconciliation safe to parallelize, not merely a
//! throughput optimization.
//!
//! Bookkeeping follows the classic three-set scheme: `pending` is the
//! roughly-FIFO hand-out order, `dirty` marks keys that need (re)processing,
//! and `processing` marks keys currently held by a worker. An `add` while a
//! key is processing leaves it in `dirty` only; `done` promotes it back to
//! `pending`.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

use crate::backoff::{BackoffPolicy, RateLimiter, lock};
use crate::key::ObjectKey;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    shutting_down: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<QueueState>,
    wakeup: Notify,
    limiter: RateLimiter,
}

/// Shared handle to the work queue.
///
/// Clones are cheap and all refer to the same queue; the event bridge, every
/// worker, and the delayed re-add tasks each hold one.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl WorkQueue {
    /// Creates a queue with the default backoff policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backoff(BackoffPolicy::default())
    }

    /// Creates a queue whose rate-limited re-adds follow `policy`.
    #[must_use]
    pub fn with_backoff(policy: BackoffPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                wakeup: Notify::new(),
                limiter: RateLimiter::new(policy),
            }),
        }
    }

    /// Enqueues `key` unless it is already pending or in-flight.
    ///
    /// Idempotent and non-blocking; safe to call from notification callbacks
    /// running concurrently with the workers. A no-op once the queue is
    /// shutting down.
    pub fn add(&self, key: ObjectKey) {
        let mut state = lock(&self.inner.state);
        if state.shutting_down {
            return;
        }
        if !state.dirty.insert(key.clone()) {
            // Already pending, or re-added while in-flight; either way the
            // occurrence collapses into the existing dirty mark.
            return;
        }
        if state.processing.contains(&key) {
            // Deferred: done() will promote it back to pending.
            return;
        }
        state.pending.push_back(key);
        drop(state);
        self.inner.wakeup.notify_one();
    }

    /// Blocks until a key is available, marking it in-flight.
    ///
    /// Returns `None` once the queue has been shut down; workers use that as
    /// their termination signal. While the returned key is in-flight,
    /// concurrent `add`s of it are deferred rather than duplicated.
    pub async fn get(&self) -> Option<ObjectKey> {
        loop {
            // Register for a wakeup before inspecting state; a notify landing
            // between the check and the await would otherwise be lost.
            let notified = self.inner.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = lock(&self.inner.state);
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.pending.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    if !state.pending.is_empty() {
                        // More work remains; pass the wakeup along so a
                        // second blocked worker also gets a chance.
                        self.inner.wakeup.notify_one();
                    }
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Marks `key` no longer in-flight.
    ///
    /// If an `add` arrived while the key was being processed, the key is
    /// promoted back to pending here.
    pub fn done(&self, key: &ObjectKey) {
        let mut state = lock(&self.inner.state);
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.pending.push_back(key.clone());
            drop(state);
            self.inner.wakeup.notify_one();
        }
    }

    /// Re-adds `key` after its computed backoff delay.
    ///
    /// Each call counts one more consecutive failure for the key; the delay
    /// grows exponentially up to the configured cap until [`Self::forget`]
    /// resets the streak.
    pub fn add_rate_limited(&self, key: ObjectKey) {
        let delay = self.inner.limiter.next_delay(&key);
        debug!(%key, ?delay, "requeueing after backoff");
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Clears the rate-limit state for `key`.
    ///
    /// Called on success and on terminal drops, so the next failure streak
    /// starts over from the base delay.
    pub fn forget(&self, key: &ObjectKey) {
        self.inner.limiter.forget(key);
    }

    /// Consecutive failures currently recorded for `key`.
    #[must_use]
    pub fn retries(&self, key: &ObjectKey) -> u32 {
        self.inner.limiter.retries(key)
    }

    /// Number of keys waiting to be handed out (in-flight keys excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.state).pending.len()
    }

    /// True when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shuts the queue down.
    ///
    /// Blocked and future [`Self::get`] calls return `None`; later `add`s
    /// are dropped. Keys already in-flight drain normally through
    /// [`Self::done`].
    pub fn shut_down(&self) {
        let mut state = lock(&self.inner.state);
        state.shutting_down = true;
        drop(state);
        self.inner.wakeup.notify_waiters();
    }

    /// True once [`Self::shut_down`] has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        lock(&self.inner.state).shutting_down
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
