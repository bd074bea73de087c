//! Watch-fed local cache of Deployments.
//!
//! Runs a `kube_runtime::watcher` stream, keeps the last-observed snapshot
//! of every deployment, and forwards change notifications into the engine's
//! event channel. The cache is updated before the notification is sent, so
//! a worker dequeuing the key always reads state at least as fresh as the
//! event that woke it.
//!
//! The watcher re-lists on reconnect (`Init`/`InitApply`/`InitDone`); the
//! cache replays the new listing and prunes entries that disappeared while
//! the watch was down, emitting `Deleted` for each so the snapshot never
//! drifts from the cluster.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::TryStreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::Api;
use kube_runtime::watcher;
use reconcile_core::{ObjectKey, ObjectStore, ResourceEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ControllerError;
use crate::identity::{deployment_key, Watched};

/// Last-observed snapshots plus the one-shot readiness signal.
#[derive(Debug, Default)]
pub struct WatchCache {
    objects: RwLock<HashMap<ObjectKey, Deployment>>,
    synced: AtomicBool,
    // Keys seen during an in-progress re-list; used to prune stale entries
    // on InitDone.
    relisting: Mutex<Option<HashSet<ObjectKey>>>,
}

impl WatchCache {
    /// Creates an empty, not-yet-synced cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Watches `api` until the stream fails, feeding snapshots into the
    /// cache and notifications into `events`.
    pub async fn run(
        self: Arc<Self>,
        api: Api<Deployment>,
        events: mpsc::Sender<ResourceEvent<Watched>>,
    ) -> Result<(), ControllerError> {
        info!("Starting deployment watcher");

        let mut stream = Box::pin(watcher(api, watcher::Config::default()));

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(format!("Watcher stream error: {e}")))?
        {
            self.handle(event, &events).await;
        }

        Ok(())
    }

    async fn handle(
        &self,
        event: watcher::Event<Deployment>,
        events: &mpsc::Sender<ResourceEvent<Watched>>,
    ) {
        match event {
            watcher::Event::Init => {
                debug!("deployment watcher (re)listing");
                *lock(&self.relisting) = Some(HashSet::new());
            }
            watcher::Event::InitApply(deployment) => {
                self.apply(deployment, events).await;
            }
            watcher::Event::InitDone => {
                self.prune_stale(events).await;
                if !self.synced.swap(true, Ordering::SeqCst) {
                    info!("Deployment cache synced");
                } else {
                    debug!("deployment watcher re-list complete");
                }
            }
            watcher::Event::Apply(deployment) => {
                self.apply(deployment, events).await;
            }
            watcher::Event::Delete(deployment) => {
                self.delete(&deployment, events).await;
            }
        }
    }

    async fn apply(
        &self,
        deployment: Deployment,
        events: &mpsc::Sender<ResourceEvent<Watched>>,
    ) {
        let Ok(key) = deployment_key(&deployment) else {
            warn!("ignoring deployment without a derivable key");
            return;
        };

        if let Some(seen) = lock(&self.relisting).as_mut() {
            seen.insert(key.clone());
        }

        let previous = write(&self.objects).insert(key, deployment.clone());
        let event = match previous {
            Some(old) => ResourceEvent::Updated {
                old: Watched(old),
                new: Watched(deployment),
            },
            None => ResourceEvent::Added(Watched(deployment)),
        };
        self.send(event, events).await;
    }

    async fn delete(
        &self,
        deployment: &Deployment,
        events: &mpsc::Sender<ResourceEvent<Watched>>,
    ) {
        let Ok(key) = deployment_key(deployment) else {
            warn!("ignoring deletion of deployment without a derivable key");
            return;
        };

        let removed = write(&self.objects).remove(&key);
        if let Some(old) = removed {
            debug!(%key, "deployment removed from cache");
            self.send(ResourceEvent::Deleted(Watched(old)), events).await;
        }
    }

    /// Drops entries the re-list no longer reported and emits `Deleted` for
    /// them.
    async fn prune_stale(&self, events: &mpsc::Sender<ResourceEvent<Watched>>) {
        let Some(seen) = lock(&self.relisting).take() else {
            return;
        };

        let stale: Vec<Deployment> = {
            let mut objects = write(&self.objects);
            let keys: Vec<ObjectKey> = objects
                .keys()
                .filter(|key| !seen.contains(key))
                .cloned()
                .collect();
            keys.iter().filter_map(|key| objects.remove(key)).collect()
        };

        for old in stale {
            self.send(ResourceEvent::Deleted(Watched(old)), events).await;
        }
    }

    async fn send(
        &self,
        event: ResourceEvent<Watched>,
        events: &mpsc::Sender<ResourceEvent<Watched>>,
    ) {
        if events.send(event).await.is_err() {
            debug!("event channel closed, dropping notification");
        }
    }
}

impl ObjectStore for WatchCache {
    type Object = Deployment;

    fn get(&self, key: &ObjectKey) -> Option<Deployment> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn write<K, V>(lock: &RwLock<HashMap<K, V>>) -> std::sync::RwLockWriteGuard<'_, HashMap<K, V>> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
