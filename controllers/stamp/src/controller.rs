//! Main controller implementation.
//!
//! Wires the engine to the cluster: a watcher-fed [`WatchCache`] doubles as
//! the engine's local cache and its change-notification source, an
//! [`EventBridge`] turns those notifications into queued keys, and the
//! engine's worker pool drives the marker annotation onto every watched
//! Deployment.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client};
use reconcile_core::{
    CacheReadiness, Controller as Engine, EventBridge, EventSink, LogSink, Reconciler,
    ResourceEvent, WorkQueue,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::WatchCache;
use crate::error::ControllerError;
use crate::identity::Watched;
use crate::mutator::AnnotationMutator;
use crate::policy::MarkerPolicy;

/// Buffered change notifications between the watcher and the bridge.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runtime configuration, read from the environment by `main`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace to watch; `None` watches all namespaces.
    pub namespace: Option<String>,
    /// Number of concurrent reconcile workers.
    pub workers: usize,
    /// Annotation key to stamp onto deployments.
    pub annotation: String,
    /// Annotation value marking a deployment as managed.
    pub value: String,
}

/// Main controller for stamping the marker annotation.
pub struct Controller {
    engine: Engine<Reconciler<WatchCache, AnnotationMutator, MarkerPolicy>>,
    watcher: JoinHandle<Result<(), ControllerError>>,
    bridge: JoinHandle<()>,
    workers: usize,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing stamp controller");

        let client = Client::try_default().await?;
        let api: Api<Deployment> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(client.clone(), ns),
            None => Api::all(client.clone()),
        };

        let cache = Arc::new(WatchCache::new());
        let sink: Arc<dyn EventSink> = Arc::new(LogSink);
        let queue = WorkQueue::new();

        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&cache),
            Arc::new(AnnotationMutator::new(client)),
            MarkerPolicy::new(config.annotation, config.value),
            Arc::clone(&sink),
        ));
        let engine = Engine::new(
            queue.clone(),
            Arc::clone(&cache) as Arc<dyn CacheReadiness>,
            reconciler,
        )
            .with_sink(Arc::clone(&sink));

        // Watcher feeds the cache and the bridge; the bridge stops on its
        // own once the watcher task (the channel's only sender) is gone.
        let (events_tx, events_rx) =
            mpsc::channel::<ResourceEvent<Watched>>(EVENT_CHANNEL_CAPACITY);
        let bridge = tokio::spawn(EventBridge::new(queue, sink).run(events_rx));
        let watcher = tokio::spawn(Arc::clone(&cache).run(api, events_tx));

        Ok(Self {
            engine,
            watcher,
            bridge,
            workers: config.workers,
        })
    }

    /// Runs the controller until `shutdown` fires or the watch fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ControllerError> {
        info!("Stamp controller running");

        let Self {
            engine,
            mut watcher,
            bridge,
            workers,
        } = self;

        let result = tokio::select! {
            result = engine.run(shutdown, workers) => result.map_err(ControllerError::from),
            result = &mut watcher => match result {
                Ok(watch_result) => watch_result.and(Err(ControllerError::Watch(
                    "deployment watcher stream ended".to_string(),
                ))),
                Err(e) => Err(ControllerError::Watch(format!(
                    "deployment watcher panicked: {e}"
                ))),
            },
        };

        watcher.abort();
        bridge.abort();
        result
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}
