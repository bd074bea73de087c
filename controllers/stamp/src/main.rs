//! Stamp Controller
//!
//! Watches Deployments and converges each one toward carrying a marker
//! annotation, using the `reconcile-core` engine: a watch-fed local cache,
//! a deduplicating rate-limited work queue, and a pool of reconcile workers
//! that retry transient failures with backoff.

mod cache;
mod controller;
mod error;
mod identity;
mod mutator;
mod policy;
mod test_utils;

use std::env;

use controller::{Config, Controller};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ControllerError;

/// Default annotation key stamped onto watched deployments.
const DEFAULT_ANNOTATION: &str = "stamp-controller/managed";

/// Default annotation value.
const DEFAULT_VALUE: &str = "true";

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting stamp controller");

    // Load configuration from environment variables
    let namespace = env::var("WATCH_NAMESPACE").ok();
    let workers = match env::var("WORKERS") {
        Ok(raw) => raw.parse::<usize>().ok().filter(|&n| n > 0).ok_or_else(|| {
            ControllerError::InvalidConfig(format!(
                "WORKERS must be a positive integer, got {raw:?}"
            ))
        })?,
        Err(_) => 2,
    };
    let annotation =
        env::var("MARKER_ANNOTATION").unwrap_or_else(|_| DEFAULT_ANNOTATION.to_string());
    let value = env::var("MARKER_VALUE").unwrap_or_else(|_| DEFAULT_VALUE.to_string());

    info!("Configuration:");
    info!("  Namespace: {}", namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Workers: {workers}");
    info!("  Marker: {annotation}={value}");

    // Cancel everything on ctrl-c / SIGTERM-forwarded interrupt.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                shutdown.cancel();
            }
        });
    }

    // Initialize and run controller
    let controller = Controller::new(Config {
        namespace,
        workers,
        annotation,
        value,
    })
    .await?;
    controller.run(shutdown).await?;

    Ok(())
}
