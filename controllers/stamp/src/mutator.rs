//! The mutation side of reconciliation: writing the marker annotation back
//! through the API server.

use anyhow::Context as _;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use reconcile_core::Mutator;
use serde_json::json;
use tracing::debug;

/// Applies annotation changes with a merge patch.
///
/// A merge patch of the full annotation map is idempotent and safe to retry,
/// which is what lets the engine requeue failures blindly.
#[derive(Clone)]
pub struct AnnotationMutator {
    client: Client,
}

impl std::fmt::Debug for AnnotationMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationMutator").finish_non_exhaustive()
    }
}

impl AnnotationMutator {
    /// Creates a mutator writing through `client`.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Mutator for AnnotationMutator {
    type Object = Deployment;

    async fn apply(
        &self,
        namespace: Option<&str>,
        name: &str,
        desired: &Deployment,
    ) -> anyhow::Result<()> {
        let api: Api<Deployment> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::default_namespaced(self.client.clone()),
        };

        let patch = json!({
            "metadata": {
                "annotations": desired.metadata.annotations,
            }
        });
        debug!(name, ?namespace, "patching deployment annotations");
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("failed to patch annotations on deployment {name}"))?;
        Ok(())
    }
}
