//! Key derivation for watched Deployments.

use k8s_openapi::api::apps::v1::Deployment;
use reconcile_core::{KeyError, ObjectIdentity, ObjectKey};

/// Derives the stable `namespace/name` key for a deployment.
///
/// Fails cleanly when the object carries no name; such a notification is
/// reported and dropped rather than queued.
pub fn deployment_key(deployment: &Deployment) -> Result<ObjectKey, KeyError> {
    let name = deployment
        .metadata
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or(KeyError::MissingName)?;
    Ok(ObjectKey::from_parts(
        deployment.metadata.namespace.as_deref(),
        name,
    ))
}

/// Watch payload carried across the event bridge.
///
/// `ObjectIdentity` is a foreign trait here, so the upstream `Deployment`
/// type gets it through this local wrapper.
#[derive(Debug, Clone)]
pub struct Watched(pub Deployment);

impl ObjectIdentity for Watched {
    fn object_key(&self) -> Result<ObjectKey, KeyError> {
        deployment_key(&self.0)
    }

    fn resource_version(&self) -> Option<&str> {
        self.0.metadata.resource_version.as_deref()
    }
}
