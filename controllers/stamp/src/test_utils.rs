//! Test utilities for unit testing the stamp controller.

#[cfg(test)]
use k8s_openapi::api::apps::v1::Deployment;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Helper to create a test Deployment with the given identity and version.
#[cfg(test)]
pub fn deployment(namespace: &str, name: &str, resource_version: &str) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}
