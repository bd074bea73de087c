//! Drift detection for the marker annotation.

use k8s_openapi::api::apps::v1::Deployment;
use reconcile_core::DriftPolicy;

/// Desired state: every watched deployment carries the marker annotation
/// with the configured value.
#[derive(Debug, Clone)]
pub struct MarkerPolicy {
    annotation: String,
    value: String,
}

impl MarkerPolicy {
    /// Creates a policy for the given annotation key and value.
    pub fn new(annotation: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
            value: value.into(),
        }
    }
}

impl DriftPolicy for MarkerPolicy {
    type Object = Deployment;

    fn needs_update(&self, observed: &Deployment) -> bool {
        observed
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(&self.annotation))
            != Some(&self.value)
    }

    fn desired(&self, observed: &Deployment) -> Deployment {
        let mut desired = observed.clone();
        desired
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(self.annotation.clone(), self.value.clone());
        desired
    }
}
