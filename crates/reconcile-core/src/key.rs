//! Resource keys.
//!
//! A key is the stable `namespace/name` identity of a tracked object and the
//! sole unit of work in the engine. Object payloads are never queued; the
//! reconcile function re-reads the current snapshot from the cache so it
//! always acts on fresh state, no matter how many notifications coalesced
//! into one queued key.

use std::fmt;

use crate::error::KeyError;

/// Stable identifier for a trackable object.
///
/// Namespaced objects use `namespace/name`, cluster-scoped objects a bare
/// `name`. Construction from arbitrary strings is deliberately unvalidated;
/// [`ObjectKey::split`] validates at reconcile time and a key that fails to
/// split is dropped terminally rather than retried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Builds a key from an optional namespace and a name.
    #[must_use]
    pub fn from_parts(namespace: Option<&str>, name: &str) -> Self {
        match namespace {
            Some(ns) if !ns.is_empty() => Self(format!("{ns}/{name}")),
            _ => Self(name.to_string()),
        }
    }

    /// Splits the key back into `(namespace, name)`.
    ///
    /// Fails on an empty name or more than one `/`; callers treat that as a
    /// terminal error since a malformed key can never resolve.
    pub fn split(&self) -> Result<(Option<&str>, &str), KeyError> {
        let mut parts = self.0.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) if !name.is_empty() => Ok((None, name)),
            (Some(ns), Some(name), None) if !ns.is_empty() && !name.is_empty() => {
                Ok((Some(ns), name))
            }
            _ => Err(KeyError::Malformed(self.0.clone())),
        }
    }

    /// The raw string form of the key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ObjectKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for ObjectKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}
