//! Object metadata shared by every stored resource

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Every kind the object store knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    Instance,
    Personality,
    McpServer,
    Namespace,
    Secret,
    ConfigMap,
    PersistentVolumeClaim,
    ServiceAccount,
    Workload,
    Service,
    ToolRegistration,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Instance => "Instance",
            Kind::Personality => "Personality",
            Kind::McpServer => "McpServer",
            Kind::Namespace => "Namespace",
            Kind::Secret => "Secret",
            Kind::ConfigMap => "ConfigMap",
            Kind::PersistentVolumeClaim => "PersistentVolumeClaim",
            Kind::ServiceAccount => "ServiceAccount",
            Kind::Workload => "Workload",
            Kind::Service => "Service",
            Kind::ToolRegistration => "ToolRegistration",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace/name pair identifying one object of a kind.
///
/// Cluster-scoped objects (namespaces) use an empty namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a cluster-scoped object
    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Metadata carried by every object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,

    /// Bumped by the store on every spec change
    #[serde(default)]
    pub generation: i64,

    /// Opaque version used for optimistic concurrency
    #[serde(default)]
    pub resource_version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Add a finalizer, returning whether the list changed
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Remove a finalizer, returning whether the list changed
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }

    /// Whether every `(key, value)` pair of the selector is present
    pub fn matches_labels(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// A typed object that can be persisted in the object store
pub trait Resource:
    Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: Kind;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }

    fn name(&self) -> &str {
        &self.meta().name
    }
}

/// Implements [`Resource`] for a struct with a `metadata: ObjectMeta` field.
#[macro_export]
macro_rules! impl_resource {
    ($ty:ty, $kind:expr) => {
        impl $crate::meta::Resource for $ty {
            const KIND: $crate::meta::Kind = $kind;

            fn meta(&self) -> &$crate::meta::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut $crate::meta::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalizer_bookkeeping() {
        let mut meta = ObjectMeta::new("ops", "a");
        assert!(meta.add_finalizer("warden.dev/finalizer"));
        assert!(!meta.add_finalizer("warden.dev/finalizer"));
        assert_eq!(meta.finalizers.len(), 1);
        assert!(meta.remove_finalizer("warden.dev/finalizer"));
        assert!(!meta.remove_finalizer("warden.dev/finalizer"));
    }

    #[test]
    fn test_label_selector_match() {
        let mut meta = ObjectMeta::new("ops", "a");
        meta.labels.insert("tier".into(), "gold".into());
        meta.labels.insert("app".into(), "x".into());

        let mut selector = BTreeMap::new();
        selector.insert("tier".to_string(), "gold".to_string());
        assert!(meta.matches_labels(&selector));

        selector.insert("app".to_string(), "y".to_string());
        assert!(!meta.matches_labels(&selector));
        assert!(meta.matches_labels(&BTreeMap::new()));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ObjectKey::new("ops", "a").to_string(), "ops/a");
        assert_eq!(ObjectKey::cluster("ns").to_string(), "ns");
    }
}
