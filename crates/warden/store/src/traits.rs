//! Object store trait definitions

use crate::error::Result;
use crate::object::DynamicObject;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use warden_types::{Kind, ObjectKey};

/// What happened to an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

/// A change notification delivered to watchers
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    pub object: DynamicObject,
}

impl WatchEvent {
    pub fn kind(&self) -> Kind {
        self.object.kind
    }

    pub fn key(&self) -> ObjectKey {
        self.object.key()
    }
}

/// Control-plane object store
///
/// Writes are conditional on `metadata.resource_version` when it is
/// non-zero. Deleting an object that carries finalizers only marks it with a
/// deletion timestamp; it disappears once the last finalizer is removed.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get an object by key
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Option<DynamicObject>>;

    /// List objects of a kind, optionally within one namespace, matching every label of `selector`
    async fn list(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>>;

    /// Create an object; fails if it already exists
    async fn create(&self, object: DynamicObject) -> Result<DynamicObject>;

    /// Replace metadata and spec; the stored status is kept
    async fn replace(&self, object: DynamicObject) -> Result<DynamicObject>;

    /// Replace only the status subresource
    async fn replace_status(&self, object: DynamicObject) -> Result<DynamicObject>;

    /// Delete an object by key
    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()>;

    /// Subscribe to change notifications
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}
