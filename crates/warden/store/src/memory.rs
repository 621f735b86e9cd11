//! In-memory object store for development and testing

use crate::error::{Result, StoreError};
use crate::object::DynamicObject;
use crate::traits::{ObjectStore, WatchEvent, WatchEventType};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};
use warden_types::{Kind, ObjectKey};

const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// Store operations that can be made to fail in tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Replace,
    ReplaceStatus,
    Delete,
}

#[derive(Debug, Clone)]
struct Fault {
    op: StoreOp,
    kind: Kind,
    name: Option<String>,
}

impl Fault {
    fn matches(&self, op: StoreOp, kind: Kind, name: Option<&str>) -> bool {
        self.op == op
            && self.kind == kind
            && match (&self.name, name) {
                (None, _) => true,
                (Some(expected), Some(actual)) => expected == actual,
                (Some(_), None) => false,
            }
    }
}

type ObjectMap = BTreeMap<(Kind, ObjectKey), DynamicObject>;

/// In-memory object store
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    objects: Arc<RwLock<ObjectMap>>,
    faults: Arc<RwLock<Vec<Fault>>>,
    version: Arc<AtomicU64>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            faults: Arc::new(RwLock::new(Vec::new())),
            version: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    /// Make `op` on `kind` fail with a backend error, for every object or only `name`
    pub async fn inject_fault(&self, op: StoreOp, kind: Kind, name: Option<&str>) {
        self.faults.write().await.push(Fault {
            op,
            kind,
            name: name.map(str::to_string),
        });
    }

    pub async fn clear_faults(&self) {
        self.faults.write().await.clear();
    }

    /// Number of stored objects of a kind
    pub async fn count(&self, kind: Kind) -> usize {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    async fn check_fault(&self, op: StoreOp, kind: Kind, name: Option<&str>) -> Result<()> {
        let faults = self.faults.read().await;
        if faults.iter().any(|f| f.matches(op, kind, name)) {
            return Err(StoreError::Backend(format!(
                "injected {op:?} failure for {kind}"
            )));
        }
        Ok(())
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn emit(&self, event_type: WatchEventType, object: &DynamicObject) {
        trace!(kind = %object.kind, key = %object.key(), ?event_type, "Watch event");
        // No receivers is fine
        let _ = self.events.send(WatchEvent {
            event_type,
            object: object.clone(),
        });
    }

    fn check_version(existing: &DynamicObject, incoming: &DynamicObject) -> Result<()> {
        let version = incoming.metadata.resource_version;
        if version != 0 && version != existing.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: incoming.kind,
                key: incoming.key(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Option<DynamicObject>> {
        self.check_fault(StoreOp::Get, kind, Some(&key.name)).await?;
        let objects = self.objects.read().await;
        Ok(objects.get(&(kind, key.clone())).cloned())
    }

    async fn list(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>> {
        self.check_fault(StoreOp::List, kind, None).await?;
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((k, key), _)| {
                *k == kind && namespace.map_or(true, |ns| key.namespace == ns)
            })
            .filter(|(_, object)| object.metadata.matches_labels(selector))
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(&self, mut object: DynamicObject) -> Result<DynamicObject> {
        self.check_fault(StoreOp::Create, object.kind, Some(&object.metadata.name))
            .await?;
        let mut objects = self.objects.write().await;
        let id = (object.kind, object.key());
        if objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                kind: object.kind,
                key: object.key(),
            });
        }

        object.metadata.resource_version = self.next_version();
        object.metadata.generation = 1;
        object.metadata.creation_timestamp = Some(Utc::now());
        object.metadata.deletion_timestamp = None;

        debug!(kind = %object.kind, key = %object.key(), "Created object");
        objects.insert(id, object.clone());
        self.emit(WatchEventType::Added, &object);
        Ok(object)
    }

    async fn replace(&self, mut object: DynamicObject) -> Result<DynamicObject> {
        self.check_fault(StoreOp::Replace, object.kind, Some(&object.metadata.name))
            .await?;
        let mut objects = self.objects.write().await;
        let id = (object.kind, object.key());
        let existing = objects.get(&id).ok_or_else(|| StoreError::NotFound {
            kind: object.kind,
            key: object.key(),
        })?;
        Self::check_version(existing, &object)?;

        object.set_status(existing.status().cloned());
        object.metadata.creation_timestamp = existing.metadata.creation_timestamp;
        object.metadata.deletion_timestamp = existing.metadata.deletion_timestamp;
        object.metadata.resource_version = existing.metadata.resource_version;
        object.metadata.generation = existing.metadata.generation;

        if object == *existing {
            return Ok(object);
        }
        if object.spec_body() != existing.spec_body() {
            object.metadata.generation += 1;
        }
        object.metadata.resource_version = self.next_version();

        if object.metadata.is_deleting() && object.metadata.finalizers.is_empty() {
            debug!(kind = %object.kind, key = %object.key(), "Last finalizer removed, deleting");
            objects.remove(&id);
            self.emit(WatchEventType::Deleted, &object);
            return Ok(object);
        }

        objects.insert(id, object.clone());
        self.emit(WatchEventType::Modified, &object);
        Ok(object)
    }

    async fn replace_status(&self, object: DynamicObject) -> Result<DynamicObject> {
        self.check_fault(
            StoreOp::ReplaceStatus,
            object.kind,
            Some(&object.metadata.name),
        )
        .await?;
        let mut objects = self.objects.write().await;
        let id = (object.kind, object.key());
        let existing = objects.get(&id).ok_or_else(|| StoreError::NotFound {
            kind: object.kind,
            key: object.key(),
        })?;
        Self::check_version(existing, &object)?;

        if existing.status() == object.status() {
            return Ok(existing.clone());
        }
        let mut updated = existing.clone();
        updated.set_status(object.status().cloned());
        updated.metadata.resource_version = self.next_version();

        objects.insert(id, updated.clone());
        self.emit(WatchEventType::Modified, &updated);
        Ok(updated)
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()> {
        self.check_fault(StoreOp::Delete, kind, Some(&key.name)).await?;
        let mut objects = self.objects.write().await;
        let id = (kind, key.clone());
        let Some(existing) = objects.get_mut(&id) else {
            return Err(StoreError::NotFound {
                kind,
                key: key.clone(),
            });
        };

        if !existing.metadata.finalizers.is_empty() {
            if !existing.metadata.is_deleting() {
                existing.metadata.deletion_timestamp = Some(Utc::now());
                existing.metadata.resource_version = self.next_version();
                let marked = existing.clone();
                debug!(%kind, %key, "Marked for deletion");
                self.emit(WatchEventType::Modified, &marked);
            }
            return Ok(());
        }

        if let Some(removed) = objects.remove(&id) {
            debug!(%kind, %key, "Deleted object");
            self.emit(WatchEventType::Deleted, &removed);
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::{ConfigMap, ObjectMeta, Workload};

    fn config_map(ns: &str, name: &str) -> DynamicObject {
        let mut cm = ConfigMap::default();
        cm.metadata = ObjectMeta::new(ns, name);
        DynamicObject::from_resource(&cm).unwrap()
    }

    #[tokio::test]
    async fn test_create_get_list() {
        let store = InMemoryStore::new();
        let created = store.create(config_map("a", "one")).await.unwrap();
        assert_eq!(created.metadata.generation, 1);
        assert!(created.metadata.resource_version > 0);

        store.create(config_map("b", "two")).await.unwrap();
        let in_a = store
            .list(Kind::ConfigMap, Some("a"), &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(in_a.len(), 1);

        let err = store.create(config_map("a", "one")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemoryStore::new();
        let created = store.create(config_map("a", "one")).await.unwrap();

        let mut first = created.clone();
        first.body.insert("data".into(), serde_json::json!({"k": "1"}));
        store.replace(first).await.unwrap();

        let mut stale = created;
        stale.body.insert("data".into(), serde_json::json!({"k": "2"}));
        assert!(store.replace(stale).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_replace_bumps_generation_only_on_spec_change() {
        let store = InMemoryStore::new();
        let created = store.create(config_map("a", "one")).await.unwrap();

        let mut relabelled = created.clone();
        relabelled.metadata.labels.insert("x".into(), "y".into());
        let relabelled = store.replace(relabelled).await.unwrap();
        assert_eq!(relabelled.metadata.generation, 1);

        let mut changed = relabelled;
        changed.body.insert("data".into(), serde_json::json!({"k": "v"}));
        let changed = store.replace(changed).await.unwrap();
        assert_eq!(changed.metadata.generation, 2);
    }

    #[tokio::test]
    async fn test_replace_keeps_status() {
        let store = InMemoryStore::new();
        let mut workload = Workload::default();
        workload.metadata = ObjectMeta::new("a", "w");
        let created = store
            .create(DynamicObject::from_resource(&workload).unwrap())
            .await
            .unwrap();

        let mut with_status = created.clone();
        with_status.set_status(Some(serde_json::json!({"availableReplicas": 1})));
        store.replace_status(with_status).await.unwrap();

        let mut spec_update = created;
        spec_update.metadata.resource_version = 0;
        spec_update.set_status(None);
        let updated = store.replace(spec_update).await.unwrap();
        assert_eq!(
            updated.status(),
            Some(&serde_json::json!({"availableReplicas": 1}))
        );
    }

    #[tokio::test]
    async fn test_finalizer_gates_deletion() {
        let store = InMemoryStore::new();
        let mut object = config_map("a", "one");
        object.metadata.finalizers.push("warden.dev/finalizer".into());
        store.create(object).await.unwrap();

        let key = ObjectKey::new("a", "one");
        store.delete(Kind::ConfigMap, &key).await.unwrap();
        let marked = store.get(Kind::ConfigMap, &key).await.unwrap().unwrap();
        assert!(marked.metadata.is_deleting());

        let mut cleared = marked;
        cleared.metadata.finalizers.clear();
        store.replace(cleared).await.unwrap();
        assert!(store.get(Kind::ConfigMap, &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .delete(Kind::Secret, &ObjectKey::new("a", "nope"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_fault_targets_one_name() {
        let store = InMemoryStore::new();
        store.create(config_map("a", "one")).await.unwrap();
        store.create(config_map("a", "two")).await.unwrap();
        store
            .inject_fault(StoreOp::Delete, Kind::ConfigMap, Some("one"))
            .await;

        assert!(matches!(
            store.delete(Kind::ConfigMap, &ObjectKey::new("a", "one")).await,
            Err(StoreError::Backend(_))
        ));
        store
            .delete(Kind::ConfigMap, &ObjectKey::new("a", "two"))
            .await
            .unwrap();

        store.clear_faults().await;
        store
            .delete(Kind::ConfigMap, &ObjectKey::new("a", "one"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_watch_sees_changes() {
        let store = InMemoryStore::new();
        let mut rx = store.watch();
        store.create(config_map("a", "one")).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, WatchEventType::Added);
        assert_eq!(event.key(), ObjectKey::new("a", "one"));
    }
}
