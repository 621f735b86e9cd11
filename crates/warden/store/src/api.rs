//! Typed access to the object store

use crate::error::{Result, StoreError};
use crate::object::DynamicObject;
use crate::traits::ObjectStore;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;
use warden_types::{ObjectKey, ObjectMeta, Resource};

const MAX_WRITE_ATTEMPTS: usize = 5;

/// Outcome of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

/// Typed handle over one kind
pub struct Api<K> {
    store: Arc<dyn ObjectStore>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for Api<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _kind: PhantomData,
        }
    }
}

impl<K: Resource> Api<K> {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    /// Get an object, failing with `NotFound` when absent
    pub async fn get(&self, key: &ObjectKey) -> Result<K> {
        self.get_opt(key).await?.ok_or_else(|| StoreError::NotFound {
            kind: K::KIND,
            key: key.clone(),
        })
    }

    pub async fn get_opt(&self, key: &ObjectKey) -> Result<Option<K>> {
        match self.store.get(K::KIND, key).await? {
            Some(object) => Ok(Some(object.into_resource()?)),
            None => Ok(None),
        }
    }

    pub async fn list(
        &self,
        namespace: Option<&str>,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        self.store
            .list(K::KIND, namespace, selector)
            .await?
            .into_iter()
            .map(DynamicObject::into_resource)
            .collect()
    }

    pub async fn create(&self, resource: &K) -> Result<K> {
        let object = DynamicObject::from_resource(resource)?;
        self.store.create(object).await?.into_resource()
    }

    pub async fn replace(&self, resource: &K) -> Result<K> {
        let object = DynamicObject::from_resource(resource)?;
        self.store.replace(object).await?.into_resource()
    }

    pub async fn replace_status(&self, resource: &K) -> Result<K> {
        let object = DynamicObject::from_resource(resource)?;
        self.store.replace_status(object).await?.into_resource()
    }

    pub async fn delete(&self, key: &ObjectKey) -> Result<()> {
        self.store.delete(K::KIND, key).await
    }

    /// Delete, treating an already-absent object as success.
    ///
    /// Returns whether the object existed.
    pub async fn delete_ignore_missing(&self, key: &ObjectKey) -> Result<bool> {
        match self.store.delete(K::KIND, key).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<K: Resource + PartialEq> Api<K> {
    /// Create or update the object at `key` so that `mutate` has been applied.
    ///
    /// Conflicting concurrent writes are retried from a fresh read.
    pub async fn create_or_update<F>(&self, key: &ObjectKey, mutate: F) -> Result<(K, OperationResult)>
    where
        F: Fn(&mut K) + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.try_create_or_update(key, &mutate).await;
            match result {
                Err(StoreError::Conflict { .. } | StoreError::AlreadyExists { .. })
                    if attempt < MAX_WRITE_ATTEMPTS =>
                {
                    debug!(kind = %K::KIND, %key, attempt, "Write conflict, retrying");
                }
                other => return other,
            }
        }
    }

    /// Apply `mutate` to the latest stored status of the object at `key`.
    ///
    /// Conflicts are retried from a fresh read. Returns `None` when the
    /// object no longer exists.
    pub async fn patch_status<F>(&self, key: &ObjectKey, mutate: F) -> Result<Option<K>>
    where
        F: Fn(&mut K) + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Some(latest) = self.get_opt(key).await? else {
                return Ok(None);
            };
            let mut desired = latest.clone();
            mutate(&mut desired);
            if desired == latest {
                return Ok(Some(latest));
            }
            match self.replace_status(&desired).await {
                Err(StoreError::Conflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(kind = %K::KIND, %key, attempt, "Status conflict, retrying");
                }
                other => return other.map(Some),
            }
        }
    }

    /// Upsert a fully-built desired object.
    ///
    /// Labels, annotations and spec come from `desired`. Finalizers, status
    /// and store-managed metadata are kept from the live object.
    pub async fn apply(&self, desired: &K) -> Result<(K, OperationResult)> {
        let key = desired.key();
        let desired_object = DynamicObject::from_resource(desired)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self.get_opt(&key).await? {
                None => {
                    let mut fresh = K::default();
                    *fresh.meta_mut() = ObjectMeta::new(key.namespace.clone(), key.name.clone());
                    let fresh = overlay(&desired_object, &fresh)?;
                    self.create(&fresh)
                        .await
                        .map(|created| (created, OperationResult::Created))
                }
                Some(live) => {
                    let merged = overlay(&desired_object, &live)?;
                    if merged == live {
                        return Ok((live, OperationResult::Unchanged));
                    }
                    self.replace(&merged)
                        .await
                        .map(|updated| (updated, OperationResult::Updated))
                }
            };
            match result {
                Err(StoreError::Conflict { .. } | StoreError::AlreadyExists { .. })
                    if attempt < MAX_WRITE_ATTEMPTS =>
                {
                    debug!(kind = %K::KIND, %key, attempt, "Apply conflict, retrying");
                }
                other => return other,
            }
        }
    }

    async fn try_create_or_update<F>(&self, key: &ObjectKey, mutate: &F) -> Result<(K, OperationResult)>
    where
        F: Fn(&mut K) + Send + Sync,
    {
        match self.get_opt(key).await? {
            None => {
                let mut fresh = K::default();
                *fresh.meta_mut() = ObjectMeta::new(key.namespace.clone(), key.name.clone());
                mutate(&mut fresh);
                let created = self.create(&fresh).await?;
                Ok((created, OperationResult::Created))
            }
            Some(existing) => {
                let mut desired = existing.clone();
                mutate(&mut desired);
                if desired == existing {
                    return Ok((existing, OperationResult::Unchanged));
                }
                let updated = self.replace(&desired).await?;
                Ok((updated, OperationResult::Updated))
            }
        }
    }
}

/// `desired` with the status and store-managed metadata of `live`
fn overlay<K: Resource>(desired: &DynamicObject, live: &K) -> Result<K> {
    let live_meta = live.meta();
    let live_status = DynamicObject::from_resource(live)?.status().cloned();

    let mut merged = desired.clone();
    merged.set_status(live_status);
    merged.metadata.finalizers = live_meta.finalizers.clone();
    merged.metadata.generation = live_meta.generation;
    merged.metadata.resource_version = live_meta.resource_version;
    merged.metadata.creation_timestamp = live_meta.creation_timestamp;
    merged.metadata.deletion_timestamp = live_meta.deletion_timestamp;
    merged.into_resource()
}
