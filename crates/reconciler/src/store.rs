//! Object store seam.
//!
//! The harness reads RisingWave objects and writes their status through an
//! [`ObjectStore`]. Status writes use optimistic concurrency on the
//! resource version: a write based on a stale read fails with
//! [`StoreError::Conflict`].
//!
//! The in-memory store also broadcasts the key of every object it writes,
//! which stands in for a watch.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::error::StoreError;
use crate::types::{ObjectKey, RisingWave, RisingWaveStatus};

/// Access to RisingWave objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Load an object by key.
    async fn get(&self, key: &ObjectKey) -> Result<RisingWave, StoreError>;

    /// Replace the status of `risingwave`, failing if the stored object has
    /// moved past its resource version.
    async fn update_status(
        &self,
        risingwave: &RisingWave,
        status: &RisingWaveStatus,
    ) -> Result<(), StoreError>;

    /// Keys of every stored object.
    async fn keys(&self) -> Result<Vec<ObjectKey>, StoreError>;
}

const CHANGES_CAPACITY: usize = 1024;

/// Object store backed by a map.
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<ObjectKey, RisingWave>>,
    changes: broadcast::Sender<ObjectKey>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::with_objects([])
    }
}

impl InMemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given objects.
    pub fn with_objects(objects: impl IntoIterator<Item = RisingWave>) -> Self {
        let (changes, _) = broadcast::channel(CHANGES_CAPACITY);
        Self {
            objects: RwLock::new(objects.into_iter().map(|rw| (rw.key(), rw)).collect()),
            changes,
        }
    }

    /// Receive the key of every object written from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ObjectKey> {
        self.changes.subscribe()
    }

    fn notify(&self, key: ObjectKey) {
        // No subscriber is fine.
        let _ = self.changes.send(key);
    }

    /// Insert or replace an object, bumping its resource version.
    ///
    /// The generation is bumped too when the spec changed.
    pub async fn apply(&self, mut risingwave: RisingWave) {
        let mut objects = self.objects.write().await;
        let key = risingwave.key();
        if let Some(existing) = objects.get(&key) {
            risingwave.metadata.resource_version =
                existing.metadata.resource_version.saturating_add(1);
            risingwave.metadata.generation = if existing.spec == risingwave.spec {
                existing.metadata.generation
            } else {
                existing.metadata.generation.saturating_add(1)
            };
            risingwave.status = existing.status.clone();
        }
        objects.insert(key.clone(), risingwave);
        self.notify(key);
    }

    /// Request deletion of an object.
    pub async fn mark_deleted(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        let object = objects.get_mut(key).ok_or_else(|| not_found(key))?;
        object.metadata.deletion_timestamp = Some(chrono::Utc::now());
        object.metadata.resource_version = object.metadata.resource_version.saturating_add(1);
        self.notify(key.clone());
        Ok(())
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

fn not_found(key: &ObjectKey) -> StoreError {
    StoreError::NotFound {
        key: key.to_string(),
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<RisingWave, StoreError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| not_found(key))
    }

    async fn update_status(
        &self,
        risingwave: &RisingWave,
        status: &RisingWaveStatus,
    ) -> Result<(), StoreError> {
        let key = risingwave.key();
        let mut objects = self.objects.write().await;
        let stored = objects.get_mut(&key).ok_or_else(|| not_found(&key))?;

        let expected = risingwave.metadata.resource_version;
        if stored.metadata.resource_version != expected {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
            });
        }

        stored.status = status.clone();
        stored.metadata.resource_version = expected.saturating_add(1);
        drop(objects);
        self.notify(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<ObjectKey>, StoreError> {
        Ok(self.objects.read().await.keys().cloned().collect())
    }
}
