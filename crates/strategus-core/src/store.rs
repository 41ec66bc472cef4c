//! Persistence port for entity state.
//!
//! The world only needs a transactional record store with per-entity
//! optimistic versioning. [`EntityStore`] is that contract; [`InMemoryStore`]
//! is the reference implementation used by tests and the runner.
//!
//! # Versioning
//!
//! Every committed mutation bumps the record's version by one. A write states
//! the version it was based on; if the stored version differs the write is
//! rejected with [`StoreError::Conflict`] and nothing is overwritten.
//! [`EntityStore::save_batch`] applies several such writes atomically: either
//! every version check passes and all records are written, or none are.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::entity::{Entity, EntityId};
use crate::error::StoreError;

/// One write of a batch: the new record and the version it was based on.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedWrite {
    /// Record to store
    pub entity: Entity,
    /// Version the change was based on
    pub expected_version: u64,
}

impl VersionedWrite {
    /// Write based on the entity's own recorded version.
    #[must_use]
    pub fn from_current(entity: Entity) -> Self {
        let expected_version = entity.version();
        Self {
            entity,
            expected_version,
        }
    }
}

/// Durable storage of entities between ticks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Load the committed record.
    async fn load(&self, id: EntityId) -> Result<Entity, StoreError>;

    /// Insert a new record at version 1. Returns the assigned version.
    async fn create(&self, entity: &Entity) -> Result<u64, StoreError>;

    /// Overwrite a record if its committed version equals `expected_version`.
    /// Returns the new version.
    async fn save(&self, entity: &Entity, expected_version: u64) -> Result<u64, StoreError>;

    /// Apply several versioned writes atomically. Returns the new versions in
    /// input order.
    async fn save_batch(&self, writes: &[VersionedWrite]) -> Result<Vec<u64>, StoreError>;

    /// Every non-archived record, ordered by id.
    async fn list_active(&self) -> Result<Vec<Entity>, StoreError>;
}

/// Entity store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<BTreeMap<EntityId, Entity>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, archived ones included.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True if the store holds no record.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check(records: &BTreeMap<EntityId, Entity>, write: &VersionedWrite) -> Result<(), StoreError> {
        let id = write.entity.id();
        let current = records.get(&id).ok_or(StoreError::NotFound(id))?;
        if current.version() != write.expected_version {
            return Err(StoreError::Conflict {
                id,
                expected: write.expected_version,
                actual: current.version(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn load(&self, id: EntityId) -> Result<Entity, StoreError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn create(&self, entity: &Entity) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let id = entity.id();
        if records.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        let mut stored = entity.clone();
        stored.set_version(1);
        records.insert(id, stored);
        Ok(1)
    }

    async fn save(&self, entity: &Entity, expected_version: u64) -> Result<u64, StoreError> {
        let write = VersionedWrite {
            entity: entity.clone(),
            expected_version,
        };
        let mut versions = self.save_batch(std::slice::from_ref(&write)).await?;
        versions
            .pop()
            .ok_or_else(|| StoreError::Backend("empty batch result".into()))
    }

    async fn save_batch(&self, writes: &[VersionedWrite]) -> Result<Vec<u64>, StoreError> {
        let mut records = self.records.write().await;

        // Validate everything before touching anything.
        for write in writes {
            Self::check(&records, write)?;
        }
        for (i, write) in writes.iter().enumerate() {
            if writes[..i].iter().any(|w| w.entity.id() == write.entity.id()) {
                return Err(StoreError::Backend(format!(
                    "entity {} written twice in one batch",
                    write.entity.id()
                )));
            }
        }

        let mut versions = Vec::with_capacity(writes.len());
        for write in writes {
            let version = write.expected_version + 1;
            let mut stored = write.entity.clone();
            stored.set_version(version);
            records.insert(stored.id(), stored);
            versions.push(version);
        }
        Ok(versions)
    }

    async fn list_active(&self) -> Result<Vec<Entity>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|entity| !entity.is_archived())
            .cloned()
            .collect())
    }
}
