//! In-memory [`VersionStore`] implementation for tests and dry runs.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. A poisoned lock is reported
//! as a version store error rather than a panic.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Result, SyncError};
use crate::models::{EntityVersion, SyncCursor};

use super::VersionStore;

type Key = (String, String);

/// In-memory version store.
#[derive(Default)]
pub struct InMemoryVersionStore {
    versions: RwLock<HashMap<Key, EntityVersion>>,
    cursors: RwLock<HashMap<String, SyncCursor>>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked entities across all scopes.
    pub fn len(&self) -> usize {
        self.versions.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> SyncError {
    SyncError::VersionStore("in-memory store lock poisoned".to_string())
}

fn key(scope: &str, entity_id: &str) -> Key {
    (scope.to_string(), entity_id.to_string())
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn get_hash(&self, scope: &str, entity_id: &str) -> Result<Option<String>> {
        let versions = self.versions.read().map_err(poisoned)?;
        Ok(versions
            .get(&key(scope, entity_id))
            .map(|v| v.content_hash.clone()))
    }

    async fn commit_hash(&self, scope: &str, entity_id: &str, hash: &str) -> Result<()> {
        let mut versions = self.versions.write().map_err(poisoned)?;
        versions.insert(
            key(scope, entity_id),
            EntityVersion {
                entity_id: entity_id.to_string(),
                source_id: scope.to_string(),
                content_hash: hash.to_string(),
                last_synced_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, scope: &str, entity_id: &str) -> Result<()> {
        let mut versions = self.versions.write().map_err(poisoned)?;
        versions.remove(&key(scope, entity_id));
        Ok(())
    }

    async fn get_version(&self, scope: &str, entity_id: &str) -> Result<Option<EntityVersion>> {
        let versions = self.versions.read().map_err(poisoned)?;
        Ok(versions.get(&key(scope, entity_id)).cloned())
    }

    async fn count(&self, scope: &str) -> Result<u64> {
        let versions = self.versions.read().map_err(poisoned)?;
        Ok(versions.keys().filter(|(s, _)| s == scope).count() as u64)
    }

    async fn get_cursor(&self, scope: &str) -> Result<Option<SyncCursor>> {
        let cursors = self.cursors.read().map_err(poisoned)?;
        Ok(cursors.get(scope).cloned())
    }

    async fn set_cursor(&self, scope: &str, cursor: &SyncCursor) -> Result<()> {
        let mut cursors = self.cursors.write().map_err(poisoned)?;
        cursors.insert(scope.to_string(), cursor.clone());
        Ok(())
    }
}
