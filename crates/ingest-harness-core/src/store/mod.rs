//! Entity version storage abstraction.
//!
//! The [`VersionStore`] trait is the sole correctness mechanism for
//! incremental sync: an entity whose freshly computed content hash equals
//! the stored hash is skipped entirely. It also keeps the per-scope source
//! cursor, mirroring the checkpoint a source resumes from.
//!
//! Discipline callers must follow:
//!
//! - read ([`get_hash`](VersionStore::get_hash)) before processing
//! - write ([`commit_hash`](VersionStore::commit_hash)) only after every
//!   destination write for the entity succeeded
//! - never write speculatively
//!
//! Within one run each entity is owned by one worker, so implementations
//! need no per-key locking; they only need to be safe to share across
//! workers (`Send + Sync`).

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{EntityVersion, SyncCursor};

/// Abstract storage backend for entity versions and source cursors.
///
/// `scope` partitions records by tenant and source (see
/// [`SyncConfig::version_scope`](crate::models::SyncConfig::version_scope)).
/// Every failure is reported as [`SyncError::VersionStore`](crate::error::SyncError::VersionStore),
/// which is fatal to the run.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_hash`](VersionStore::get_hash) | Stored hash for an entity, if any |
/// | [`commit_hash`](VersionStore::commit_hash) | Record a successful sync of an entity |
/// | [`delete`](VersionStore::delete) | Forget an entity the source removed |
/// | [`get_version`](VersionStore::get_version) | Full version record |
/// | [`count`](VersionStore::count) | Number of tracked entities in a scope |
/// | [`get_cursor`](VersionStore::get_cursor) / [`set_cursor`](VersionStore::set_cursor) | Source checkpoint |
#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn get_hash(&self, scope: &str, entity_id: &str) -> Result<Option<String>>;

    async fn commit_hash(&self, scope: &str, entity_id: &str, hash: &str) -> Result<()>;

    async fn delete(&self, scope: &str, entity_id: &str) -> Result<()>;

    async fn get_version(&self, scope: &str, entity_id: &str) -> Result<Option<EntityVersion>>;

    async fn count(&self, scope: &str) -> Result<u64>;

    async fn get_cursor(&self, scope: &str) -> Result<Option<SyncCursor>>;

    async fn set_cursor(&self, scope: &str, cursor: &SyncCursor) -> Result<()>;
}
