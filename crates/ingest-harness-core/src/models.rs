//! Core data models used throughout Ingest Harness.
//!
//! These types describe what flows through a sync run: raw entities pulled
//! from a source, the artifacts derived from them by the transformer chain,
//! the version records used for change detection, and the immutable
//! [`SyncConfig`] a run executes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::dag::DagDefinition;

/// Payload of a raw entity: structured fields or opaque bytes (files).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityPayload {
    Fields { fields: Map<String, Value> },
    Bytes { content_type: String, data: Vec<u8> },
}

/// One unit of data yielded by a source.
///
/// `entity_id` is the source's natural key and is unique within the
/// source. `volatile` holds metadata that changes without the content
/// changing (fetch timestamps, ETags); it is excluded from the content
/// hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    pub entity_id: String,
    pub payload: EntityPayload,
    #[serde(default)]
    pub volatile: BTreeMap<String, Value>,
}

impl RawEntity {
    /// Build an entity from a JSON object. Non-object values are stored
    /// under a single `value` field.
    pub fn from_fields(entity_id: impl Into<String>, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            entity_id: entity_id.into(),
            payload: EntityPayload::Fields { fields },
            volatile: BTreeMap::new(),
        }
    }

    pub fn from_bytes(
        entity_id: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            payload: EntityPayload::Bytes {
                content_type: content_type.into(),
                data,
            },
            volatile: BTreeMap::new(),
        }
    }

    /// Attach a volatile metadata value (ignored by hashing).
    pub fn with_volatile(mut self, key: impl Into<String>, value: Value) -> Self {
        self.volatile.insert(key.into(), value);
        self
    }

    /// Render the payload as text: the `body` or `text` field when present,
    /// otherwise all fields as compact JSON. Bytes are decoded lossily.
    pub fn text(&self) -> String {
        match &self.payload {
            EntityPayload::Fields { fields } => {
                for key in ["body", "text", "content"] {
                    if let Some(Value::String(s)) = fields.get(key) {
                        return s.clone();
                    }
                }
                Value::Object(fields.clone()).to_string()
            }
            EntityPayload::Bytes { data, .. } => String::from_utf8_lossy(data).into_owned(),
        }
    }

    /// Fields carried along as artifact metadata.
    pub fn metadata(&self) -> Map<String, Value> {
        match &self.payload {
            EntityPayload::Fields { fields } => fields.clone(),
            EntityPayload::Bytes { content_type, data } => {
                let mut map = Map::new();
                map.insert("content_type".into(), Value::String(content_type.clone()));
                map.insert("size".into(), Value::from(data.len()));
                map
            }
        }
    }
}

/// Stored change-detection record for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityVersion {
    pub entity_id: String,
    pub source_id: String,
    pub content_hash: String,
    pub last_synced_at: DateTime<Utc>,
}

/// One derived chunk of an entity.
///
/// Destinations upsert artifacts idempotently under
/// `(entity_id, chunk_index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedArtifact {
    pub entity_id: String,
    pub chunk_index: u32,
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
}

impl TransformedArtifact {
    /// The single artifact a raw entity enters the transformer chain as.
    pub fn seed(entity: &RawEntity) -> Self {
        Self {
            entity_id: entity.entity_id.clone(),
            chunk_index: 0,
            text: entity.text(),
            metadata: entity.metadata(),
            vector: None,
        }
    }
}

/// Opaque incremental-sync cursor handed back to the source on the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor(pub String);

/// Immutable description of one sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Name of the sync (e.g. `"docs-to-vectors"`).
    pub name: String,
    /// Tenant the run belongs to. Credentials and version records are
    /// scoped to it.
    pub tenant_id: String,
    /// Source label, e.g. `"filesystem:docs"`.
    pub source_id: String,
    /// Credential connection used to authorize the source, if any.
    #[serde(default)]
    pub connection_id: Option<String>,
    pub dag: DagDefinition,
    /// Destination labels the DAG's destination nodes may target.
    pub destinations: Vec<String>,
    #[serde(default)]
    pub schedule: Option<String>,
}

impl SyncConfig {
    /// Key the version store and cursor records are partitioned by.
    ///
    /// Tenants sharing a source label never see each other's versions.
    pub fn version_scope(&self) -> String {
        format!("{}/{}", self.tenant_id, self.source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_prefers_body_field() {
        let e = RawEntity::from_fields("a", json!({"title": "T", "body": "hello"}));
        assert_eq!(e.text(), "hello");
    }

    #[test]
    fn text_falls_back_to_json() {
        let e = RawEntity::from_fields("a", json!({"n": 1}));
        assert_eq!(e.text(), r#"{"n":1}"#);
    }

    #[test]
    fn non_object_fields_are_wrapped() {
        let e = RawEntity::from_fields("a", json!("plain"));
        assert_eq!(e.metadata().get("value"), Some(&json!("plain")));
    }

    #[test]
    fn seed_artifact_starts_at_index_zero() {
        let e = RawEntity::from_bytes("f.txt", "text/plain", b"abc".to_vec());
        let a = TransformedArtifact::seed(&e);
        assert_eq!(a.chunk_index, 0);
        assert_eq!(a.text, "abc");
        assert_eq!(a.metadata.get("size"), Some(&json!(3)));
    }
}
