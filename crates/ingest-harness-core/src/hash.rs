//! Deterministic content hashing for change detection.
//!
//! The hash is SHA-256 over a canonical serialization of the entity's
//! semantic content:
//!
//! ```text
//! "ingest-harness/v1\n" || entity_id || "\n" || canonical(payload)
//! ```
//!
//! `canonical` writes JSON with object keys sorted bytewise, no
//! insignificant whitespace, and serde_json's string escaping. Byte payloads
//! are written as `bytes:<content_type>:` followed by the raw bytes. The
//! `volatile` map is never hashed.
//!
//! The format does not depend on `serde_json`'s map ordering (which changes
//! with the `preserve_order` feature), so the digest is stable across builds,
//! restarts, and any other implementation that follows the same rules.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::{EntityPayload, RawEntity};

const HASH_DOMAIN: &[u8] = b"ingest-harness/v1\n";

/// Compute the hex-encoded content hash of an entity.
pub fn content_hash(entity: &RawEntity) -> String {
    let mut hasher = Sha256::new();
    hasher.update(HASH_DOMAIN);
    hasher.update(entity.entity_id.as_bytes());
    hasher.update(b"\n");
    match &entity.payload {
        EntityPayload::Fields { fields } => {
            let mut buf = Vec::new();
            write_canonical_object(fields.iter(), &mut buf);
            hasher.update(&buf);
        }
        EntityPayload::Bytes { content_type, data } => {
            hasher.update(b"bytes:");
            hasher.update(content_type.as_bytes());
            hasher.update(b":");
            hasher.update(data);
        }
    }
    hex::encode(hasher.finalize())
}

/// Canonical JSON encoding with sorted keys.
pub fn canonical_json(value: &Value) -> String {
    let mut buf = Vec::new();
    write_canonical(value, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => write_canonical_object(map.iter(), out),
    }
}

fn write_canonical_object<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
    out: &mut Vec<u8>,
) {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    out.push(b'{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        write_string(key, out);
        out.push(b':');
        write_canonical(value, out);
    }
    out.push(b'}');
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    // serde_json string escaping is deterministic
    match serde_json::to_string(s) {
        Ok(escaped) => out.extend_from_slice(escaped.as_bytes()),
        Err(_) => out.extend_from_slice(s.as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_volatile_metadata_ignored() {
        let a = RawEntity::from_fields("a", json!({"title": "x", "body": "y"}))
            .with_volatile("fetched_at", json!("2024-01-01T00:00:00Z"));
        let b = RawEntity::from_fields("a", json!({"title": "x", "body": "y"}))
            .with_volatile("fetched_at", json!("2025-06-30T12:00:00Z"));
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_key_order_irrelevant() {
        let a = RawEntity::from_fields("a", json!({"x": 1, "y": {"b": 2, "a": 1}}));
        let mut fields = serde_json::Map::new();
        fields.insert("y".into(), json!({"a": 1, "b": 2}));
        fields.insert("x".into(), json!(1));
        let b = RawEntity {
            entity_id: "a".into(),
            payload: EntityPayload::Fields { fields },
            volatile: Default::default(),
        };
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_content_change_changes_hash() {
        let a = RawEntity::from_fields("a", json!({"body": "one"}));
        let b = RawEntity::from_fields("a", json!({"body": "two"}));
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_entity_id_is_part_of_hash() {
        let a = RawEntity::from_fields("a", json!({"body": "same"}));
        let b = RawEntity::from_fields("b", json!({"body": "same"}));
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_bytes_hash_includes_content_type() {
        let a = RawEntity::from_bytes("f", "text/plain", b"abc".to_vec());
        let b = RawEntity::from_bytes("f", "text/markdown", b"abc".to_vec());
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        assert_eq!(
            canonical_json(&json!({"b": [1, "x"], "a": null})),
            r#"{"a":null,"b":[1,"x"]}"#
        );
    }

    #[test]
    fn test_known_digest_is_stable() {
        // Pins the format; a change here invalidates every stored hash.
        let e = RawEntity::from_fields("a", json!({"body": "h1"}));
        let mut hasher = Sha256::new();
        hasher.update(b"ingest-harness/v1\na\n{\"body\":\"h1\"}");
        assert_eq!(content_hash(&e), hex::encode(hasher.finalize()));
    }
}
