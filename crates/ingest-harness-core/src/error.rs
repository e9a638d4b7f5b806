//! Error taxonomy for sync runs.
//!
//! Every failure that can happen while a run is in flight maps onto one
//! [`SyncError`] variant. The variant decides two things the orchestrator
//! cares about:
//!
//! - **Stage** ([`SyncError::stage`]) : which part of the pipeline the
//!   error is charged to in the run summary.
//! - **Scope** ([`SyncError::is_fatal`]) : whether the whole run must stop
//!   (`InvalidDag`, `VersionStore`, `Credential`, `SourceAuth`) or only the
//!   current entity is affected.
//!
//! Retryable errors ([`SyncError::is_retryable`]) are retried with backoff
//! by the caller before they are surfaced.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Source,
    Transform,
    Destination,
    VersionStore,
    Credential,
    Orchestrator,
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorStage::Source => "source",
            ErrorStage::Transform => "transform",
            ErrorStage::Destination => "destination",
            ErrorStage::VersionStore => "version_store",
            ErrorStage::Credential => "credential",
            ErrorStage::Orchestrator => "orchestrator",
        };
        f.write_str(s)
    }
}

/// Errors produced by the sync engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Credential rejected by the source (expired or revoked token).
    #[error("source auth error: {0}")]
    SourceAuth(String),

    /// Network failure or rate limit while reading from the source.
    #[error("source transient error: {0}")]
    SourceTransient(String),

    /// The DAG definition is malformed. Always fatal, raised before any
    /// entity is pulled.
    #[error("invalid DAG: {0}")]
    InvalidDag(String),

    /// A transformer failed on one entity.
    #[error("transform error on entity '{entity_id}': {message}")]
    Transform { entity_id: String, message: String },

    /// A destination batch could not be written after retries.
    #[error("write to destination '{destination_id}' failed: {message}")]
    DestinationWrite {
        destination_id: String,
        message: String,
    },

    /// The entity version store is unavailable; incremental correctness
    /// cannot be guaranteed.
    #[error("version store error: {0}")]
    VersionStore(String),

    /// The connection's credential is unusable until a user re-authorizes.
    #[error("credential error: {0}")]
    Credential(String),

    /// A run for the same (source, tenant) pair is already active.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// An external call exceeded its deadline.
    #[error("timed out after {millis}ms: {operation}")]
    Timeout { operation: String, millis: u64 },

    #[error("run cancelled")]
    Cancelled,
}

impl SyncError {
    /// Stage the error is charged to in a run summary.
    pub fn stage(&self) -> ErrorStage {
        match self {
            SyncError::SourceAuth(_) | SyncError::SourceTransient(_) => ErrorStage::Source,
            SyncError::Transform { .. } => ErrorStage::Transform,
            SyncError::DestinationWrite { .. } => ErrorStage::Destination,
            SyncError::VersionStore(_) => ErrorStage::VersionStore,
            SyncError::Credential(_) => ErrorStage::Credential,
            SyncError::InvalidDag(_)
            | SyncError::Conflict(_)
            | SyncError::NotFound(_)
            | SyncError::Timeout { .. }
            | SyncError::Cancelled => ErrorStage::Orchestrator,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::SourceTransient(_)
                | SyncError::Timeout { .. }
                | SyncError::DestinationWrite { .. }
        )
    }

    /// Whether the error aborts the whole run rather than one entity.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidDag(_)
                | SyncError::VersionStore(_)
                | SyncError::Credential(_)
                | SyncError::SourceAuth(_)
        )
    }

    pub fn transform(entity_id: impl Into<String>, message: impl fmt::Display) -> Self {
        SyncError::Transform {
            entity_id: entity_id.into(),
            message: message.to_string(),
        }
    }

    pub fn destination(destination_id: impl Into<String>, message: impl fmt::Display) -> Self {
        SyncError::DestinationWrite {
            destination_id: destination_id.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_not_retryable() {
        let fatal = [
            SyncError::InvalidDag("cycle".into()),
            SyncError::VersionStore("db locked".into()),
            SyncError::Credential("revoked".into()),
        ];
        for err in fatal {
            assert!(err.is_fatal(), "{err} should be fatal");
            assert!(!err.is_retryable(), "{err} should not be retryable");
        }
    }

    #[test]
    fn per_entity_errors_map_to_their_stage() {
        assert_eq!(SyncError::transform("a", "bad").stage(), ErrorStage::Transform);
        assert_eq!(
            SyncError::destination("d1", "503").stage(),
            ErrorStage::Destination
        );
        assert!(!SyncError::transform("a", "bad").is_fatal());
        assert!(SyncError::destination("d1", "503").is_retryable());
    }

    #[test]
    fn stage_display_is_snake_case() {
        assert_eq!(ErrorStage::VersionStore.to_string(), "version_store");
    }
}
