//! # Ingest Harness Core
//!
//! Runtime-agnostic logic for Ingest Harness: entity models, DAG
//! validation, content hashing, chunking, the version store abstraction,
//! the embedding trait, credential models, and the error taxonomy.
//!
//! This crate contains no tokio, sqlx, network, or filesystem I/O. The
//! orchestration engine and concrete adapters live in `ingest-harness`.

pub mod chunk;
pub mod credential;
pub mod dag;
pub mod embedding;
pub mod error;
pub mod hash;
pub mod models;
pub mod store;

pub use error::{ErrorStage, Result, SyncError};
