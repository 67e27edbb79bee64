//! Persistence layer for the narrative index.
//!
//! [`SqliteStore`] is the concrete document store the engine runs against.
//! It owns one SQLite database per deployment and persists every §-data-model
//! kind: files, chunks, position-index entries, entities, relationships, and
//! indexing tasks. Uniqueness keys are enforced as UNIQUE constraints, so an
//! upsert is always an atomic replace of the one row a key addresses.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::graph::EntityId;
use half::f16;

/// Database id of a stored chunk.
pub type ChunkId = i64;

/// A stored content chunk.
///
/// Identity is `(file_id, chunk_index)`. Immutable once written except for
/// `embedding` (populated after creation) and `entity_ids` (populated by
/// entity extraction).
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: Option<ChunkId>,
    pub file_id: String,
    pub project_id: String,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub word_count: usize,
    pub content: String,
    pub entity_ids: Vec<EntityId>,
    pub embedding: Option<Vec<f16>>,
}

/// Store-level counts for one project.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub files: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
    pub entities: usize,
    pub relationships: usize,
}
