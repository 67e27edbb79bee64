//! Search types shared by the retrieval engine and its callers.

pub mod engine;

pub use engine::RetrievalEngine;

use crate::graph::{Entity, EntityId, EntityKind};
use crate::store::ChunkId;
use serde::Serialize;

/// How a query is matched against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Vector similarity only.
    Semantic,
    /// Case-insensitive substring match only.
    Keyword,
    /// Weighted combination; the semantic score dominates, keyword matches
    /// boost ranking.
    Hybrid,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "keyword" => Ok(Self::Keyword),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("invalid search mode: {other}")),
        }
    }
}

/// Scope filters applied before scoring.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Restrict results to these file ids.
    pub file_ids: Option<Vec<String>>,
}

/// One scored search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub file_id: String,
    pub project_id: String,
    pub chunk_index: usize,
    pub content: String,
    /// Raw cosine similarity in `[-1, 1]`; 0.0 when no vector was involved.
    pub similarity: f32,
    /// Derived ranking score in `[0, 1]`.
    pub relevance: f32,
}

/// A page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Matches before pagination.
    pub total: usize,
    pub elapsed_ms: u64,
}

/// An autocomplete suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub entity_id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub mention_count: u32,
}

/// Constraints for RAG context assembly.
#[derive(Debug, Clone)]
pub struct ContextConstraints {
    /// Maximum number of chunks in the assembled context.
    pub max_chunks: usize,
    /// Drop hits ranked below this relevance.
    pub min_relevance: f32,
}

impl Default for ContextConstraints {
    fn default() -> Self {
        Self {
            max_chunks: 5,
            min_relevance: 0.0,
        }
    }
}

/// Ranked chunks plus the entities they mention, ready for prompt building.
#[derive(Debug, Clone, Serialize)]
pub struct ContextBundle {
    pub chunks: Vec<SearchHit>,
    pub entities: Vec<Entity>,
}
