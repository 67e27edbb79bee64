//! saga-index: a semantic and structural index for narrative manuscripts.
//!
//! This crate turns raw manuscript text into a queryable index backing
//! writing-assistant features: chat context assembly, autocomplete, and
//! "find similar passages". One ingestion pipeline produces three linked
//! views of a project:
//!
//! - **Structure**: position-addressable chunks, per-line position entries,
//!   and scene/chapter boundaries (via `saga-segment`)
//! - **Knowledge graph**: character/location/theme entities with mention
//!   tracking, plus typed, strength-scored relationships inferred from
//!   co-occurrence
//! - **Vectors**: per-chunk embeddings (via `saga-embed`) powering semantic
//!   and hybrid search
//!
//! ## Key Modules
//!
//! - [`store`]: SQLite persistence honoring the data-model uniqueness keys
//! - [`graph`]: entity extraction, relationship discovery, network views
//! - [`retrieval`]: semantic / keyword / hybrid search and context assembly
//! - [`pipeline`]: the task orchestrator with its status state machine, per-key
//!   serialization, retry with backoff, cooperative cancellation
//!
//! ## Quick Start
//!
//! ```no_run
//! use saga_index::config::{EngineConfig, OrchestratorConfig};
//! use saga_index::graph::ner::HeuristicNerModel;
//! use saga_index::pipeline::IndexingOrchestrator;
//! use saga_index::store::SqliteStore;
//! use saga_embed::{EmbeddingEngine, EncoderConfig, FastEmbedEncoder};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = SqliteStore::open(std::path::Path::new("saga.db")).await?;
//! let encoder = FastEmbedEncoder::create(EncoderConfig::default()).await?;
//! let orchestrator = IndexingOrchestrator::new(
//!     store,
//!     EmbeddingEngine::new(Arc::new(encoder)),
//!     Arc::new(HeuristicNerModel),
//!     EngineConfig::default(),
//!     OrchestratorConfig::default(),
//! );
//!
//! let task = orchestrator
//!     .index_file("chapter-1", "my-novel", "Alice met Bob.\n\nThey talked.")
//!     .await?;
//! let status = orchestrator.get_task_status(&task.task_id).await?;
//! println!("task {} is {:?}", status.task_id, status.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod retrieval;
pub mod store;

pub use config::{EngineConfig, OrchestratorConfig, SupersedePolicy};
pub use error::{IndexError, Result};
pub use graph::network::{EntityNetwork, entity_network};
pub use graph::{Entity, EntityKind, Mention, Relationship, RelationshipKind};
pub use pipeline::{
    IndexingOrchestrator, TaskKind, TaskOutcome, TaskRecord, TaskStatus,
};
pub use retrieval::{RetrievalEngine, SearchFilter, SearchMode, SearchResults};
pub use store::{ChunkRecord, SqliteStore, StoreStats};
