//! # saga-embed
//!
//! Embedding generation for the saga narrative index: a thin, async wrapper
//! around a local sentence-embedding model with result caching and bounded
//! batching.
//!
//! ## Design
//!
//! - [`TextEncoder`] is the model seam: production code uses
//!   [`FastEmbedEncoder`] (local ONNX inference via fastembed); tests plug in
//!   deterministic mocks.
//! - [`EmbeddingEngine`] adds the policy layer: input validation, a
//!   blake3-content-hash cache with a pluggable [`EmbeddingCache`] backing
//!   store, and order-preserving sub-batching so many chunks amortize a
//!   single model invocation.
//! - Vectors are half-precision ([`half::f16`]) and unit-normalized, so
//!   cosine similarity of a vector with itself is ≈ 1.0.
//!
//! ## Quick start
//!
//! ```no_run
//! use saga_embed::{EmbeddingEngine, EncoderConfig, FastEmbedEncoder};
//! use std::sync::Arc;
//!
//! # async fn example() -> saga_embed::Result<()> {
//! let encoder = FastEmbedEncoder::create(EncoderConfig::default()).await?;
//! let engine = EmbeddingEngine::new(Arc::new(encoder));
//!
//! let vectors = engine
//!     .embed_batch(&["Alice met Bob.".into(), "They talked.".into()])
//!     .await?;
//! assert_eq!(vectors.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! All operations return [`Result`] with [`EmbedError`]: `InvalidInput` for
//! caller mistakes (empty text, unknown model) and `DependencyUnavailable`
//! for model or store failures the orchestrator may retry.

pub mod cache;
pub mod encoder;
pub mod engine;
pub mod error;

pub use cache::{CacheKey, EmbeddingCache, MemoryCache, content_key};
pub use encoder::{EncoderConfig, FastEmbedEncoder, TextEncoder};
pub use engine::{DEFAULT_BATCH_SIZE, EmbeddingEngine, batch_similarity, cosine_similarity};
pub use error::{EmbedError, Result};
