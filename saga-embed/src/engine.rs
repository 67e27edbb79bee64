//! Batched, cached embedding generation plus vector similarity.

use crate::cache::{EmbeddingCache, MemoryCache, content_key};
use crate::encoder::TextEncoder;
use crate::error::{EmbedError, Result};
use half::f16;
use std::sync::Arc;

/// Default number of texts sent to the model per invocation.
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Embedding generation front-end.
///
/// Wraps a [`TextEncoder`] with input validation, a content-hash result
/// cache, and bounded batching. Batch output always preserves input order,
/// and a cache hit returns a vector bit-identical to a fresh computation
/// because the encoder is deterministic for identical input.
#[derive(Clone)]
pub struct EmbeddingEngine {
    encoder: Arc<dyn TextEncoder>,
    cache: Arc<dyn EmbeddingCache>,
    batch_size: usize,
}

impl EmbeddingEngine {
    /// Create an engine with the default in-memory cache.
    pub fn new(encoder: Arc<dyn TextEncoder>) -> Self {
        Self::with_cache(encoder, Arc::new(MemoryCache::new()))
    }

    /// Create an engine with a custom cache backing store.
    pub fn with_cache(encoder: Arc<dyn TextEncoder>, cache: Arc<dyn EmbeddingCache>) -> Self {
        Self {
            encoder,
            cache,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Bound the number of texts per model invocation.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Dimension of the vectors this engine produces.
    pub fn dimension(&self) -> usize {
        self.encoder.dimension()
    }

    /// Name of the underlying model.
    pub fn model_name(&self) -> &str {
        self.encoder.name()
    }

    /// Embed a single text.
    ///
    /// Empty or whitespace-only input fails with
    /// [`EmbedError::InvalidInput`] before any model call.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f16>> {
        let mut result = self.embed_batch(&[text.to_string()]).await?;
        result
            .pop()
            .ok_or_else(|| EmbedError::invalid_input("encoder returned no embedding"))
    }

    /// Embed a batch of texts, preserving input order in the output.
    ///
    /// All inputs are validated before any model call; a single empty text
    /// fails the whole batch with [`EmbedError::InvalidInput`]. Cache hits
    /// skip the model; misses are encoded in sub-batches of the configured
    /// size and written back to the cache.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f16>>> {
        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                return Err(EmbedError::invalid_input(format!(
                    "text at index {i} is empty"
                )));
            }
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<_> = texts.iter().map(|t| content_key(t)).collect();

        let mut results: Vec<Option<Vec<f16>>> = vec![None; texts.len()];
        let mut miss_indices: Vec<usize> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            match self.cache.get(key).await? {
                Some(vector) => results[i] = Some(vector),
                None => miss_indices.push(i),
            }
        }

        if !miss_indices.is_empty() {
            tracing::debug!(
                "Embedding {} texts ({} cache hits)",
                miss_indices.len(),
                texts.len() - miss_indices.len()
            );

            for window in miss_indices.chunks(self.batch_size) {
                let batch: Vec<String> = window.iter().map(|&i| texts[i].clone()).collect();
                let vectors = self.encoder.encode(&batch).await?;
                if vectors.len() != batch.len() {
                    return Err(EmbedError::invalid_input(format!(
                        "encoder returned {} vectors for {} inputs",
                        vectors.len(),
                        batch.len()
                    )));
                }
                for (&i, vector) in window.iter().zip(vectors) {
                    self.cache.put(keys[i], vector.clone()).await?;
                    results[i] = Some(vector);
                }
            }
        }

        Ok(results.into_iter().map(|v| v.unwrap_or_default()).collect())
    }
}

/// Cosine similarity of two vectors, in `[-1, 1]`.
///
/// A vector compared to itself yields ≈ 1.0. Mismatched lengths and zero
/// vectors yield 0.0.
pub fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f32::from(*x) * f32::from(*y))
        .sum();
    let norm_a: f32 = a.iter().map(|x| f32::from(*x).powi(2)).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| f32::from(*x).powi(2)).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Cosine similarity of one query against many candidates, in candidate
/// order.
pub fn batch_similarity(query: &[f16], candidates: &[Vec<f16>]) -> Vec<f32> {
    candidates
        .iter()
        .map(|candidate| cosine_similarity(query, candidate))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;

    /// Deterministic encoder: maps each text to a small vector derived from
    /// its bytes. Identical input always produces an identical vector.
    struct MockEncoder {
        dimension: usize,
    }

    impl MockEncoder {
        fn vector_for(&self, text: &str) -> Vec<f16> {
            let mut v: Vec<f32> = (0..self.dimension)
                .map(|i| {
                    text.bytes()
                        .enumerate()
                        .map(|(j, b)| ((b as usize * (i + j + 1)) % 97) as f32 / 97.0)
                        .sum::<f32>()
                })
                .collect();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut v {
                    *x /= norm;
                }
            }
            v.into_iter().map(f16::from_f32).collect()
        }
    }

    #[async_trait]
    impl TextEncoder for MockEncoder {
        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f16>>> {
            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn engine() -> EmbeddingEngine {
        EmbeddingEngine::new(Arc::new(MockEncoder { dimension: 8 }))
    }

    #[tokio::test]
    async fn empty_text_fails_before_model_call() {
        let engine = engine();
        assert!(matches!(
            engine.embed_one("").await,
            Err(EmbedError::InvalidInput { .. })
        ));
        assert!(matches!(
            engine.embed_one("   \n ").await,
            Err(EmbedError::InvalidInput { .. })
        ));
        assert!(matches!(
            engine
                .embed_batch(&["fine".to_string(), "".to_string()])
                .await,
            Err(EmbedError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let engine = engine().with_batch_size(2);
        let texts: Vec<String> = (0..7).map(|i| format!("text number {i}")).collect();

        let batched = engine.embed_batch(&texts).await.unwrap();
        assert_eq!(batched.len(), texts.len());

        for (text, vector) in texts.iter().zip(&batched) {
            let single = engine.embed_one(text).await.unwrap();
            assert_eq!(&single, vector);
        }
    }

    #[tokio::test]
    async fn cache_hit_returns_identical_vector() {
        let cache = Arc::new(MemoryCache::new());
        let engine = EmbeddingEngine::with_cache(
            Arc::new(MockEncoder { dimension: 8 }),
            Arc::clone(&cache) as Arc<dyn EmbeddingCache>,
        );

        let fresh = engine.embed_one("the same text").await.unwrap();
        assert_eq!(cache.len().await, 1);

        let cached = engine.embed_one("the same text").await.unwrap();
        assert_eq!(fresh, cached);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn self_similarity_is_one() {
        let engine = engine();
        let embedding = engine.embed_one("a passage about rivers").await.unwrap();
        let similarity = cosine_similarity(&embedding, &embedding);
        assert!((similarity - 1.0).abs() < 1e-3, "got {similarity}");
    }

    #[tokio::test]
    async fn similarity_stays_in_range() {
        let engine = engine();
        let a = engine.embed_one("wolves in the north").await.unwrap();
        let b = engine.embed_one("a tax ledger from the capital").await.unwrap();
        let similarity = cosine_similarity(&a, &b);
        assert!((-1.0..=1.0).contains(&similarity));
    }

    #[test]
    fn mismatched_or_zero_vectors_score_zero() {
        let a = vec![f16::from_f32(1.0), f16::from_f32(0.0)];
        let b = vec![f16::from_f32(1.0)];
        let zero = vec![f16::from_f32(0.0), f16::from_f32(0.0)];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
    }

    #[tokio::test]
    async fn batch_similarity_matches_pairwise() {
        let engine = engine();
        let query = engine.embed_one("query text").await.unwrap();
        let candidates = vec![
            engine.embed_one("first candidate").await.unwrap(),
            engine.embed_one("second candidate").await.unwrap(),
        ];
        let scores = batch_similarity(&query, &candidates);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], cosine_similarity(&query, &candidates[0]));
        assert_eq!(scores[1], cosine_similarity(&query, &candidates[1]));
    }
}
