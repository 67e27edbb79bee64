//! Embedding result cache keyed by content hash.
//!
//! Vectors are deterministic for identical input, so the cache is safe to
//! share between concurrent writers: last-writer-wins cannot produce a
//! divergent value for the same key. Keys are blake3 hashes of the
//! whitespace-normalized input text, so formatting differences do not cause
//! redundant model calls.

use crate::error::Result;
use async_trait::async_trait;
use half::f16;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Cache key: blake3 hash of the normalized input text.
pub type CacheKey = [u8; 32];

/// Compute the cache key for an input text.
///
/// Normalization trims the text and collapses internal whitespace runs to a
/// single space, so `"Alice  met\nBob"` and `"Alice met Bob"` share a key.
pub fn content_key(text: &str) -> CacheKey {
    let normalized: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    *blake3::hash(normalized.as_bytes()).as_bytes()
}

/// Pluggable backing store for cached embedding vectors.
#[async_trait]
pub trait EmbeddingCache: Send + Sync {
    /// Look up a cached vector.
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<f16>>>;

    /// Store a vector. Overwriting an existing entry is allowed.
    async fn put(&self, key: CacheKey, vector: Vec<f16>) -> Result<()>;
}

/// In-process cache backed by a `HashMap`. The default backing store.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, Vec<f16>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached vectors.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl EmbeddingCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<f16>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: CacheKey, vector: Vec<f16>) -> Result<()> {
        self.entries.write().await.insert(key, vector);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_shares_a_key() {
        assert_eq!(content_key("Alice met Bob"), content_key("Alice met Bob"));
        assert_eq!(content_key("Alice  met\n\tBob"), content_key(" Alice met Bob "));
    }

    #[test]
    fn different_content_gets_different_keys() {
        assert_ne!(content_key("Alice"), content_key("Bob"));
        assert_ne!(content_key("alice"), content_key("Alice"));
    }

    #[tokio::test]
    async fn memory_cache_round_trip() {
        let cache = MemoryCache::new();
        let key = content_key("some text");
        let vector = vec![f16::from_f32(0.5), f16::from_f32(-0.5)];

        assert!(cache.get(&key).await.unwrap().is_none());
        cache.put(key, vector.clone()).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(vector));
        assert_eq!(cache.len().await, 1);
    }
}
