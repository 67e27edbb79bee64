//! The sentence-embedding model seam and its fastembed-backed implementation.

use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use half::f16;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Configuration for a [`FastEmbedEncoder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Name of the built-in fastembed model to load.
    pub model_name: String,
    /// Whether to print model download progress on first load.
    pub show_download_progress: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model_name: "all-MiniLM-L6-v2".to_string(),
            show_download_progress: false,
        }
    }
}

impl EncoderConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    fn model(&self) -> Result<EmbeddingModel> {
        match self.model_name.as_str() {
            "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            other => Err(EmbedError::invalid_input(format!(
                "unknown embedding model: {other}"
            ))),
        }
    }
}

/// Text-to-vector model interface.
///
/// This is the seam between the engine and the pretrained sentence-embedding
/// model: production uses [`FastEmbedEncoder`], tests substitute
/// deterministic mocks. Implementations must return one vector per input, in
/// input order, all with the dimension reported by [`dimension`].
///
/// [`dimension`]: TextEncoder::dimension
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Encode a batch of texts into normalized f16 vectors, preserving order.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f16>>>;

    /// Dimension of the vectors this encoder produces. A property of the
    /// loaded model, not a constant callers may assume.
    fn dimension(&self) -> usize;

    /// Identifier of the underlying model.
    fn name(&self) -> &str;
}

/// [`TextEncoder`] backed by a local fastembed ONNX model.
#[derive(Clone)]
pub struct FastEmbedEncoder {
    model_name: String,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedEncoder")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedEncoder {
    /// Load the configured model and probe its dimension with a test
    /// embedding. Model loading runs on a blocking thread.
    pub async fn create(config: EncoderConfig) -> Result<Self> {
        let model_kind = config.model()?;
        let model_name = config.model_name.clone();
        tracing::info!("Loading embedding model: {model_name}");

        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let init_options = InitOptions::new(model_kind)
                    .with_show_download_progress(config.show_download_progress);

                let mut model =
                    TextEmbedding::try_new(init_options).map_err(EmbedError::unavailable)?;

                // Probe the dimension rather than hard-coding a model table.
                let probe = model
                    .embed(vec!["dimension probe".to_string()], None)
                    .map_err(EmbedError::unavailable)?;
                let dimension = probe.first().map(|e| e.len()).ok_or_else(|| {
                    EmbedError::invalid_input("model produced no probe embedding")
                })?;

                Ok((model, dimension))
            })
            .await??;

        tracing::info!("Embedding model loaded, dimension {dimension}");

        Ok(Self {
            model_name,
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }
}

#[async_trait]
impl TextEncoder for FastEmbedEncoder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f16>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch = texts.to_vec();
        let model = Arc::clone(&self.model);

        let raw = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = model.lock().expect("embedding model mutex poisoned");
            guard.embed(batch, None).map_err(EmbedError::unavailable)
        })
        .await??;

        Ok(raw.into_iter().map(normalize_to_f16).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

/// Convert an f32 vector to unit-length f16.
fn normalize_to_f16(embedding: Vec<f32>) -> Vec<f16> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding
            .into_iter()
            .map(|x| f16::from_f32(x / norm))
            .collect()
    } else {
        embedding.into_iter().map(f16::from_f32).collect()
    }
}
