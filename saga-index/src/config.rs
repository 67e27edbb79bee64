//! Engine and orchestrator configuration.

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Policy for a second `index_file` start while one is active for the same
/// `(project, task type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SupersedePolicy {
    /// Reject the new start with `TaskAlreadyActive`.
    #[default]
    Reject,
    /// Cancel the active task, then start the new one.
    Supersede,
}

/// Tunables for the indexing engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target chunk window length in bytes.
    pub chunk_target_len: usize,
    /// Overlap fraction between consecutive chunk windows.
    pub chunk_overlap_fraction: f32,
    /// Texts per embedding-model invocation.
    pub embed_batch_size: usize,
    /// Mentions required before an entity is materialized.
    pub min_entity_mentions: u32,
    /// Alias map: surface form (case-insensitive) to canonical entity name.
    pub aliases: HashMap<String, String>,
    /// Context snippets kept per relationship.
    pub max_relationship_snippets: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_target_len: 1200,
            chunk_overlap_fraction: 0.15,
            embed_batch_size: 16,
            min_entity_mentions: 2,
            aliases: HashMap::new(),
            max_relationship_snippets: 5,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IndexError::invalid_input(format!("cannot read config {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| IndexError::invalid_input(format!("invalid config: {e}")))
    }

    pub fn with_chunk_target_len(mut self, len: usize) -> Self {
        self.chunk_target_len = len.max(1);
        self
    }

    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    pub fn with_min_entity_mentions(mut self, mentions: u32) -> Self {
        self.min_entity_mentions = mentions.max(1);
        self
    }

    pub fn with_alias(mut self, surface: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases
            .insert(surface.into().to_lowercase(), canonical.into());
        self
    }
}

/// Tunables for the task orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Attempts for a retryable stage before the task fails.
    pub retry_attempts: u32,
    /// Base backoff between retries, doubled per attempt.
    pub retry_backoff_ms: u64,
    /// Duplicate-start policy per `(project, task type)`.
    pub supersede_policy: SupersedePolicy,
    /// Fraction of failed units above which the whole task fails.
    pub failure_threshold: f32,
    /// Age in seconds after which a non-terminal task counts as stalled in
    /// statistics.
    pub stalled_after_secs: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff_ms: 250,
            supersede_policy: SupersedePolicy::Reject,
            failure_threshold: 0.5,
            stalled_after_secs: 3600,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_supersede_policy(mut self, policy: SupersedePolicy) -> Self {
        self.supersede_policy = policy;
        self
    }
}
