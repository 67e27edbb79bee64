//! Error taxonomy for the narrative index.
//!
//! Three families matter to callers:
//!
//! - [`IndexError::InvalidInput`]: caller mistakes (empty text, unknown
//!   ids). Fail fast, never retried.
//! - [`IndexError::DependencyUnavailable`]: a model or store backend is
//!   unreachable. The orchestrator retries these with backoff before failing
//!   the task.
//! - [`IndexError::InconsistentState`]: a racing update left a unit
//!   unusable. The offending unit is skipped and counted; the pipeline run
//!   continues.

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Empty or malformed input, or an id that does not exist. Not retried.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A model or store dependency is unreachable. Retryable.
    #[error("dependency unavailable: {source}")]
    DependencyUnavailable {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Stored data contradicts itself, usually from a concurrent update.
    /// The offending unit is skipped, not fatal to the run.
    #[error("inconsistent state: {message}")]
    InconsistentState { message: String },

    /// A task for this `(project, task type)` is already active.
    #[error("task {existing} already active for project {project_id} ({kind})")]
    TaskAlreadyActive {
        project_id: String,
        kind: String,
        existing: String,
    },

    #[error("store error: {source}")]
    Store {
        #[from]
        source: sqlx::Error,
    },

    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Embed(#[from] saga_embed::EmbedError),

    #[error("async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl IndexError {
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn inconsistent<S: Into<String>>(message: S) -> Self {
        Self::InconsistentState {
            message: message.into(),
        }
    }

    pub fn unavailable<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::DependencyUnavailable {
            source: Box::new(source),
        }
    }

    /// Whether the orchestrator should retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DependencyUnavailable { .. } => true,
            Self::Embed(e) => e.is_retryable(),
            Self::Store { source } => matches!(
                source,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}
