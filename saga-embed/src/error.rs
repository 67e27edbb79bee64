//! Error types for embedding generation.

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// The variants follow the engine-wide error taxonomy: [`InvalidInput`]
/// failures are caller mistakes and fail fast without touching the model;
/// [`DependencyUnavailable`] failures come from the model or cache backend
/// and are safe to retry with backoff.
///
/// [`InvalidInput`]: EmbedError::InvalidInput
/// [`DependencyUnavailable`]: EmbedError::DependencyUnavailable
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The input text is empty or otherwise unusable. Never retried.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// The embedding model or cache backend could not be reached or failed
    /// internally. Retryable.
    #[error("embedding dependency unavailable: {source}")]
    DependencyUnavailable {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors from the backing store.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors.
    #[error("async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl EmbedError {
    /// Create an [`EmbedError::InvalidInput`] with a custom message.
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Wrap a dependency failure as [`EmbedError::DependencyUnavailable`].
    pub fn unavailable<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::DependencyUnavailable {
            source: source.into(),
        }
    }

    /// Whether this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DependencyUnavailable { .. } | Self::Io { .. } | Self::AsyncTask { .. }
        )
    }
}
