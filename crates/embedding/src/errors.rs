//! Error types for embedding construction.

use thiserror::Error;

/// Failures raised while building embedding layers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The requested positional scheme exists in configuration but has no
    /// implementation.
    #[error("positional encoding scheme `{scheme}` is not implemented")]
    Unimplemented { scheme: &'static str },
    /// Sizes or probabilities are inconsistent.
    #[error("invalid embedding config: {reason}")]
    InvalidConfig { reason: String },
    /// A tensor operation failed.
    #[error(transparent)]
    Backend(#[from] candle_core::Error),
}

impl From<EmbeddingError> for candle_core::Error {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::Backend(inner) => inner,
            other => candle_core::Error::wrap(other),
        }
    }
}
