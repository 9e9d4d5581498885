use thiserror::Error;

/// Convenience alias used across the engine.
pub type Result<T> = std::result::Result<T, RecoError>;

/// Every failure the engine can surface.
///
/// Only `RetrievalFailed`, `InvalidQuery` and `InvalidConfig` stop a request.
/// `InvalidCandidate` skips a single record, `DimensionMismatch` rejects a
/// single vector, and `EmbeddingUnavailable` degrades retrieval to lexical-only
/// unless strict embedding is configured.
#[derive(Debug, Error)]
pub enum RecoError {
    #[error("invalid candidate at position {index}: {reason}")]
    InvalidCandidate { index: usize, reason: String },

    #[error("dimension mismatch: index holds {expected}-dim vectors, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("invalid vector for '{id}': {reason}")]
    InvalidVector { id: String, reason: String },

    #[error("embedding unavailable from {provider} after {attempts} attempt(s): {reason}")]
    EmbeddingUnavailable {
        provider: String,
        attempts: u32,
        reason: String,
    },

    #[error("retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
