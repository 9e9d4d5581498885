pub mod catalog;
pub mod recommend;

use axum::http::StatusCode;

use crate::error::RecoError;

/// Map an engine error onto the status code handlers answer with.
pub fn error_response(err: RecoError) -> (StatusCode, String) {
    let status = match &err {
        RecoError::InvalidQuery(_)
        | RecoError::InvalidCandidate { .. }
        | RecoError::InvalidVector { .. }
        | RecoError::DimensionMismatch { .. } => StatusCode::BAD_REQUEST,
        RecoError::RetrievalFailed(_) | RecoError::EmbeddingUnavailable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        RecoError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::warn!("Request failed: {err}");
    }
    (status, err.to_string())
}
