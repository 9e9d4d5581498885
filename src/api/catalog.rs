use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::error_response;
use crate::engine::UpsertOutcome;
use crate::models::{CatalogSummary, RawCandidate};
use crate::state::AppState;

/// PUT /api/catalog - Replace the catalog with a new batch of raw records
pub async fn replace_catalog(
    State(state): State<AppState>,
    Json(records): Json<Vec<serde_json::Value>>,
) -> Result<Json<CatalogSummary>, (StatusCode, String)> {
    tracing::info!("Rebuilding catalog from {} records", records.len());
    let summary = state
        .replace_catalog(records)
        .await
        .map_err(error_response)?;
    Ok(Json(summary))
}

/// PUT /api/catalog/{id} - Insert or replace one record. The path id wins
/// over any id in the body.
pub async fn upsert_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut raw): Json<RawCandidate>,
) -> Result<Json<UpsertOutcome>, (StatusCode, String)> {
    raw.id = Some(id);
    let outcome = state
        .upsert_candidate(&raw)
        .await
        .map_err(error_response)?;
    Ok(Json(outcome))
}

/// DELETE /api/catalog/{id} - Remove one candidate
pub async fn delete_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.remove_candidate(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
