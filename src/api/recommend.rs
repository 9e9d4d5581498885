use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::api::error_response;
use crate::models::{RecommendRequest, Recommendation};
use crate::state::AppState;

/// POST /api/recommend - Hybrid retrieval + ranking for one query
pub async fn recommend(
    State(state): State<AppState>,
    Json(req): Json<RecommendRequest>,
) -> Result<Json<Recommendation>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let rec = state.recommend(req).await.map_err(error_response)?;
    tracing::info!(
        "Recommend: {} hits (fallback={}, degraded={}) in {}ms",
        rec.hits.len(),
        rec.fallback_applied,
        rec.degraded,
        start.elapsed().as_millis()
    );
    Ok(Json(rec))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub catalog_size: usize,
    pub embedder: String,
    pub built_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (snapshot, built_at) = state.snapshot_with_time();
    Json(HealthResponse {
        status: "ok",
        catalog_size: snapshot.len(),
        embedder: state.embedder.name().to_string(),
        built_at,
    })
}
