use axum::routing::{get, post, put};
use axum::Router;
use tracing_subscriber::EnvFilter;

use reco_search::api;
use reco_search::config::Config;
use reco_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        "Embedding provider: {} ({}, {} dims)",
        config.embedder.provider,
        config.embedder.base_url,
        config.embedder.dim
    );
    tracing::info!(
        "Lexical mode: {:?}, normalization: {:?}, strict embedding: {}",
        config.reco.lexical.mode,
        config.reco.hybrid.normalization,
        config.reco.embedding.strict
    );

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/api/health", get(api::recommend::health))
        .route("/api/recommend", post(api::recommend::recommend))
        .route("/api/catalog", put(api::catalog::replace_catalog))
        .route(
            "/api/catalog/{id}",
            put(api::catalog::upsert_candidate).delete(api::catalog::delete_candidate),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
