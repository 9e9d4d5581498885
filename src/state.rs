use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::Config;
use crate::embeddings::{self, Embedder};
use crate::engine::{CatalogSnapshot, UpsertOutcome};
use crate::error::Result;
use crate::models::{CatalogSummary, Query, RawCandidate, RecommendRequest, Recommendation};

/// Shared application state.
///
/// Readers clone the current snapshot `Arc` (and its build time) under a
/// short read lock and work on it lock-free. Writers serialize on `writer`, build or copy a snapshot
/// off-lock and swap it in, so a reader never sees a half-applied change.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub embedder: Arc<dyn Embedder>,
    current: Arc<RwLock<Current>>,
    writer: Arc<tokio::sync::Mutex<()>>,
}

/// The live snapshot and when it was swapped in, replaced together.
struct Current {
    snapshot: Arc<CatalogSnapshot>,
    built_at: Option<DateTime<Utc>>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.reco.validate()?;
        let embedder = embeddings::from_config(&config.embedder)?;
        Ok(Self::with_embedder(config, embedder))
    }

    /// State around an explicitly constructed embedder, starting from an
    /// empty catalog.
    pub fn with_embedder(config: Config, embedder: Arc<dyn Embedder>) -> Self {
        let empty = CatalogSnapshot::empty(&config.reco);
        Self {
            config: Arc::new(config),
            embedder,
            current: Arc::new(RwLock::new(Current {
                snapshot: Arc::new(empty),
                built_at: None,
            })),
            writer: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// The snapshot queries currently run against.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.read().snapshot.clone()
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.current.read().built_at
    }

    /// Snapshot and build time read under one lock, so they always agree.
    pub fn snapshot_with_time(&self) -> (Arc<CatalogSnapshot>, Option<DateTime<Utc>>) {
        let current = self.current.read();
        (current.snapshot.clone(), current.built_at)
    }

    fn swap(&self, next: CatalogSnapshot) {
        *self.current.write() = Current {
            snapshot: Arc::new(next),
            built_at: Some(Utc::now()),
        };
    }

    /// Rebuild the whole catalog. On error the current snapshot stays live.
    pub async fn replace_catalog(&self, records: Vec<serde_json::Value>) -> Result<CatalogSummary> {
        let _guard = self.writer.lock().await;
        let next =
            CatalogSnapshot::build_json(records, &self.config.reco, self.embedder.as_ref()).await?;
        let summary = next.summary();
        self.swap(next);
        tracing::info!(
            catalog_size = summary.catalog_size,
            skipped = summary.skipped,
            "Catalog snapshot swapped"
        );
        Ok(summary)
    }

    /// Copy-on-write upsert of a single record.
    pub async fn upsert_candidate(&self, raw: &RawCandidate) -> Result<UpsertOutcome> {
        let _guard = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        let outcome = next
            .upsert_candidate(raw, &self.config.reco, self.embedder.as_ref())
            .await?;
        self.swap(next);
        Ok(outcome)
    }

    /// Copy-on-write delete. Returns whether the id was present.
    pub async fn remove_candidate(&self, id: &str) -> bool {
        let _guard = self.writer.lock().await;
        let current = self.snapshot();
        let mut next = (*current).clone();
        if !next.remove_candidate(id) {
            return false;
        }
        self.swap(next);
        true
    }

    pub async fn recommend(&self, req: RecommendRequest) -> Result<Recommendation> {
        let query = Query::new(req.raw_text, req.enriched_text, req.content_type, req.max_results)?;
        let snapshot = self.snapshot();
        snapshot
            .recommend(&query, &self.config.reco, self.embedder.as_ref())
            .await
    }
}
