//! Catalog snapshot: the candidates plus both indexes built over them.
//!
//! A snapshot is immutable while queries run against it. Incremental
//! maintenance mutates a private copy that the caller swaps in afterwards.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RecoConfig;
use crate::embeddings::{Embedder, ResilientEmbedder};
use crate::error::Result;
use crate::models::{
    Candidate, CatalogSummary, Query, RankedHit, RawCandidate, Recommendation, Status,
};
use crate::normalizer::{self, NormalizedCatalog};
use crate::search::hybrid::HybridRetriever;
use crate::search::lexical::LexicalIndex;
use crate::search::rank::rank;
use crate::search::vector::{VectorIndex, VectorMetadata};

/// What a single-record upsert did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// The record is published and now indexed under this id.
    Indexed { id: String },
    /// The record is not published; any previous entry for the id was removed.
    Unpublished { id: String, removed: bool },
}

#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    candidates: BTreeMap<String, Candidate>,
    vectors: VectorIndex,
    lexical: LexicalIndex,
    skipped: usize,
    unpublished_dropped: usize,
    duplicates_merged: usize,
}

impl CatalogSnapshot {
    /// A snapshot with no candidates. Every query against it returns an
    /// empty recommendation.
    pub fn empty(config: &RecoConfig) -> Self {
        Self {
            candidates: BTreeMap::new(),
            vectors: VectorIndex::new(),
            lexical: LexicalIndex::new(&config.lexical),
            skipped: 0,
            unpublished_dropped: 0,
            duplicates_merged: 0,
        }
    }

    /// Normalize `records`, embed every candidate once and build both indexes.
    ///
    /// Fails with `EmbeddingUnavailable` if the catalog cannot be embedded;
    /// no partially indexed snapshot is ever returned.
    pub async fn build(
        records: &[RawCandidate],
        config: &RecoConfig,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let catalog = normalizer::normalize(records);
        Self::from_catalog(catalog, config, embedder).await
    }

    /// Same as [`CatalogSnapshot::build`] for untyped JSON records.
    pub async fn build_json(
        values: Vec<serde_json::Value>,
        config: &RecoConfig,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let catalog = normalizer::normalize_json(values);
        Self::from_catalog(catalog, config, embedder).await
    }

    async fn from_catalog(
        catalog: NormalizedCatalog,
        config: &RecoConfig,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let NormalizedCatalog {
            candidates,
            skipped,
            unpublished_dropped,
            duplicates_merged,
        } = catalog;

        let mut snapshot = Self {
            skipped,
            unpublished_dropped,
            duplicates_merged,
            ..Self::empty(config)
        };
        if candidates.is_empty() {
            info!(skipped, unpublished_dropped, "Catalog snapshot is empty");
            return Ok(snapshot);
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.combined_text.clone()).collect();
        let resilient = ResilientEmbedder::new(embedder, &config.embedding);
        let embeddings = resilient.embed_batch(&texts).await?;
        debug!(stage = "index_build", vectors = embeddings.len(), "Catalog embedded");
        if let Some(first) = embeddings.first() {
            declared_dimension_matches(embedder, first.len());
        }

        for (candidate, embedding) in candidates.iter().zip(embeddings) {
            snapshot.vectors.upsert(
                &candidate.id,
                embedding,
                VectorMetadata::from_candidate(candidate),
            )?;
        }
        snapshot.lexical = LexicalIndex::build(
            candidates
                .iter()
                .map(|c| (c.id.as_str(), c.combined_text.as_str())),
            &config.lexical,
        );
        snapshot.candidates = candidates.into_iter().map(|c| (c.id.clone(), c)).collect();

        info!(
            candidates = snapshot.len(),
            dimension = snapshot.vectors.dimension(),
            embedder = embedder.name(),
            "Catalog snapshot built"
        );
        Ok(snapshot)
    }

    /// Run retrieval and ranking for one query.
    pub async fn recommend(
        &self,
        query: &Query,
        config: &RecoConfig,
        embedder: &dyn Embedder,
    ) -> Result<Recommendation> {
        if self.candidates.is_empty() {
            debug!("Empty catalog, nothing to recommend");
            return Ok(self.recommendation(Vec::new(), false, false));
        }

        let resilient = ResilientEmbedder::new(embedder, &config.embedding);
        let retrieved = HybridRetriever::new(&self.vectors, &self.lexical, config)
            .retrieve(query, &resilient, config.hybrid.top_raw)
            .await?;
        debug!(stage = "retrieve", hits = retrieved.hits.len(), "Candidates retrieved");

        let ranked = rank(&retrieved.hits, &self.candidates, query, &config.ranking);
        info!(
            content_type = %query.content_type,
            hits = ranked.hits.len(),
            fallback = ranked.fallback_applied,
            degraded = retrieved.degraded,
            "Recommendation ranked"
        );

        Ok(self.recommendation(ranked.hits, ranked.fallback_applied, retrieved.degraded))
    }

    fn recommendation(
        &self,
        hits: Vec<RankedHit>,
        fallback_applied: bool,
        degraded: bool,
    ) -> Recommendation {
        Recommendation {
            hits,
            fallback_applied,
            degraded,
            catalog_size: self.len(),
            skipped_records: self.skipped,
        }
    }

    /// Validate, embed and index a single record, replacing any previous
    /// entry with the same id. An unpublished record removes the id instead.
    ///
    /// On error the snapshot is unchanged.
    pub async fn upsert_candidate(
        &mut self,
        raw: &RawCandidate,
        config: &RecoConfig,
        embedder: &dyn Embedder,
    ) -> Result<UpsertOutcome> {
        let candidate = normalizer::normalize_one(raw)?;
        if candidate.status != Status::Published {
            let removed = self.remove_candidate(&candidate.id);
            return Ok(UpsertOutcome::Unpublished {
                id: candidate.id,
                removed,
            });
        }

        let resilient = ResilientEmbedder::new(embedder, &config.embedding);
        let embedding = resilient.embed_one(&candidate.combined_text).await?;
        self.vectors.upsert(
            &candidate.id,
            embedding,
            VectorMetadata::from_candidate(&candidate),
        )?;
        self.lexical.upsert(&candidate.id, &candidate.combined_text);

        let id = candidate.id.clone();
        debug!(%id, "Candidate upserted");
        self.candidates.insert(id.clone(), candidate);
        Ok(UpsertOutcome::Indexed { id })
    }

    /// Drop `id` from the candidates and both indexes. Returns whether it was
    /// present.
    pub fn remove_candidate(&mut self, id: &str) -> bool {
        let id = normalizer::canonical_id(id.trim()).unwrap_or_else(|| id.to_string());
        let removed = self.candidates.remove(&id).is_some();
        self.vectors.delete(&id);
        self.lexical.delete(&id);
        if removed {
            debug!(%id, "Candidate removed");
        }
        removed
    }

    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            catalog_size: self.len(),
            skipped: self.skipped,
            unpublished_dropped: self.unpublished_dropped,
            duplicates_merged: self.duplicates_merged,
        }
    }

    pub fn candidate(&self, id: &str) -> Option<&Candidate> {
        self.candidates.get(id)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Compare the embedder's configured size with what it actually returned.
/// A mismatch is logged; queries against the snapshot still work because the
/// index takes its dimension from the stored vectors.
fn declared_dimension_matches(embedder: &dyn Embedder, found: usize) -> bool {
    let declared = embedder.dimension();
    if declared != found {
        warn!(
            embedder = embedder.name(),
            declared,
            found,
            "Embedder returned vectors of a different size than configured"
        );
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::models::ContentType;
    use futures_util::future::BoxFuture;

    /// Declares one size, returns another.
    struct Mislabeled(HashEmbedder);

    impl Embedder for Mislabeled {
        fn name(&self) -> &str {
            "mislabeled"
        }

        fn dimension(&self) -> usize {
            self.0.dimension() * 2
        }

        fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, anyhow::Result<Vec<Vec<f32>>>> {
            self.0.embed_batch(texts)
        }
    }

    fn raw(id: &str, title: &str, description: &str, status: &str) -> RawCandidate {
        RawCandidate {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            status: Some(status.to_string()),
            ..Default::default()
        }
    }

    fn catalog() -> Vec<RawCandidate> {
        vec![
            raw("py", "Python para Dados", "Analise dados com pandas", "Published"),
            raw("xl", "Excel Avançado", "Planilhas e fórmulas", "Published"),
            raw("ux", "Design de UX", "Pesquisa com usuarios", "Published"),
            raw("draft", "Python Rascunho", "Em construção", "Draft"),
        ]
    }

    #[tokio::test]
    async fn test_build_indexes_published_only() {
        let config = RecoConfig::default();
        let embedder = HashEmbedder::new(64);
        let snapshot = CatalogSnapshot::build(&catalog(), &config, &embedder).await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.candidate("draft").is_none());
        let summary = snapshot.summary();
        assert_eq!(summary.unpublished_dropped, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn test_recommend_ranks_matching_candidate_first() {
        let config = RecoConfig::default();
        let embedder = HashEmbedder::new(64);
        let snapshot = CatalogSnapshot::build(&catalog(), &config, &embedder).await.unwrap();
        let query = Query::new("python para analise de dados", None, ContentType::Trail, 3).unwrap();

        let rec = snapshot.recommend(&query, &config, &embedder).await.unwrap();
        assert!(!rec.is_empty());
        assert_eq!(rec.hits[0].candidate_id, "py");
        assert!(!rec.degraded);
        assert_eq!(rec.catalog_size, 3);
    }

    #[tokio::test]
    async fn test_empty_catalog_recommends_nothing() {
        let config = RecoConfig::default();
        let embedder = HashEmbedder::new(16);
        let snapshot = CatalogSnapshot::build(
            &[raw("d", "Draft", "", "Draft")],
            &config,
            &embedder,
        )
        .await
        .unwrap();
        let query = Query::new("qualquer consulta", None, ContentType::Trail, 3).unwrap();
        let rec = snapshot.recommend(&query, &config, &embedder).await.unwrap();
        assert!(rec.is_empty());
        assert!(!rec.fallback_applied);
    }

    #[tokio::test]
    async fn test_upsert_and_remove() {
        let config = RecoConfig::default();
        let embedder = HashEmbedder::new(64);
        let mut snapshot = CatalogSnapshot::build(&catalog(), &config, &embedder).await.unwrap();

        let outcome = snapshot
            .upsert_candidate(
                &raw("sql", "SQL do Zero", "Consultas em bancos", "Published"),
                &config,
                &embedder,
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::Indexed {
                id: "sql".to_string()
            }
        );
        assert_eq!(snapshot.len(), 4);

        let query = Query::new("consultas sql em bancos", None, ContentType::Trail, 1).unwrap();
        let rec = snapshot.recommend(&query, &config, &embedder).await.unwrap();
        assert_eq!(rec.hits[0].candidate_id, "sql");

        let outcome = snapshot
            .upsert_candidate(&raw("sql", "SQL do Zero", "", "Draft"), &config, &embedder)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::Unpublished {
                id: "sql".to_string(),
                removed: true
            }
        );
        assert!(!snapshot.remove_candidate("sql"));
        assert!(snapshot.remove_candidate("py"));
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_upsert_leaves_snapshot_unchanged() {
        let config = RecoConfig::default();
        let embedder = HashEmbedder::new(64);
        let mut snapshot = CatalogSnapshot::build(&catalog(), &config, &embedder).await.unwrap();
        let bad = RawCandidate {
            status: None,
            ..raw("new", "Novo", "", "")
        };
        assert!(snapshot.upsert_candidate(&bad, &config, &embedder).await.is_err());
        assert_eq!(snapshot.len(), 3);

        // A different-dimension embedder cannot write into the index.
        let wrong = HashEmbedder::new(32);
        let err = snapshot
            .upsert_candidate(&raw("new", "Novo", "", "Published"), &config, &wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::RecoError::DimensionMismatch { .. }));
        assert!(snapshot.candidate("new").is_none());
    }

    #[tokio::test]
    async fn test_dimension_disagreement_is_detected_at_build() {
        let config = RecoConfig::default();
        let honest = HashEmbedder::new(16);
        assert!(declared_dimension_matches(&honest, 16));

        let mislabeled = Mislabeled(HashEmbedder::new(16));
        assert!(!declared_dimension_matches(&mislabeled, 16));

        let snapshot = CatalogSnapshot::build(&catalog(), &config, &mislabeled)
            .await
            .unwrap();
        assert_eq!(snapshot.vectors.dimension(), Some(16));
        let query = Query::new("python para analise de dados", None, ContentType::Trail, 3).unwrap();
        let rec = snapshot.recommend(&query, &config, &mislabeled).await.unwrap();
        assert!(!rec.degraded);
    }
}
