//! Integration tests for the reco-search pipeline.
//!
//! These tests run normalization, indexing, retrieval and ranking end to end
//! with the deterministic hashing embedder, so no embedding server is needed.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;

use reco_search::config::{LexicalMode, Normalization, RecoConfig};
use reco_search::embeddings::{Embedder, HashEmbedder};
use reco_search::engine::CatalogSnapshot;
use reco_search::error::RecoError;
use reco_search::models::{BoostKind, ContentType, Query, RawCandidate};

/// Helper: a small trail catalog in the shape the loader produces.
fn sample_catalog() -> Vec<RawCandidate> {
    let rows = serde_json::json!([
        {
            "publicId": "python-dados",
            "slug": "python-para-dados",
            "title": "Python para Análise de Dados",
            "description": "Aprenda pandas e visualização para analisar dados reais.",
            "tags": ["Python", "Dados"],
            "difficulty": "Iniciante",
            "status": "Published"
        },
        {
            "publicId": "excel-avancado",
            "title": "Excel Avançado",
            "description": "Planilhas, tabelas dinâmicas e fórmulas para o trabalho.",
            "tags": ["Excel", "Produtividade"],
            "difficulty": "Intermediário",
            "status": "Published"
        },
        {
            "publicId": "logica",
            "title": "Lógica de Programação",
            "description": "Algoritmos e raciocínio lógico do zero.",
            "tags": ["Programação"],
            "difficulty": "Beginner",
            "status": "Published"
        },
        {
            "publicId": "ux-design",
            "title": "UX Design",
            "description": "Pesquisa com usuários, protótipos e testes de usabilidade.",
            "tags": ["Design"],
            "status": "Published"
        },
        {
            "publicId": "python-rascunho",
            "title": "Python Avançado",
            "description": "Ainda em construção.",
            "tags": ["Python"],
            "status": "Draft"
        }
    ]);
    serde_json::from_value(rows).unwrap()
}

fn query(text: &str) -> Query {
    Query::new(text, None, ContentType::Trail, 3).unwrap()
}

/// Embeds like [`HashEmbedder`] until switched off.
struct Switchable {
    inner: HashEmbedder,
    up: AtomicBool,
}

impl Embedder for Switchable {
    fn name(&self) -> &str {
        "switchable"
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, anyhow::Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            if !self.up.load(Ordering::SeqCst) {
                anyhow::bail!("embedding server unreachable");
            }
            self.inner.embed_batch(texts).await
        })
    }
}

fn fast_fail(mut config: RecoConfig) -> RecoConfig {
    config.embedding.max_retries = 0;
    config
}

#[tokio::test]
async fn test_end_to_end_recommendation() {
    let config = RecoConfig::default();
    let embedder = HashEmbedder::new(256);
    let snapshot = CatalogSnapshot::build(&sample_catalog(), &config, &embedder)
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 4);

    let rec = snapshot
        .recommend(&query("quero aprender python para analisar dados"), &config, &embedder)
        .await
        .unwrap();

    assert!(!rec.is_empty());
    assert!(rec.hits.len() <= 3);
    let top = &rec.hits[0];
    assert_eq!(top.candidate_id, "python-dados");
    assert!(!rec.fallback_applied);
    assert!(!rec.degraded);

    let kinds: Vec<BoostKind> = top.boosts.iter().map(|b| b.kind).collect();
    assert!(kinds.contains(&BoostKind::TitleOrDescription));
    assert!(kinds.contains(&BoostKind::Tag));
    assert!(kinds.contains(&BoostKind::Beginner));
    assert!(top.final_score <= 0.99);
}

#[tokio::test]
async fn test_ranked_ids_unique_and_scores_bounded() {
    let config = RecoConfig::default();
    let embedder = HashEmbedder::new(128);
    let snapshot = CatalogSnapshot::build(&sample_catalog(), &config, &embedder)
        .await
        .unwrap();

    for text in [
        "planilhas de excel para o trabalho",
        "lógica de programação para iniciantes",
        "design de interfaces e usabilidade",
        "culinária japonesa tradicional",
    ] {
        let rec = snapshot.recommend(&query(text), &config, &embedder).await.unwrap();
        let mut ids: Vec<&str> = rec.hits.iter().map(|h| h.candidate_id.as_str()).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total, "duplicate ids for '{text}'");
        assert!(rec
            .hits
            .iter()
            .all(|h| (0.0..=0.99).contains(&h.final_score)));
    }
}

#[tokio::test]
async fn test_output_is_deterministic() {
    let config = RecoConfig::default();
    let embedder = HashEmbedder::new(128);
    let q = query("automatizar planilhas com scripts");

    let first = CatalogSnapshot::build(&sample_catalog(), &config, &embedder)
        .await
        .unwrap()
        .recommend(&q, &config, &embedder)
        .await
        .unwrap();

    let mut reversed = sample_catalog();
    reversed.reverse();
    let second = CatalogSnapshot::build(&reversed, &config, &embedder)
        .await
        .unwrap()
        .recommend(&q, &config, &embedder)
        .await
        .unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_all_draft_catalog_returns_nothing() {
    let config = RecoConfig::default();
    let embedder = HashEmbedder::new(64);
    let drafts: Vec<RawCandidate> = sample_catalog()
        .into_iter()
        .map(|mut r| {
            r.status = Some("Draft".to_string());
            r
        })
        .collect();

    let snapshot = CatalogSnapshot::build(&drafts, &config, &embedder).await.unwrap();
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.summary().unpublished_dropped, 5);

    let rec = snapshot
        .recommend(&query("quero aprender python"), &config, &embedder)
        .await
        .unwrap();
    assert!(rec.is_empty());
    assert!(!rec.fallback_applied);
}

#[tokio::test]
async fn test_single_weak_candidate_comes_back_via_fallback() {
    let config = RecoConfig::default();
    let embedder = HashEmbedder::new(64);
    let catalog: Vec<RawCandidate> = sample_catalog()
        .into_iter()
        .filter(|r| r.id.as_deref() == Some("ux-design"))
        .collect();
    let snapshot = CatalogSnapshot::build(&catalog, &config, &embedder).await.unwrap();

    let rec = snapshot
        .recommend(&query("contabilidade para pequenas empresas"), &config, &embedder)
        .await
        .unwrap();
    assert!(rec.fallback_applied);
    assert_eq!(rec.hits.len(), 1);
    let hit = &rec.hits[0];
    assert_eq!(hit.candidate_id, "ux-design");
    assert!(hit.via_fallback);
    assert!(hit.final_score < config.ranking.threshold(ContentType::Trail));
    assert!((hit.final_score - (hit.blended_score + hit.boost_total())).abs() < 1e-12);
}

#[tokio::test]
async fn test_duplicate_records_keep_the_more_complete_one() {
    let config = RecoConfig::default();
    let embedder = HashEmbedder::new(64);
    let mut catalog = vec![RawCandidate {
        id: Some("excel-avancado".into()),
        title: Some("Excel".into()),
        status: Some("Published".into()),
        ..Default::default()
    }];
    catalog.extend(sample_catalog());

    let snapshot = CatalogSnapshot::build(&catalog, &config, &embedder).await.unwrap();
    assert_eq!(snapshot.summary().duplicates_merged, 1);
    let kept = snapshot.candidate("excel-avancado").unwrap();
    assert_eq!(kept.title, "Excel Avançado");
}

#[tokio::test]
async fn test_embedding_outage_degrades_to_lexical() {
    let config = fast_fail(RecoConfig::default());
    let embedder = Switchable {
        inner: HashEmbedder::new(64),
        up: AtomicBool::new(true),
    };
    let snapshot = CatalogSnapshot::build(&sample_catalog(), &config, &embedder)
        .await
        .unwrap();

    embedder.up.store(false, Ordering::SeqCst);
    let rec = snapshot
        .recommend(&query("planilhas de excel no trabalho"), &config, &embedder)
        .await
        .unwrap();
    assert!(rec.degraded);
    assert_eq!(rec.hits[0].candidate_id, "excel-avancado");
    assert!(rec.hits.iter().all(|h| h.semantic_score == 0.0));
}

#[tokio::test]
async fn test_embedding_outage_without_lexical_match_still_falls_back() {
    let config = fast_fail(RecoConfig::default());
    let embedder = Switchable {
        inner: HashEmbedder::new(64),
        up: AtomicBool::new(true),
    };
    let catalog: Vec<RawCandidate> = sample_catalog()
        .into_iter()
        .filter(|r| matches!(r.id.as_deref(), Some("ux-design" | "excel-avancado")))
        .collect();
    let snapshot = CatalogSnapshot::build(&catalog, &config, &embedder).await.unwrap();
    assert_eq!(snapshot.len(), 2);

    embedder.up.store(false, Ordering::SeqCst);
    let rec = snapshot
        .recommend(&query("contabilidade tributaria fiscal"), &config, &embedder)
        .await
        .unwrap();
    assert!(rec.degraded);
    assert!(rec.fallback_applied);
    assert_eq!(rec.hits.len(), 1);
    assert_eq!(rec.hits[0].candidate_id, "excel-avancado");
    assert!(rec.hits[0].via_fallback);
}

#[tokio::test]
async fn test_embedding_outage_fails_in_strict_mode() {
    let mut config = fast_fail(RecoConfig::default());
    config.embedding.strict = true;
    let embedder = Switchable {
        inner: HashEmbedder::new(64),
        up: AtomicBool::new(true),
    };
    let snapshot = CatalogSnapshot::build(&sample_catalog(), &config, &embedder)
        .await
        .unwrap();

    embedder.up.store(false, Ordering::SeqCst);
    let err = snapshot
        .recommend(&query("planilhas de excel no trabalho"), &config, &embedder)
        .await
        .unwrap_err();
    assert!(matches!(err, RecoError::RetrievalFailed(_)));
}

#[tokio::test]
async fn test_catalog_build_fails_when_embedder_is_down() {
    let config = fast_fail(RecoConfig::default());
    let embedder = Switchable {
        inner: HashEmbedder::new(64),
        up: AtomicBool::new(false),
    };
    let err = CatalogSnapshot::build(&sample_catalog(), &config, &embedder)
        .await
        .unwrap_err();
    assert!(matches!(err, RecoError::EmbeddingUnavailable { attempts: 1, .. }));
}

#[tokio::test]
async fn test_alternative_scoring_modes() {
    let mut config = RecoConfig::default();
    config.lexical.mode = LexicalMode::TfIdf;
    config.hybrid.normalization = Normalization::ZScore;
    let embedder = HashEmbedder::new(128);
    let snapshot = CatalogSnapshot::build(&sample_catalog(), &config, &embedder)
        .await
        .unwrap();

    let rec = snapshot
        .recommend(&query("lógica de programação e algoritmos"), &config, &embedder)
        .await
        .unwrap();
    assert_eq!(rec.hits[0].candidate_id, "logica");
    assert!(rec
        .hits
        .iter()
        .all(|h| (0.0..=1.0).contains(&h.blended_score)));
}
