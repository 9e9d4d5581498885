use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::{HybridConfig, Normalization, RecoConfig};
use crate::embeddings::ResilientEmbedder;
use crate::error::{RecoError, Result};
use crate::models::{BlendedHit, Query, ScoredHit};
use crate::search::lexical::{LexicalHit, LexicalIndex};
use crate::search::vector::{VectorHit, VectorIndex};

/// Z-scores are clipped to this many standard deviations before rescaling.
const Z_CLIP: f64 = 3.0;

/// Blended hits for one query, plus whether the semantic path was dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOutcome {
    pub hits: Vec<BlendedHit>,
    pub degraded: bool,
}

/// Runs both indexes against one query and blends their scores.
pub struct HybridRetriever<'a> {
    vectors: &'a VectorIndex,
    lexical: &'a LexicalIndex,
    config: &'a RecoConfig,
}

impl<'a> HybridRetriever<'a> {
    pub fn new(vectors: &'a VectorIndex, lexical: &'a LexicalIndex, config: &'a RecoConfig) -> Self {
        Self {
            vectors,
            lexical,
            config,
        }
    }

    /// Retrieve up to `top_raw` hits from each path and blend them.
    ///
    /// If the query cannot be embedded the semantic column is all zeros (the
    /// first `top_raw` indexed ids are kept in the pool even without a lexical
    /// match) and the outcome is marked `degraded`, unless strict embedding is on, in
    /// which case the request fails with `RetrievalFailed`.
    pub async fn retrieve(
        &self,
        query: &Query,
        embedder: &ResilientEmbedder<'_>,
        top_raw: usize,
    ) -> Result<RetrievalOutcome> {
        let text = query.enriched_text.as_str();
        let lexical_hits = self.lexical.search(text, top_raw);

        let semantic = embedder
            .embed_one(text)
            .await
            .and_then(|vector| self.vectors.search(&vector, top_raw, None));

        let (semantic_hits, degraded) = match semantic {
            Ok(hits) => (hits, false),
            Err(e) if self.config.embedding.strict => {
                return Err(RecoError::RetrievalFailed(e.to_string()));
            }
            Err(e) => {
                warn!(
                    embedder = embedder.name(),
                    error = %e,
                    "Semantic retrieval unavailable, continuing lexical-only"
                );
                // Indexed candidates stay in the pool at semantic 0 so a query
                // with no lexical match still reaches the fallback.
                let zeroed: Vec<VectorHit> = self
                    .lexical
                    .ids()
                    .take(top_raw)
                    .map(|id| VectorHit {
                        candidate_id: id.to_string(),
                        score: 0.0,
                    })
                    .collect();
                (zeroed, true)
            }
        };

        debug!(
            semantic = semantic_hits.len(),
            lexical = lexical_hits.len(),
            degraded,
            "Hybrid retrieval"
        );

        Ok(RetrievalOutcome {
            hits: blend(&semantic_hits, &lexical_hits, &self.config.hybrid),
            degraded,
        })
    }
}

/// Union both result lists by id. A candidate missing from one path gets 0
/// for that path. Scores are raw; output is ordered by id.
pub fn merge(semantic: &[VectorHit], lexical: &[LexicalHit]) -> Vec<ScoredHit> {
    let mut merged: BTreeMap<&str, ScoredHit> = BTreeMap::new();
    for hit in semantic {
        merged
            .entry(hit.candidate_id.as_str())
            .or_insert_with(|| empty_hit(&hit.candidate_id))
            .semantic_score = hit.score;
    }
    for hit in lexical {
        merged
            .entry(hit.candidate_id.as_str())
            .or_insert_with(|| empty_hit(&hit.candidate_id))
            .lexical_score = hit.score;
    }
    merged.into_values().collect()
}

fn empty_hit(id: &str) -> ScoredHit {
    ScoredHit {
        candidate_id: id.to_string(),
        semantic_score: 0.0,
        lexical_score: 0.0,
    }
}

/// Rescale each score column to [0, 1] independently.
pub fn normalize_columns(hits: &mut [ScoredHit], method: Normalization) {
    let semantic: Vec<f64> = hits.iter().map(|h| h.semantic_score).collect();
    let lexical: Vec<f64> = hits.iter().map(|h| h.lexical_score).collect();
    let semantic = normalize(&semantic, method);
    let lexical = normalize(&lexical, method);
    for ((hit, s), l) in hits.iter_mut().zip(semantic).zip(lexical) {
        hit.semantic_score = s;
        hit.lexical_score = l;
    }
}

pub fn normalize(scores: &[f64], method: Normalization) -> Vec<f64> {
    match method {
        Normalization::MinMax => min_max(scores),
        Normalization::ZScore => z_score(scores),
    }
}

/// `(x - min) / (max - min)`; a constant column maps to all zeros.
pub fn min_max(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range.is_nan() || range <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Population z-score clipped to ±3 and mapped onto [0, 1]; a constant
/// column maps to all zeros.
pub fn z_score(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev.is_nan() || std_dev <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores
        .iter()
        .map(|s| {
            let z = ((s - mean) / std_dev).clamp(-Z_CLIP, Z_CLIP);
            (z + Z_CLIP) / (2.0 * Z_CLIP)
        })
        .collect()
}

/// Weighted sum of already-normalized columns, sorted by blended score
/// descending with ties broken by ascending id.
pub fn blend_normalized(hits: &[ScoredHit], config: &HybridConfig) -> Vec<BlendedHit> {
    let mut blended: Vec<BlendedHit> = hits
        .iter()
        .map(|h| BlendedHit {
            candidate_id: h.candidate_id.clone(),
            blended_score: config.semantic_weight * h.semantic_score
                + config.lexical_weight * h.lexical_score,
            semantic_score: h.semantic_score,
            lexical_score: h.lexical_score,
        })
        .collect();
    blended.sort_by(|a, b| {
        b.blended_score
            .total_cmp(&a.blended_score)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
    blended
}

/// Merge raw results from both paths, normalize each column and blend.
pub fn blend(semantic: &[VectorHit], lexical: &[LexicalHit], config: &HybridConfig) -> Vec<BlendedHit> {
    let mut merged = merge(semantic, lexical);
    normalize_columns(&mut merged, config.normalization);
    blend_normalized(&merged, config)
}
