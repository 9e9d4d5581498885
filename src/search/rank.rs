//! Business-rule ranking on top of blended retrieval scores.
//!
//! Boosts are additive and capped, the content-type threshold is inclusive,
//! and when nothing clears it the single best blended hit is returned
//! instead (the "dominance" fallback).

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::config::RankingConfig;
use crate::models::{AppliedBoost, BlendedHit, BoostKind, Candidate, Difficulty, Query, RankedHit};
use crate::text::token_set;

/// Ranked hits for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct RankOutcome {
    pub hits: Vec<RankedHit>,
    pub fallback_applied: bool,
}

/// Apply boosts, threshold, dedup, ordering and the fallback rule.
///
/// Returns at most `query.max_results` hits. Hits whose id is not in
/// `candidates` are skipped.
pub fn rank(
    hits: &[BlendedHit],
    candidates: &BTreeMap<String, Candidate>,
    query: &Query,
    config: &RankingConfig,
) -> RankOutcome {
    let query_tokens = token_set(&query.enriched_text);
    let keywords: BTreeSet<&str> = query_tokens
        .iter()
        .map(String::as_str)
        .filter(|t| t.chars().count() >= config.min_keyword_len)
        .collect();

    // Dedup by id, keeping the higher final score.
    let mut scored: BTreeMap<&str, RankedHit> = BTreeMap::new();
    for hit in hits {
        let Some(candidate) = candidates.get(&hit.candidate_id) else {
            warn!(id = %hit.candidate_id, "Ranked hit has no candidate, skipping");
            continue;
        };
        let ranked = score_hit(hit, candidate, &query_tokens, &keywords, config);
        match scored.get(hit.candidate_id.as_str()) {
            Some(existing) if existing.final_score >= ranked.final_score => {}
            _ => {
                scored.insert(hit.candidate_id.as_str(), ranked);
            }
        }
    }

    let threshold = config.threshold(query.content_type);
    let mut survivors: Vec<RankedHit> = scored
        .values()
        .filter(|h| h.final_score >= threshold)
        .cloned()
        .collect();
    survivors.sort_by(ranked_order);

    let mut fallback_applied = false;
    if survivors.is_empty() {
        if let Some(best) = fallback(scored.values(), config) {
            debug!(
                id = %best.candidate_id,
                blended = best.blended_score,
                threshold,
                "No hit cleared the threshold, using fallback"
            );
            survivors.push(best);
            fallback_applied = true;
        }
    }

    survivors.truncate(query.max_results);
    RankOutcome {
        hits: survivors,
        fallback_applied,
    }
}

fn score_hit(
    hit: &BlendedHit,
    candidate: &Candidate,
    query_tokens: &BTreeSet<String>,
    keywords: &BTreeSet<&str>,
    config: &RankingConfig,
) -> RankedHit {
    let mut boosts = Vec::new();

    let text_tokens: BTreeSet<String> = token_set(&candidate.title)
        .into_iter()
        .chain(token_set(&candidate.description))
        .collect();
    if keywords.iter().any(|k| text_tokens.contains(*k)) {
        boosts.push(AppliedBoost {
            kind: BoostKind::TitleOrDescription,
            magnitude: config.title_desc_boost,
        });
    }

    let tag_match = candidate
        .tags
        .iter()
        .flat_map(|tag| token_set(tag))
        .any(|t| query_tokens.contains(&t));
    if tag_match {
        boosts.push(AppliedBoost {
            kind: BoostKind::Tag,
            magnitude: config.tag_boost,
        });
    }

    if candidate.difficulty == Some(Difficulty::Beginner) {
        boosts.push(AppliedBoost {
            kind: BoostKind::Beginner,
            magnitude: config.beginner_boost,
        });
    }

    let total: f64 = boosts.iter().map(|b| b.magnitude).sum();
    RankedHit {
        candidate_id: hit.candidate_id.clone(),
        final_score: (hit.blended_score + total).min(config.score_cap).max(0.0),
        blended_score: hit.blended_score,
        semantic_score: hit.semantic_score,
        lexical_score: hit.lexical_score,
        boosts,
        via_fallback: false,
    }
}

/// Top-1 by raw blended score, ties by ascending id. With a configured
/// floor, a best hit below it yields nothing.
fn fallback<'a>(
    scored: impl Iterator<Item = &'a RankedHit>,
    config: &RankingConfig,
) -> Option<RankedHit> {
    let best = scored.min_by(|a, b| {
        b.blended_score
            .total_cmp(&a.blended_score)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    })?;
    if let Some(floor) = config.fallback_min_blended {
        if best.blended_score < floor {
            debug!(
                id = %best.candidate_id,
                blended = best.blended_score,
                floor,
                "Fallback candidate below floor"
            );
            return None;
        }
    }
    Some(RankedHit {
        via_fallback: true,
        ..best.clone()
    })
}

/// Final score desc, blended score desc, id asc.
fn ranked_order(a: &RankedHit, b: &RankedHit) -> std::cmp::Ordering {
    b.final_score
        .total_cmp(&a.final_score)
        .then_with(|| b.blended_score.total_cmp(&a.blended_score))
        .then_with(|| a.candidate_id.cmp(&b.candidate_id))
}
