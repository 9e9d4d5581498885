use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{RecoError, Result};
use crate::text::fold;

/// Publication state of a catalog item. Only `Published` items are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Published,
    Draft,
    Archived,
}

impl Status {
    /// Case-insensitive parse of catalog status strings.
    pub fn parse(raw: &str) -> Option<Self> {
        match fold(raw.trim()).as_str() {
            "published" => Some(Status::Published),
            "draft" => Some(Status::Draft),
            "archived" => Some(Status::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// Accepts English and Portuguese labels, with or without accents.
    pub fn parse(raw: &str) -> Option<Self> {
        match fold(raw.trim()).as_str() {
            "beginner" | "iniciante" => Some(Difficulty::Beginner),
            "intermediate" | "intermediario" => Some(Difficulty::Intermediate),
            "advanced" | "avancado" => Some(Difficulty::Advanced),
            _ => None,
        }
    }
}

/// Which collection a query targets; selects the threshold profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[serde(alias = "trilhas")]
    Trail,
    #[serde(alias = "vagas")]
    Position,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Trail => f.write_str("trail"),
            ContentType::Position => f.write_str("position"),
        }
    }
}

/// A catalog record as it arrives from the loader, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCandidate {
    #[serde(alias = "publicId")]
    pub id: Option<String>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    #[serde(alias = "summary")]
    pub description: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub topics: Vec<String>,
    pub difficulty: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "combinedText")]
    pub combined_text: Option<String>,
}

/// Loaders send `null` for absent lists.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A validated, published-or-not catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub slug: Option<String>,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub topics: BTreeSet<String>,
    pub difficulty: Option<Difficulty>,
    pub status: Status,
    /// Text scored by both indexes.
    pub combined_text: String,
}

/// A user query, already enriched upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub raw_text: String,
    pub enriched_text: String,
    pub content_type: ContentType,
    pub max_results: usize,
}

impl Query {
    pub const MIN_RAW_CHARS: usize = 8;
    pub const MAX_RAW_CHARS: usize = 500;
    pub const MAX_RESULTS: usize = 3;

    /// Validate and build a query. `enriched_text` defaults to the raw text.
    pub fn new(
        raw_text: impl Into<String>,
        enriched_text: Option<String>,
        content_type: ContentType,
        max_results: usize,
    ) -> Result<Self> {
        let raw_text = raw_text.into().trim().to_string();
        let chars = raw_text.chars().count();
        if !(Self::MIN_RAW_CHARS..=Self::MAX_RAW_CHARS).contains(&chars) {
            return Err(RecoError::InvalidQuery(format!(
                "query must have {}-{} characters, got {chars}",
                Self::MIN_RAW_CHARS,
                Self::MAX_RAW_CHARS
            )));
        }
        if !(1..=Self::MAX_RESULTS).contains(&max_results) {
            return Err(RecoError::InvalidQuery(format!(
                "max_results must be between 1 and {}, got {max_results}",
                Self::MAX_RESULTS
            )));
        }
        let enriched_text = enriched_text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| raw_text.clone());

        Ok(Self {
            raw_text,
            enriched_text,
            content_type,
            max_results,
        })
    }
}

/// Per-path scores for one candidate after merging and column normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredHit {
    pub candidate_id: String,
    pub semantic_score: f64,
    pub lexical_score: f64,
}

/// A candidate with its blended retrieval score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlendedHit {
    pub candidate_id: String,
    pub blended_score: f64,
    pub semantic_score: f64,
    pub lexical_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostKind {
    #[serde(rename = "title_desc_match")]
    TitleOrDescription,
    #[serde(rename = "tag_match")]
    Tag,
    #[serde(rename = "beginner_boost")]
    Beginner,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AppliedBoost {
    pub kind: BoostKind,
    pub magnitude: f64,
}

/// Final ranked item handed to the explanation builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedHit {
    pub candidate_id: String,
    pub final_score: f64,
    pub blended_score: f64,
    pub semantic_score: f64,
    pub lexical_score: f64,
    pub boosts: Vec<AppliedBoost>,
    /// Admitted by the fallback rule rather than by clearing the threshold.
    pub via_fallback: bool,
}

impl RankedHit {
    pub fn boost_total(&self) -> f64 {
        self.boosts.iter().map(|b| b.magnitude).sum()
    }
}

/// Output of the pipeline for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub hits: Vec<RankedHit>,
    pub fallback_applied: bool,
    /// Semantic scoring was dropped because the embedder was unavailable.
    pub degraded: bool,
    pub catalog_size: usize,
    pub skipped_records: usize,
}

impl Recommendation {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Recommend request body
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendRequest {
    pub raw_text: String,
    pub enriched_text: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: ContentType,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_content_type() -> ContentType {
    ContentType::Trail
}

fn default_max_results() -> usize {
    Query::MAX_RESULTS
}

/// Catalog rebuild summary
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub catalog_size: usize,
    pub skipped: usize,
    pub unpublished_dropped: usize,
    pub duplicates_merged: usize,
}
