//! Raw catalog records → validated, de-duplicated, published candidates.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{RecoError, Result};
use crate::models::{Candidate, Difficulty, RawCandidate, Status};

/// Result of normalizing one catalog batch.
#[derive(Debug, Clone, Default)]
pub struct NormalizedCatalog {
    /// Published candidates, unique by id, sorted by id.
    pub candidates: Vec<Candidate>,
    /// Records rejected as `InvalidCandidate`.
    pub skipped: usize,
    /// Valid records dropped for not being `Published`.
    pub unpublished_dropped: usize,
    /// Records discarded because a more complete record shared their id.
    pub duplicates_merged: usize,
}

impl NormalizedCatalog {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Normalize a batch of raw records. Invalid records are skipped and counted.
pub fn normalize(records: &[RawCandidate]) -> NormalizedCatalog {
    let mut skipped = 0usize;
    let valid = records
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| match to_candidate(i, raw) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("Normalizer: skipping record: {e}");
                skipped += 1;
                None
            }
        })
        .collect::<Vec<_>>();

    finish(valid, skipped)
}

/// Like [`normalize`], but for untyped JSON records. Records that do not
/// even deserialize into a [`RawCandidate`] count as skipped.
pub fn normalize_json(values: Vec<serde_json::Value>) -> NormalizedCatalog {
    let mut skipped = 0usize;
    let mut valid = Vec::with_capacity(values.len());
    for (i, value) in values.into_iter().enumerate() {
        let candidate = serde_json::from_value::<RawCandidate>(value)
            .map_err(|e| RecoError::InvalidCandidate {
                index: i,
                reason: e.to_string(),
            })
            .and_then(|raw| to_candidate(i, &raw));
        match candidate {
            Ok(c) => valid.push(c),
            Err(e) => {
                warn!("Normalizer: skipping record: {e}");
                skipped += 1;
            }
        }
    }
    finish(valid, skipped)
}

fn finish(valid: Vec<Candidate>, skipped: usize) -> NormalizedCatalog {
    let total_valid = valid.len();
    let deduped = dedupe_by_id(valid);
    let duplicates_merged = total_valid - deduped.len();

    let mut unpublished_dropped = 0usize;
    let candidates: Vec<Candidate> = deduped
        .into_iter()
        .filter(|c| {
            let keep = c.status == Status::Published;
            if !keep {
                unpublished_dropped += 1;
            }
            keep
        })
        .map(fill_combined_text)
        .collect();

    if candidates.is_empty() {
        warn!("Normalizer: no published candidates left after filtering");
    }
    info!(
        kept = candidates.len(),
        skipped, unpublished_dropped, duplicates_merged, "Catalog normalized"
    );

    NormalizedCatalog {
        candidates,
        skipped,
        unpublished_dropped,
        duplicates_merged,
    }
}

/// Validate a single raw record. `index` is its position in the batch, used
/// only for error reporting.
pub fn to_candidate(index: usize, raw: &RawCandidate) -> Result<Candidate> {
    let invalid = |reason: &str| RecoError::InvalidCandidate {
        index,
        reason: reason.to_string(),
    };

    let id = raw
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("missing id"))?;
    let id = canonical_id(id).ok_or_else(|| invalid("malformed id"))?;

    let title = clean(&raw.title).ok_or_else(|| invalid("missing title"))?;

    let status = match raw.status.as_deref() {
        Some(s) => Status::parse(s).ok_or_else(|| invalid(&format!("unknown status '{s}'")))?,
        None => return Err(invalid("missing status")),
    };

    let difficulty = raw.difficulty.as_deref().and_then(Difficulty::parse);

    Ok(Candidate {
        id,
        slug: clean(&raw.slug),
        title,
        subtitle: clean(&raw.subtitle),
        description: clean(&raw.description).unwrap_or_default(),
        tags: clean_set(&raw.tags),
        topics: clean_set(&raw.topics),
        difficulty,
        status,
        combined_text: clean(&raw.combined_text).unwrap_or_default(),
    })
}

/// Validate one record for incremental maintenance, filling `combined_text`
/// the same way a full batch would. Status is left for the caller to act on.
pub fn normalize_one(raw: &RawCandidate) -> Result<Candidate> {
    to_candidate(0, raw).map(fill_combined_text)
}

/// UUIDs are canonicalized (lowercase, hyphenated); any other id is kept as
/// long as it contains no whitespace or control characters.
pub fn canonical_id(id: &str) -> Option<String> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return Some(uuid.to_string());
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return None;
    }
    Some(id.to_string())
}

fn clean(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn clean_set(items: &[String]) -> BTreeSet<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Count of populated fields; higher wins when two records share an id.
pub fn completeness(c: &Candidate) -> usize {
    [
        c.slug.is_some(),
        !c.title.is_empty(),
        c.subtitle.is_some(),
        !c.description.is_empty(),
        c.difficulty.is_some(),
        !c.tags.is_empty(),
        !c.topics.is_empty(),
        !c.combined_text.is_empty(),
    ]
    .into_iter()
    .filter(|populated| *populated)
    .count()
}

/// Keep the most complete record per id; ties keep the first seen.
pub fn dedupe_by_id(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut best: BTreeMap<String, Candidate> = BTreeMap::new();
    for c in candidates {
        match best.entry(c.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(c);
            }
            Entry::Occupied(mut slot) => {
                if completeness(&c) > completeness(slot.get()) {
                    debug!(id = %c.id, "Normalizer: replacing duplicate with more complete record");
                    slot.insert(c);
                }
            }
        }
    }
    best.into_values().collect()
}

/// Canonical scoring text: title, subtitle, description, sorted tags, sorted
/// topics, joined with `" | "`.
pub fn build_combined_text(c: &Candidate) -> String {
    let tags = c.tags.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
    let topics = c.topics.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
    [
        c.title.as_str(),
        c.subtitle.as_deref().unwrap_or_default(),
        c.description.as_str(),
        tags.as_str(),
        topics.as_str(),
    ]
    .into_iter()
    .filter(|p| !p.is_empty())
    .collect::<Vec<_>>()
    .join(" | ")
}

fn fill_combined_text(mut c: Candidate) -> Candidate {
    if c.combined_text.trim().is_empty() {
        c.combined_text = build_combined_text(&c);
    }
    c
}
