use std::collections::{BTreeMap, BTreeSet};

use crate::error::{RecoError, Result};
use crate::models::{Candidate, Difficulty, Status};

/// Candidate attributes a search filter can look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorMetadata {
    pub status: Status,
    pub difficulty: Option<Difficulty>,
    pub tags: BTreeSet<String>,
    pub topics: BTreeSet<String>,
}

impl VectorMetadata {
    pub fn from_candidate(c: &Candidate) -> Self {
        Self {
            status: c.status,
            difficulty: c.difficulty,
            tags: c.tags.clone(),
            topics: c.topics.clone(),
        }
    }
}

/// A stored vector entry
#[derive(Debug, Clone)]
struct VectorEntry {
    embedding: Vec<f32>,
    metadata: VectorMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub candidate_id: String,
    pub score: f64,
}

/// Predicate evaluated against entry metadata before scoring.
pub type MetadataFilter<'a> = &'a dyn Fn(&VectorMetadata) -> bool;

/// In-memory dense index keyed by candidate id.
///
/// Stored vectors are expected to be unit length, so the dot product is the
/// cosine similarity. The dimension is fixed by the first insert (or up front
/// with [`VectorIndex::with_dimension`]).
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: BTreeMap<String, VectorEntry>,
    dimension: Option<usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            dimension: Some(dimension),
        }
    }

    /// Insert or replace the vector for `id`. On error the index is unchanged.
    pub fn upsert(
        &mut self,
        id: &str,
        embedding: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<()> {
        if embedding.is_empty() {
            return Err(RecoError::InvalidVector {
                id: id.to_string(),
                reason: "empty vector".to_string(),
            });
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(RecoError::InvalidVector {
                id: id.to_string(),
                reason: "non-finite component".to_string(),
            });
        }
        if let Some(expected) = self.dimension {
            if embedding.len() != expected {
                return Err(RecoError::DimensionMismatch {
                    expected,
                    found: embedding.len(),
                });
            }
        }

        self.dimension.get_or_insert(embedding.len());
        self.entries.insert(
            id.to_string(),
            VectorEntry {
                embedding,
                metadata,
            },
        );
        Ok(())
    }

    /// Remove `id`. Returns whether anything was removed.
    pub fn delete(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Top-`k` entries by dot product with `query`, score descending, ties by
    /// ascending id. Entries rejected by `filter` are never scored.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<MetadataFilter<'_>>,
    ) -> Result<Vec<VectorHit>> {
        let Some(expected) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != expected {
            return Err(RecoError::DimensionMismatch {
                expected,
                found: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<VectorHit> = self
            .entries
            .iter()
            .filter(|(_, e)| filter.map_or(true, |f| f(&e.metadata)))
            .map(|(id, e)| VectorHit {
                candidate_id: id.clone(),
                score: f64::from(dot(query, &e.embedding)),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
