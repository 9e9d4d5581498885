//! # reco-search
//!
//! Hybrid retrieval and ranking for a small content catalog: given a free-text
//! query (optionally enriched upstream with profile signals) it returns at
//! most three explainable, ranked matches.
//!
//! ## Architecture
//!
//! The pipeline is linear; only the ranking stage branches:
//!
//! ```text
//!                   ┌──────────────────────┐
//!                   │   Raw catalog rows   │
//!                   └──────────┬───────────┘
//!                              ▼
//!                   ┌──────────────────────┐
//!                   │      Normalizer      │
//!                   │  validate, dedupe,   │
//!                   │  Published only      │
//!                   └──────────┬───────────┘
//!                              │ candidates
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!      ┌─────────────────┐          ┌──────────────────┐
//!      │   VectorIndex   │          │   LexicalIndex   │
//!      │  unit vectors,  │          │  BM25 / TF-IDF,  │
//!      │  dot product    │          │  query synonyms  │
//!      └────────┬────────┘          └────────┬─────────┘
//!               │ top_raw                    │ top_raw
//!               └──────────────┬─────────────┘
//!                              ▼
//!                   ┌──────────────────────┐
//!                   │   Hybrid blending    │
//!                   │  per-column min-max  │
//!                   │  0.65 sem + 0.35 lex │
//!                   └──────────┬───────────┘
//!                              ▼
//!                   ┌──────────────────────┐
//!                   │        Ranker        │
//!                   │  boosts, cap 0.99,   │
//!                   │  threshold / fallback│
//!                   └──────────┬───────────┘
//!                              ▼
//!                   ┌──────────────────────┐
//!                   │    Recommendation    │
//!                   └──────────────────────┘
//! ```
//!
//! If the query cannot be embedded the semantic column is zero and the
//! result is flagged `degraded` (or the request fails in strict mode).
//!
//! ## Module Overview
//!
//! - [`config`] - Engine parameters with defaults and env overrides
//! - [`models`] - Candidates, queries and the hit types each stage produces
//! - [`text`] - Accent/case folding and tokenization shared by lexical scoring and boosts
//! - [`normalizer`] - Raw records to validated, de-duplicated candidates
//! - [`search::vector`] - In-memory dense index with metadata filters
//! - [`search::lexical`] - BM25 and TF-IDF cosine scoring
//! - [`search::hybrid`] - Score normalization, blending and the hybrid retriever
//! - [`search::rank`] - Boosts, thresholds and the fallback rule
//! - [`embeddings`] - Embedder trait, HTTP and hashing embedders, retry wrapper
//! - [`engine`] - Catalog snapshot tying the stages together
//! - [`state`] / [`api`] - Shared service state and axum handlers

pub mod api;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod search;
pub mod state;
pub mod text;
