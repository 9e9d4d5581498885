use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;

use crate::error::{RecoError, Result};
use crate::models::ContentType;

/// Service configuration: bind address, embedding provider, engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Embedding provider configuration
    pub embedder: EmbedderConfig,
    /// Engine parameters, immutable for the lifetime of the process
    pub reco: RecoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// "ollama", "openai" or "hash" (offline feature hashing)
    pub provider: String,
    /// Base URL for the embedding API
    pub base_url: String,
    /// Model name for embeddings
    pub model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub dim: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
            dim: 768,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".to_string(),
            embedder: EmbedderConfig::default(),
            reco: RecoConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("RECO_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(provider) = std::env::var("EMBED_PROVIDER") {
            config.embedder.provider = provider;
        }
        if let Ok(url) = std::env::var("EMBED_BASE_URL") {
            config.embedder.base_url = url;
        }
        if let Ok(model) = std::env::var("EMBED_MODEL") {
            config.embedder.model = model;
        }
        if let Ok(key) = std::env::var("EMBED_API_KEY") {
            config.embedder.api_key = Some(key);
        }
        if let Ok(dim) = std::env::var("EMBED_DIM") {
            if let Ok(d) = dim.parse() {
                config.embedder.dim = d;
            }
        }

        if let Ok(val) = std::env::var("RECO_TOP_RAW") {
            if let Ok(v) = val.parse() {
                config.reco.hybrid.top_raw = v;
            }
        }
        if let Ok(val) = std::env::var("RECO_SEMANTIC_WEIGHT") {
            if let Ok(w) = val.parse::<f64>() {
                if (0.0..=1.0).contains(&w) {
                    config.reco.hybrid.semantic_weight = w;
                    config.reco.hybrid.lexical_weight = 1.0 - w;
                }
            }
        }
        if let Ok(val) = std::env::var("RECO_LEXICAL_MODE") {
            if let Some(mode) = LexicalMode::parse(&val) {
                config.reco.lexical.mode = mode;
            }
        }
        if let Ok(val) = std::env::var("RECO_NORMALIZATION") {
            if let Some(method) = Normalization::parse(&val) {
                config.reco.hybrid.normalization = method;
            }
        }
        if let Ok(val) = std::env::var("RECO_STRICT_EMBEDDING") {
            if let Ok(v) = val.parse() {
                config.reco.embedding.strict = v;
            }
        }
        if let Ok(path) = std::env::var("RECO_SYNONYMS_FILE") {
            match load_synonyms(Path::new(&path)) {
                Ok(map) => config.reco.lexical.synonyms = map,
                Err(e) => tracing::warn!("Ignoring synonyms file {path}: {e:#}"),
            }
        }

        config
    }
}

/// Read a `{token: [synonym, ...]}` JSON file.
pub fn load_synonyms(path: &Path) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).context("Synonyms file is not a JSON object of string arrays")
}

/// All engine parameters. Built once, passed by reference into every stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoConfig {
    pub hybrid: HybridConfig,
    pub lexical: LexicalConfig,
    pub ranking: RankingConfig,
    pub embedding: EmbeddingPolicy,
}

impl RecoConfig {
    pub fn validate(&self) -> Result<()> {
        let h = &self.hybrid;
        if h.semantic_weight < 0.0 || h.lexical_weight < 0.0 {
            return Err(RecoError::InvalidConfig("weights must be non-negative".into()));
        }
        if (h.semantic_weight + h.lexical_weight - 1.0).abs() > 1e-6 {
            return Err(RecoError::InvalidConfig(format!(
                "semantic_weight + lexical_weight must equal 1, got {}",
                h.semantic_weight + h.lexical_weight
            )));
        }
        if h.top_raw == 0 {
            return Err(RecoError::InvalidConfig("top_raw must be at least 1".into()));
        }

        let l = &self.lexical;
        if !(l.k1.is_finite() && l.k1 >= 0.0) {
            return Err(RecoError::InvalidConfig(format!("k1 must be >= 0, got {}", l.k1)));
        }
        if !(0.0..=1.0).contains(&l.b) {
            return Err(RecoError::InvalidConfig(format!("b must be in [0, 1], got {}", l.b)));
        }

        let r = &self.ranking;
        if !(r.score_cap > 0.0 && r.score_cap < 1.0) {
            return Err(RecoError::InvalidConfig(format!(
                "score_cap must be in (0, 1), got {}",
                r.score_cap
            )));
        }
        for (content_type, threshold) in &r.thresholds {
            if !(0.0..=1.0).contains(threshold) {
                return Err(RecoError::InvalidConfig(format!(
                    "threshold for {content_type} must be in [0, 1], got {threshold}"
                )));
            }
        }
        for boost in [r.title_desc_boost, r.tag_boost, r.beginner_boost] {
            if !(boost.is_finite() && boost >= 0.0) {
                return Err(RecoError::InvalidConfig(format!(
                    "boosts must be non-negative, got {boost}"
                )));
            }
        }
        if let Some(floor) = r.fallback_min_blended {
            if !(0.0..=1.0).contains(&floor) {
                return Err(RecoError::InvalidConfig(format!(
                    "fallback_min_blended must be in [0, 1], got {floor}"
                )));
            }
        }
        Ok(())
    }
}

/// How each score column is rescaled before blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    MinMax,
    ZScore,
}

impl Normalization {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "minmax" => Some(Normalization::MinMax),
            "zscore" => Some(Normalization::ZScore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub semantic_weight: f64,
    pub lexical_weight: f64,
    /// Candidates pulled from each index before merging
    pub top_raw: usize,
    pub normalization: Normalization,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.65,
            lexical_weight: 0.35,
            top_raw: 50,
            normalization: Normalization::MinMax,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalMode {
    #[default]
    Bm25,
    TfIdf,
}

impl LexicalMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "bm25" => Some(LexicalMode::Bm25),
            "tfidf" => Some(LexicalMode::TfIdf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    pub mode: LexicalMode,
    /// BM25 term-frequency saturation
    pub k1: f64,
    /// BM25 length normalization
    pub b: f64,
    /// TF-IDF mode only: use `1 + ln(tf)` instead of raw counts
    pub sublinear_tf: bool,
    /// Query-side expansion map; keys and values are folded at index build
    pub synonyms: BTreeMap<String, Vec<String>>,
    /// Empty unless explicitly configured
    pub stopwords: Vec<String>,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            mode: LexicalMode::Bm25,
            k1: 1.2,
            b: 0.75,
            sublinear_tf: true,
            synonyms: default_synonyms(),
            stopwords: Vec::new(),
        }
    }
}

/// Catalog vocabulary map (pt-BR learning trails).
pub fn default_synonyms() -> BTreeMap<String, Vec<String>> {
    let entries: &[(&str, &[&str])] = &[
        (
            "programacao",
            &["programar", "programador", "coding", "coder", "desenvolver", "dev"],
        ),
        ("logica", &["algoritmo", "algoritmos", "raciocinio"]),
        ("javascript", &["js"]),
        ("iniciante", &["beginner", "basico"]),
        (
            "automatizar",
            &["automacao", "script", "scripts", "macro", "automatizado"],
        ),
        ("trabalho", &["empresa", "servico", "expediente"]),
        ("dados", &["data", "csv", "planilha", "planilhas", "analise"]),
        ("excel", &["planilha", "planilhas", "spreadsheet", "xls", "xlsx"]),
        ("python", &["py", "pythonico", "pythonista"]),
        ("ia", &["inteligencia artificial"]),
        ("ux", &["user experience", "ux design"]),
        ("ui", &["user interface", "ui design"]),
        ("direito", &["juridico", "juridica"]),
        ("saude", &["saude mental"]),
    ];
    entries
        .iter()
        .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub thresholds: BTreeMap<ContentType, f64>,
    pub title_desc_boost: f64,
    pub tag_boost: f64,
    pub beginner_boost: f64,
    pub score_cap: f64,
    /// Query tokens shorter than this never fire the title/description boost
    pub min_keyword_len: usize,
    /// When set, the fallback hit must reach this blended score
    pub fallback_min_blended: Option<f64>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            thresholds: BTreeMap::from([(ContentType::Trail, 0.72), (ContentType::Position, 0.78)]),
            title_desc_boost: 0.15,
            tag_boost: 0.10,
            beginner_boost: 0.05,
            score_cap: 0.99,
            min_keyword_len: 3,
            fallback_min_blended: None,
        }
    }
}

impl RankingConfig {
    pub fn threshold(&self, content_type: ContentType) -> f64 {
        self.thresholds
            .get(&content_type)
            .copied()
            .unwrap_or(match content_type {
                ContentType::Trail => 0.72,
                ContentType::Position => 0.78,
            })
    }
}

/// Timeout/retry policy for query and catalog embedding calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingPolicy {
    pub timeout_ms: u64,
    /// Attempts = 1 + max_retries
    pub max_retries: u32,
    /// Backoff before retry n (0-based) is `backoff_base_ms * 2^n`
    pub backoff_base_ms: u64,
    /// Fail the request instead of degrading to lexical-only
    pub strict: bool,
}

impl Default for EmbeddingPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_retries: 2,
            backoff_base_ms: 400,
            strict: false,
        }
    }
}
