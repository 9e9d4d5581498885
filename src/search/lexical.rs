//! In-memory lexical index: BM25 scoring with a TF-IDF cosine alternative.
//!
//! Synonym expansion only ever touches the query side. The expanded query is
//! a *set* of tokens, so a document matching both a term and its synonym is
//! credited once per distinct token, never twice for the same token.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::config::{LexicalConfig, LexicalMode};
use crate::text::Tokenizer;

#[derive(Debug, Clone, Default)]
struct DocStats {
    // Ordered so floating-point sums over a document are reproducible.
    term_freqs: BTreeMap<String, u32>,
    len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub candidate_id: String,
    /// Raw BM25 score or TF-IDF cosine; not normalized.
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct LexicalIndex {
    mode: LexicalMode,
    k1: f64,
    b: f64,
    sublinear_tf: bool,
    tokenizer: Tokenizer,
    /// Folded single-token key → folded synonym tokens.
    synonyms: HashMap<String, BTreeSet<String>>,
    docs: BTreeMap<String, DocStats>,
    doc_freq: HashMap<String, usize>,
    total_len: usize,
}

impl LexicalIndex {
    /// Empty index with the given scoring parameters.
    pub fn new(config: &LexicalConfig) -> Self {
        let tokenizer = Tokenizer::new(&config.stopwords);
        let mut synonyms: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (key, values) in &config.synonyms {
            let key_tokens = tokenizer.tokenize(key);
            let [key_token] = key_tokens.as_slice() else {
                debug!("Lexical: ignoring multi-token synonym key '{key}'");
                continue;
            };
            let expansions = synonyms.entry(key_token.clone()).or_default();
            for value in values {
                expansions.extend(tokenizer.tokenize(value));
            }
        }

        Self {
            mode: config.mode,
            k1: config.k1,
            b: config.b,
            sublinear_tf: config.sublinear_tf,
            tokenizer,
            synonyms,
            docs: BTreeMap::new(),
            doc_freq: HashMap::new(),
            total_len: 0,
        }
    }

    /// Build an index over `(id, text)` pairs.
    pub fn build<'a, I>(docs: I, config: &LexicalConfig) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut index = Self::new(config);
        for (id, text) in docs {
            index.upsert(id, text);
        }
        debug!(
            docs = index.len(),
            vocabulary = index.doc_freq.len(),
            mode = ?index.mode,
            "Lexical index built"
        );
        index
    }

    /// Index `text` under `id`, replacing any previous text for that id.
    pub fn upsert(&mut self, id: &str, text: &str) {
        self.delete(id);

        let tokens = self.tokenizer.tokenize(text);
        let mut term_freqs: BTreeMap<String, u32> = BTreeMap::new();
        for token in &tokens {
            *term_freqs.entry(token.clone()).or_default() += 1;
        }
        for term in term_freqs.keys() {
            *self.doc_freq.entry(term.clone()).or_default() += 1;
        }
        self.total_len += tokens.len();
        self.docs.insert(
            id.to_string(),
            DocStats {
                term_freqs,
                len: tokens.len(),
            },
        );
    }

    /// Remove `id`. Returns whether it was indexed.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(stats) = self.docs.remove(id) else {
            return false;
        };
        for term in stats.term_freqs.keys() {
            if let Some(df) = self.doc_freq.get_mut(term) {
                *df -= 1;
                if *df == 0 {
                    self.doc_freq.remove(term);
                }
            }
        }
        self.total_len -= stats.len;
        true
    }

    /// Unique query tokens plus their configured synonyms.
    pub fn expand_query(&self, query: &str) -> BTreeSet<String> {
        let mut expanded = BTreeSet::new();
        for token in self.tokenizer.tokenize(query) {
            if let Some(extra) = self.synonyms.get(&token) {
                expanded.extend(extra.iter().cloned());
            }
            expanded.insert(token);
        }
        expanded
    }

    /// Top-`k` documents for `query`, score descending, ties by ascending id.
    /// Documents that match no query token are not returned.
    pub fn search(&self, query: &str, k: usize) -> Vec<LexicalHit> {
        if k == 0 || self.docs.is_empty() {
            return Vec::new();
        }
        let terms = self.expand_query(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<LexicalHit> = match self.mode {
            LexicalMode::Bm25 => self.score_bm25(&terms),
            LexicalMode::TfIdf => self.score_tfidf(&terms),
        };

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        hits.truncate(k);
        hits
    }

    fn score_bm25(&self, terms: &BTreeSet<String>) -> Vec<LexicalHit> {
        let n = self.docs.len() as f64;
        let avgdl = self.total_len as f64 / n;
        let idf: Vec<(&str, f64)> = terms
            .iter()
            .filter_map(|t| self.doc_freq.get(t).map(|&df| (t.as_str(), bm25_idf(n, df))))
            .collect();
        if idf.is_empty() {
            return Vec::new();
        }

        self.docs
            .iter()
            .filter_map(|(id, doc)| {
                let length_ratio = if avgdl > 0.0 { doc.len as f64 / avgdl } else { 1.0 };
                let norm = self.k1 * (1.0 - self.b + self.b * length_ratio);
                let score: f64 = idf
                    .iter()
                    .filter_map(|(term, idf)| {
                        doc.term_freqs.get(*term).map(|&tf| {
                            let tf = f64::from(tf);
                            idf * tf * (self.k1 + 1.0) / (tf + norm)
                        })
                    })
                    .sum();
                (score > 0.0).then(|| LexicalHit {
                    candidate_id: id.clone(),
                    score,
                })
            })
            .collect()
    }

    fn score_tfidf(&self, terms: &BTreeSet<String>) -> Vec<LexicalHit> {
        let n = self.docs.len() as f64;
        // Terms outside the vocabulary carry no weight, as in a fitted vectorizer.
        let query: Vec<(&str, f64)> = terms
            .iter()
            .filter_map(|t| self.doc_freq.get(t).map(|&df| (t.as_str(), smooth_idf(n, df))))
            .collect();
        let query_norm = query.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if query_norm == 0.0 {
            return Vec::new();
        }

        self.docs
            .iter()
            .filter_map(|(id, doc)| {
                let mut dot = 0.0;
                for (term, q_weight) in &query {
                    if let Some(&tf) = doc.term_freqs.get(*term) {
                        dot += q_weight * self.tf_weight(tf) * smooth_idf(n, self.doc_freq[*term]);
                    }
                }
                if dot <= 0.0 {
                    return None;
                }
                let doc_norm = doc
                    .term_freqs
                    .iter()
                    .map(|(term, &tf)| {
                        let w = self.tf_weight(tf) * smooth_idf(n, self.doc_freq[term]);
                        w * w
                    })
                    .sum::<f64>()
                    .sqrt();
                Some(LexicalHit {
                    candidate_id: id.clone(),
                    score: dot / (query_norm * doc_norm),
                })
            })
            .collect()
    }

    fn tf_weight(&self, tf: u32) -> f64 {
        let tf = f64::from(tf);
        if self.sublinear_tf {
            1.0 + tf.ln()
        } else {
            tf
        }
    }

    pub fn mode(&self) -> LexicalMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    /// Indexed ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.docs.keys().map(String::as_str)
    }
}

/// Non-negative BM25 IDF (Lucene variant).
fn bm25_idf(n: f64, df: usize) -> f64 {
    let df = df as f64;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// Smoothed IDF: `ln((1 + n) / (1 + df)) + 1`.
fn smooth_idf(n: f64, df: usize) -> f64 {
    ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0
}
