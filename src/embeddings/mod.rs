//! The embedding boundary.
//!
//! Inference happens elsewhere; this module only defines how the engine asks
//! for vectors ([`Embedder`]), an HTTP client for Ollama / OpenAI-compatible
//! servers, an offline feature-hashing embedder, and the timeout/retry
//! wrapper every engine call goes through.

pub mod http;
pub mod resilient;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::config::EmbedderConfig;
use crate::text::tokenize;

pub use http::HttpEmbedder;
pub use resilient::ResilientEmbedder;

/// Anything that turns text into dense vectors.
///
/// Object safe, so the service can hold an `Arc<dyn Embedder>` picked at
/// startup.
pub trait Embedder: Send + Sync {
    /// Provider label used in logs and errors.
    fn name(&self) -> &str;

    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// One vector per input text, in input order.
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, anyhow::Result<Vec<Vec<f32>>>>;
}

/// Build the embedder named by `config.provider`.
pub fn from_config(config: &EmbedderConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dim))),
        _ => Ok(Arc::new(HttpEmbedder::new(config.clone())?)),
    }
}

/// Scale `v` to unit length in place. Zero vectors are left as they are.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ─── Feature hashing ─────────────────────────────────────

/// Deterministic bag-of-words embedder.
///
/// Folded tokens are hashed into `dimension` buckets with FNV-1a, weighted
/// by `1 + ln(tf)` and L2-normalized. Useless for semantics, but always
/// available and stable across runs, which makes it the embedder for tests
/// and air-gapped deployments.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, term: &str) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= u64::from(*b);
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % self.dimension as u64) as usize
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut tf: BTreeMap<String, u32> = BTreeMap::new();
        for token in tokenize(text) {
            *tf.entry(token).or_default() += 1;
        }

        let mut v = vec![0.0f32; self.dimension];
        for (term, count) in &tf {
            v[self.bucket(term)] += 1.0 + (*count as f32).ln();
        }
        l2_normalize(&mut v);
        v
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, anyhow::Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            let vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.embed_text(t)).collect();
            Ok(vectors)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 3];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 3]);
    }

    #[test]
    fn test_hash_embedder_is_deterministic_and_unit_length() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed_text("Lógica de programação com Python");
        let b = embedder.embed_text("logica de PROGRAMACAO com python");
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedder_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        assert!(embedder.embed_text("  ...  ").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_hash_embedder_batch_preserves_order() {
        let embedder = HashEmbedder::new(32);
        let texts = vec!["excel".to_string(), "python".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], embedder.embed_text("python"));
    }

    #[test]
    fn test_from_config_selects_provider() {
        let config = EmbedderConfig {
            provider: "hash".to_string(),
            dim: 64,
            ..EmbedderConfig::default()
        };
        let embedder = from_config(&config).unwrap();
        assert_eq!(embedder.name(), "hash");
        assert_eq!(embedder.dimension(), 64);

        let config = EmbedderConfig {
            provider: "word2vec".to_string(),
            ..EmbedderConfig::default()
        };
        assert!(from_config(&config).is_err());
    }
}
