use std::time::Duration;

use tracing::{debug, warn};

use crate::config::EmbeddingPolicy;
use crate::embeddings::Embedder;
use crate::error::{RecoError, Result};

/// Bounded timeout and retries around any [`Embedder`].
///
/// Each attempt gets `timeout_ms`. Before retry `n` (0-based) the wrapper
/// sleeps `backoff_base_ms * 2^n`. When every attempt fails the caller gets
/// [`RecoError::EmbeddingUnavailable`] with the last failure reason.
pub struct ResilientEmbedder<'a> {
    inner: &'a dyn Embedder,
    policy: &'a EmbeddingPolicy,
}

impl<'a> ResilientEmbedder<'a> {
    pub fn new(inner: &'a dyn Embedder, policy: &'a EmbeddingPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Delay before retry `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        Duration::from_millis(self.policy.backoff_base_ms.saturating_mul(factor))
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let attempts = self.policy.max_retries.saturating_add(1);
        let timeout = Duration::from_millis(self.policy.timeout_ms);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.backoff(attempt - 1);
                debug!(embedder = self.name(), ?delay, "Retrying embedding call");
                tokio::time::sleep(delay).await;
            }

            last_error = match tokio::time::timeout(timeout, self.inner.embed_batch(texts)).await {
                Ok(Ok(vectors)) if vectors.len() == texts.len() => return Ok(vectors),
                Ok(Ok(vectors)) => format!(
                    "returned {} embeddings for {} inputs",
                    vectors.len(),
                    texts.len()
                ),
                Ok(Err(e)) => format!("{e:#}"),
                Err(_) => format!("timed out after {}ms", self.policy.timeout_ms),
            };
            warn!(
                embedder = self.name(),
                attempt = attempt + 1,
                attempts,
                error = %last_error,
                "Embedding attempt failed"
            );
        }

        Err(RecoError::EmbeddingUnavailable {
            provider: self.name().to_string(),
            attempts,
            reason: last_error,
        })
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        // embed_batch guarantees one vector per input
        Ok(vectors.pop().unwrap_or_default())
    }
}
