use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::EmbedderConfig;
use crate::embeddings::{l2_normalize, Embedder};

/// Maximum characters sent per text to the embedding API.
/// nomic-embed-text has an 8 192-token context; catalog text in Portuguese
/// tokenises well under 2 tokens/char, so 3 000 chars stays inside it.
/// Ollama also gets `truncate: true`, but it can still answer 400 for
/// inputs past the context length.
const MAX_EMBED_CHARS: usize = 3_000;

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Client for an Ollama or OpenAI-compatible embedding server.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbedderConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbedderConfig) -> Result<Self> {
        match config.provider.as_str() {
            "ollama" | "openai" => {}
            other => anyhow::bail!("Unknown embedding provider: {other}"),
        }
        // Per-attempt deadlines come from the retry policy; this is only the
        // transport ceiling.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_for_embedding(t).to_string())
            .collect();

        let mut vectors = match self.config.provider.as_str() {
            "ollama" => self.embed_ollama(&truncated).await?,
            "openai" => self.embed_openai(&truncated).await?,
            other => anyhow::bail!("Unknown embedding provider: {other}"),
        };

        if vectors.len() != texts.len() {
            anyhow::bail!(
                "{} returned {} embeddings for {} inputs",
                self.config.provider,
                vectors.len(),
                texts.len()
            );
        }
        for v in &mut vectors {
            l2_normalize(v);
        }
        Ok(vectors)
    }

    // ─── Ollama ──────────────────────────────────────────────

    async fn embed_ollama(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.config.base_url);

        let batch_size = 32;
        let mut all_embeddings = Vec::new();

        for chunk in texts.chunks(batch_size) {
            let req = OllamaEmbedRequest {
                model: self.config.model.clone(),
                input: chunk.to_vec(),
                truncate: true,
            };

            let resp = self
                .client
                .post(&url)
                .json(&req)
                .send()
                .await
                .context("Failed to call Ollama embed API")?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Ollama embed API returned {status}: {body}");
            }

            let body: OllamaEmbedResponse = resp
                .json()
                .await
                .context("Failed to parse Ollama embed response")?;

            all_embeddings.extend(body.embeddings);
        }

        Ok(all_embeddings)
    }

    // ─── OpenAI-compatible ───────────────────────────────────

    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.config.base_url);
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let batch_size = 64;
        let mut all_embeddings = Vec::new();

        for chunk in texts.chunks(batch_size) {
            let req = OpenAiEmbedRequest {
                model: self.config.model.clone(),
                input: chunk.to_vec(),
            };

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&req)
                .send()
                .await
                .context("Failed to call OpenAI embed API")?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("OpenAI embed API returned {status}: {body}");
            }

            let body: OpenAiEmbedResponse = resp
                .json()
                .await
                .context("Failed to parse OpenAI embed response")?;

            // The API may answer out of order; `index` is authoritative.
            let mut data = body.data;
            data.sort_by_key(|d| d.index);
            all_embeddings.extend(data.into_iter().map(|d| d.embedding));
        }

        Ok(all_embeddings)
    }
}

impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        &self.config.provider
    }

    fn dimension(&self) -> usize {
        self.config.dim
    }

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(self.embed(texts))
    }
}

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_for_embedding("trilha de python"), "trilha de python");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // 'ç' is two bytes; 1 + 1500 * 2 puts a boundary just past the limit
        let text = format!("a{}", "ç".repeat(1500));
        let out = truncate_for_embedding(&text);
        assert!(out.len() <= MAX_EMBED_CHARS);
        assert_eq!(out.len(), MAX_EMBED_CHARS - 1);
        assert!(text.starts_with(out));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let config = EmbedderConfig {
            provider: "cohere".to_string(),
            ..EmbedderConfig::default()
        };
        assert!(HttpEmbedder::new(config).is_err());
    }

    #[test]
    fn test_openai_response_parses_with_index() {
        let body: OpenAiEmbedResponse = serde_json::from_str(
            r#"{"data": [{"index": 1, "embedding": [0.0, 1.0]}, {"index": 0, "embedding": [1.0, 0.0]}]}"#,
        )
        .unwrap();
        assert_eq!(body.data[0].index, 1);
        assert_eq!(body.data[1].embedding, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let embedder = HttpEmbedder::new(EmbedderConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..EmbedderConfig::default()
        })
        .unwrap();
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
        assert_eq!(embedder.name(), "ollama");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let embedder = HttpEmbedder::new(EmbedderConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..EmbedderConfig::default()
        })
        .unwrap();
        let err = embedder
            .embed_batch(&["texto".to_string()])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Ollama"));
    }
}
