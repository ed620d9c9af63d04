//! Embedding providers selected by `[embedding] provider`.
//!
//! | Provider | Implementation |
//! |----------|----------------|
//! | `disabled` | no embedder; vector search returns nothing and lexical types fall back to BM25 |
//! | `hashing` | [`HashingEmbedder`] from the core crate, offline and deterministic |
//! | `openai` | [`OpenAiEmbedder`], `POST /v1/embeddings` with retry and backoff |
//!
//! The OpenAI provider retries HTTP 429, 5xx and network errors with
//! exponential backoff (1s, 2s, 4s, … capped at 32s) up to
//! `max_retries` times. Other 4xx responses fail immediately.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use knowledge_search_core::embedding::{Embedder, HashingEmbedder};

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Builds the configured embedder, or `None` when embeddings are disabled.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<Arc<dyn Embedder>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "hashing" => Ok(Some(Arc::new(HashingEmbedder::new(
            config.dims.unwrap_or(256),
        )))),
        "openai" => Ok(Some(Arc::new(OpenAiEmbedder::new(config)?))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embedding provider backed by the OpenAI API. Reads `OPENAI_API_KEY`
/// from the environment.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            dims: config.dims.unwrap_or(1536),
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, delay_secs = delay.as_secs(), "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(OPENAI_EMBEDDINGS_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_openai_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(text).await
    }
}

/// Extracts the first `data[].embedding` array.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|items| items.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data[0].embedding"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "data": [{ "index": 0, "embedding": [0.5, -1.0, "x"] }]
        });
        assert_eq!(parse_openai_response(&json).unwrap(), vec![0.5, -1.0, 0.0]);
    }

    #[test]
    fn test_parse_openai_response_missing_data() {
        assert!(parse_openai_response(&serde_json::json!({ "error": "nope" })).is_err());
    }

    #[test]
    fn test_create_embedder_variants() {
        let disabled = EmbeddingConfig::default();
        assert!(create_embedder(&disabled).unwrap().is_none());

        let hashing = EmbeddingConfig {
            provider: "hashing".into(),
            dims: Some(32),
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(&hashing).unwrap().unwrap();
        assert_eq!(embedder.dims(), 32);
        assert_eq!(embedder.model_name(), "hashing");

        let unknown = EmbeddingConfig {
            provider: "mystery".into(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&unknown).is_err());
    }
}
