//! HTTP embedding gateway client (part of C1/C5's embedding dependency).
//!
//! Implements `quoth_core::embedding::EmbeddingProvider` against an
//! OpenAI-compatible embeddings endpoint, routing `ContentType::Code` to a
//! distinct model name per §4.1/§9 (code and prose are embedded with
//! different models but land in the same fixed-dimension vector space).
//!
//! Grounded directly on the teacher's `embedding.rs::embed_openai`: same
//! retry/backoff shape (1s, 2s, 4s, ... capped at 2^5, retry on 429/5xx and
//! network errors, fail fast on other 4xx), reimplemented against the
//! `EmbeddingProvider` trait instead of a free function.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use quoth_core::embedding::{normalize_whitespace, ContentType, EmbeddingProvider};

use crate::config::EmbeddingConfig;

const TEXT_MODEL: &str = "text-embedding-3-small";
const CODE_MODEL: &str = "text-embedding-3-code";
const DIMS: usize = 1536;
const MAX_RETRIES: u32 = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    provider_url: String,
    provider_key: String,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            provider_url: config.provider_url.clone(),
            provider_key: config.provider_key.clone(),
        })
    }

    async fn embed_one(&self, text: &str, content_type: ContentType) -> anyhow::Result<Vec<f32>> {
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            anyhow::bail!("invalid input: cannot embed empty text");
        }

        let model = self.model_name(content_type);
        let body = json!({ "model": model, "input": [normalized] });

        let mut last_err = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/embeddings", self.provider_url))
                .bearer_auth(&self.provider_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embedding_response(&json);
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "embedding provider error {status}: {body_text}"
                        ));
                        continue;
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("embedding provider error {status}: {body_text}");
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding request failed after retries")))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn model_name(&self, content_type: ContentType) -> &str {
        match content_type {
            ContentType::Text => TEXT_MODEL,
            ContentType::Code => CODE_MODEL,
        }
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_passage(&self, text: &str, content_type: ContentType) -> anyhow::Result<Vec<f32>> {
        self.embed_one(text, content_type).await
    }

    async fn embed_query(&self, text: &str, content_type: ContentType) -> anyhow::Result<Vec<f32>> {
        self.embed_one(text, content_type).await
    }
}

fn parse_embedding_response(json: &serde_json::Value) -> anyhow::Result<Vec<f32>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("embedding response missing data array"))?;
    let first = data
        .first()
        .ok_or_else(|| anyhow::anyhow!("embedding response data array is empty"))?;
    let embedding = first
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("embedding response missing embedding field"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_code_and_text_to_distinct_models_at_same_dims() {
        let provider = HttpEmbeddingProvider {
            client: reqwest::Client::new(),
            provider_url: "https://embed.example.com".into(),
            provider_key: "key".into(),
        };
        assert_ne!(
            provider.model_name(ContentType::Text),
            provider.model_name(ContentType::Code)
        );
        assert_eq!(provider.dims(), 1536);
    }

    #[test]
    fn parses_first_embedding_from_response() {
        let json = serde_json::json!({
            "data": [{ "embedding": [0.1, 0.2, 0.3] }]
        });
        let vec = parse_embedding_response(&json).unwrap();
        assert_eq!(vec, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn missing_data_array_is_an_error() {
        let json = serde_json::json!({ "nothing": true });
        assert!(parse_embedding_response(&json).is_err());
    }
}
