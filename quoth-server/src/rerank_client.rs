//! HTTP reranker client (C2's stateful half).
//!
//! Implements `quoth_core::rerank::RerankProvider` against a Cohere-style
//! rerank endpoint. Optional: when `RERANKER_PROVIDER_KEY` is unset,
//! `retrieval.rs` never constructs one and the pipeline skips straight to
//! dynamic-cutoff ranking on the raw vector-similarity scores.
//!
//! Grounded on the teacher's `embedding.rs::embed_openai` retry/backoff
//! shape, reused verbatim for this second HTTP gateway client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use quoth_core::rerank::{RerankProvider, RerankResult, MAX_CANDIDATES};

use crate::config::RerankerConfig;

const RERANK_URL: &str = "https://api.cohere.ai/v1/rerank";
const RERANK_MODEL: &str = "rerank-english-v3.0";
const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpRerankProvider {
    client: reqwest::Client,
    provider_key: String,
}

impl HttpRerankProvider {
    pub fn new(config: &RerankerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            provider_key: config.provider_key.clone(),
        })
    }
}

#[async_trait]
impl RerankProvider for HttpRerankProvider {
    async fn rerank(&self, query: &str, candidates: &[String]) -> anyhow::Result<Vec<RerankResult>> {
        let truncated: Vec<&String> = candidates.iter().take(MAX_CANDIDATES).collect();
        let body = json!({
            "model": RERANK_MODEL,
            "query": query,
            "documents": truncated,
        });

        let mut last_err = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(RERANK_URL)
                .bearer_auth(&self.provider_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_rerank_response(&json);
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!("reranker error {status}"));
                        continue;
                    }
                    anyhow::bail!("reranker error {status}");
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("rerank request failed after retries")))
    }
}

fn parse_rerank_response(json: &serde_json::Value) -> anyhow::Result<Vec<RerankResult>> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow::anyhow!("rerank response missing results array"))?;

    let mut out = Vec::with_capacity(results.len());
    for item in results {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow::anyhow!("rerank result missing index"))? as usize;
        let relevance = item
            .get("relevance_score")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| anyhow::anyhow!("rerank result missing relevance_score"))?
            as f32;
        out.push(RerankResult { index, relevance });
    }
    out.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_sorts_by_relevance_descending() {
        let json = serde_json::json!({
            "results": [
                { "index": 2, "relevance_score": 0.4 },
                { "index": 0, "relevance_score": 0.9 },
                { "index": 1, "relevance_score": 0.6 },
            ]
        });
        let parsed = parse_rerank_response(&json).unwrap();
        assert_eq!(parsed[0].index, 0);
        assert_eq!(parsed[1].index, 1);
        assert_eq!(parsed[2].index, 2);
    }

    #[test]
    fn missing_results_array_is_an_error() {
        let json = serde_json::json!({});
        assert!(parse_rerank_response(&json).is_err());
    }
}
