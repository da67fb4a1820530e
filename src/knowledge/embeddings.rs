//! Embeddings client (OpenAI-compatible `/embeddings` endpoint)

use crate::error::OrchestrationError;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Reusable embeddings client (connection-pooled)
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(base_url: &str, api_key: String, model: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Embedding request failed: {}", e);
                OrchestrationError::Knowledge(format!("embedding request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestrationError::Knowledge(format!(
                "embedding endpoint returned {}",
                status
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            OrchestrationError::Knowledge(format!("invalid embedding response: {}", e))
        })?;

        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| OrchestrationError::Knowledge("empty embedding response".to_string()))?;

        debug!(dimensions = embedding.len(), "Query embedded");
        Ok(embedding)
    }
}

/// pgvector literal: `[0.1,0.2,...]`.
pub fn to_vector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|x| format!("{:.8}", x)).collect();
    format!("[{}]", parts.join(","))
}
