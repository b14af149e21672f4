use anyhow::Result;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use kbqa_core::config::EmbeddingConfig;
use kbqa_core::error::Error;
use kbqa_core::traits::Embedder;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Client for an OpenAI-compatible `POST {api_base}/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    url: String,
    model: String,
    dim: usize,
    batch_size: usize,
    id: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::InvalidConfig(format!("{API_KEY_VAR} is empty")).into());
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Provider(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            url: format!("{}/embeddings", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            dim: config.dim,
            batch_size: config.batch_size.max(1),
            id: format!("openai:{}:d{}", config.model, config.dim),
        })
    }

    pub fn from_env(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(API_KEY_VAR)
            .map_err(|_| Error::InvalidConfig(format!("{API_KEY_VAR} is not set")))?;
        Self::new(config, api_key)
    }

    fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut body = json!({ "model": self.model, "input": texts });
        if self.model.starts_with("text-embedding-3") {
            body["dimensions"] = json!(self.dim);
        }
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| Error::Provider(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(Error::Provider(format!("embedding request failed with status {status}: {text}")).into());
        }
        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| Error::Provider(format!("invalid embedding response: {e}")))?;
        into_vectors(parsed, texts.len(), self.dim)
    }
}

impl Embedder for OpenAiEmbedder {
    fn id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(count = batch.len(), model = %self.model, "requesting embeddings");
            out.extend(self.request(batch)?);
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

fn into_vectors(mut response: EmbeddingResponse, expected: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != expected {
        return Err(Error::Provider(format!(
            "embedding response has {} vectors for {} inputs",
            response.data.len(),
            expected
        ))
        .into());
    }
    response.data.sort_by_key(|d| d.index);
    let vectors: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(Error::Provider(format!("embedding of width {} does not match embedding.dim {}", bad.len(), dim)).into());
    }
    Ok(vectors)
}
