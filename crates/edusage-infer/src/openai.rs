//! OpenAI-compatible `/v1/embeddings` client.

use async_trait::async_trait;
use ndarray::Array1;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::cache::QueryCache;
use crate::embedder::EmbedderBackend;
use edusage_core::{EmbeddingSettings, Error, Result};

/// Inputs per request.
const BATCH_SIZE: usize = 64;

pub struct OpenAiEmbedder {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    dimension: usize,
    cache: QueryCache,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".into()))?;
        Ok(Self {
            client: Client::new(),
            url: format!("{}/v1/embeddings", settings.base_url.trim_end_matches('/')),
            api_key,
            model: settings.model.clone(),
            dimension: settings.dimension,
            cache: QueryCache::for_queries(),
        })
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Array1<f32>>> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": inputs }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Embedding API error {}: {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Malformed embedding response: {}", e)))?;
        if parsed.data.len() != inputs.len() {
            return Err(Error::Inference(format!(
                "Embedding API returned {} vectors for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);

        parsed
            .data
            .into_iter()
            .map(|d| {
                if d.embedding.len() != self.dimension {
                    return Err(Error::Inference(format!(
                        "Embedding dimension mismatch for model '{}': expected {}, got {}",
                        self.model,
                        self.dimension,
                        d.embedding.len()
                    )));
                }
                Ok(Array1::from(d.embedding))
            })
            .collect()
    }
}

#[async_trait]
impl EmbedderBackend for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Array1<f32>> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit);
        }
        let embedding = self
            .request(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::Inference("Embedding API returned no vectors".into()))?;
        self.cache.put(text, embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Array1<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            debug!("Embedding batch of {} texts", batch.len());
            out.extend(self.request(batch).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}
