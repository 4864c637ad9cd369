//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledEmbeddings`]** — returns errors; used when no model is configured.
//! - **[`OpenAiEmbeddings`]** — calls the OpenAI embeddings API with bounded
//!   retry and linearly increasing backoff.
//!
//! A provider returns a whole vector or an error — never a partial vector.
//! Callers treat an error as "no embedding produced" and skip that unit of
//! work; one failed chunk never aborts a batch. Dropping the returned future
//! cancels any outstanding retry cleanly.
//!
//! Also provides vector utilities shared by storage and retrieval:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 codec for SQLite
//!   BLOB storage

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::ModelConfig;

/// Trait for embedding providers. Any implementation satisfying this
/// contract is substitutable, including deterministic fakes in tests.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Returns the full vector or an error; never partial.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
}

// ============ Disabled provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `model.provider = "disabled"`. Ingestion still works — chunks
/// simply fail to embed and are skipped — which keeps the pipeline usable
/// offline and in tests.
pub struct DisabledEmbeddings;

#[async_trait]
impl EmbeddingProvider for DisabledEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled")
    }

    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }
}

// ============ OpenAI provider ============

/// Embedding provider backed by the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
///
/// Retry strategy follows the pipeline contract: any failure — network,
/// HTTP status, or malformed body — is retried up to `max_retries` total
/// attempts, sleeping `retry_delay_secs × attempt` between attempts.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
    retry_delay: Duration,
}

impl OpenAiEmbeddings {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.embedding_model.clone(),
            dims: config.embedding_dims,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "encoding_format": "float",
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_embedding_response(&json)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_err = None;

        for attempt in 1..=self.max_retries {
            match self.request_embedding(text).await {
                Ok(vec) => return Ok(vec),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "embedding attempt failed");
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        // Linear backoff: delay, 2×delay, 3×delay, ...
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Extract `data[0].embedding` from an OpenAI embeddings response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Create the [`EmbeddingProvider`] selected by configuration.
pub fn create_embedding_provider(config: &ModelConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbeddings)),
        "openai" => Ok(Box::new(OpenAiEmbeddings::new(config)?)),
        other => bail!("Unknown model provider: {}", other),
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Defined as `0.0` for empty vectors,
/// vectors of different lengths, or (near-)zero norms — never panics,
/// never divides by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_self_similarity_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_is_symmetric() {
        let a = vec![0.3, -1.2, 4.5, 0.0];
        let b = vec![2.0, 0.7, -0.4, 1.1];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_zero_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_parse_embedding_response() {
        let json = serde_json::json!({
            "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}],
            "model": "text-embedding-3-small",
        });
        let vec = parse_embedding_response(&json).unwrap();
        assert_eq!(vec.len(), 3);
        assert!((vec[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_parse_embedding_response_missing_data() {
        let json = serde_json::json!({"error": {"message": "boom"}});
        assert!(parse_embedding_response(&json).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let err = DisabledEmbeddings.embed("anything").await;
        assert!(err.is_err());
    }
}
