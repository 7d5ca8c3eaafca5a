//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`OpenAIEmbedder`]** — calls the OpenAI-compatible `/embeddings` endpoint.
//! - **[`OllamaEmbedder`]** — calls a local Ollama server's `/api/embed`.
//!
//! Also provides the vector utilities used by the index store:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`] — decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Failure policy
//!
//! Requests are sent once. There is no retry, backoff, or client-side
//! timeout; a failed call is classified into a [`ProviderError`] and
//! returned to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{ProviderError, RagError};

/// A text-to-vector backend.
///
/// The same provider (and model) must be used to build a generation and to
/// embed queries against it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded in the generation manifest.
    fn model_name(&self) -> &str;

    /// Fail early with a configuration error when a call could never succeed
    /// (e.g. no credential). Checked before any request is made.
    fn ensure_configured(&self) -> Result<(), RagError> {
        Ok(())
    }

    /// Embed `texts`, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, ProviderError> {
    provider
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Generic("empty embedding response".to_string()))
}

// ============ OpenAI ============

pub struct OpenAIEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    batch_size: usize,
}

impl OpenAIEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            batch_size: batch_size.max(1),
        }
    }

    async fn embed_batch(
        &self,
        api_key: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("OpenAI", status, &body_text));
        }

        let parsed: OpenAIEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_transport("OpenAI", e))?;
        Ok(parsed.into_vectors())
    }
}

#[derive(Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAIEmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAIEmbeddingResponse {
    /// Vectors ordered by the `index` the API reports for each input.
    fn into_vectors(mut self) -> Vec<Vec<f32>> {
        self.data.sort_by_key(|item| item.index);
        self.data.into_iter().map(|item| item.embedding).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn ensure_configured(&self) -> Result<(), RagError> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(RagError::configuration(
                "OpenAI API key not set (OPENAI_API_KEY or [openai].api_key)",
            )),
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let api_key = match self.api_key.as_deref() {
            Some(key) => key,
            None => return Err(ProviderError::Auth("no OpenAI API key configured".into())),
        };

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            tracing::debug!(batch = batch.len(), model = %self.model, "embedding batch");
            vectors.extend(self.embed_batch(api_key, batch).await?);
        }
        Ok(vectors)
    }
}

// ============ Ollama ============

pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    batch_size: usize,
}

impl OllamaEmbedder {
    pub fn new(url: impl Into<String>, model: impl Into<String>, batch_size: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            batch_size: batch_size.max(1),
        }
    }
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });

            let response = self
                .client
                .post(format!("{}/api/embed", self.url))
                .json(&body)
                .send()
                .await
                .map_err(|e| ProviderError::from_transport("Ollama", e))?;

            let status = response.status();
            if !status.is_success() {
                let body_text = response.text().await.unwrap_or_default();
                return Err(ProviderError::from_status("Ollama", status, &body_text));
            }

            let parsed: OllamaEmbedResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::from_transport("Ollama", e))?;
            vectors.extend(parsed.embeddings);
        }
        Ok(vectors)
    }
}

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Create the [`EmbeddingProvider`] named by `[embedding].provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"openai"` | [`OpenAIEmbedder`] (URL defaults to `[openai].base_url`) |
/// | `"ollama"` | [`OllamaEmbedder`] (URL defaults to `http://localhost:11434`) |
pub fn create_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, RagError> {
    let emb = &config.embedding;
    match emb.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(
            emb.url.clone().unwrap_or_else(|| config.openai.base_url.clone()),
            config.openai.key().map(str::to_string),
            emb.model.clone(),
            emb.batch_size,
        ))),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(
            emb.url.clone().unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            emb.model.clone(),
            emb.batch_size,
        ))),
        other => Err(RagError::configuration(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, and
/// zero-norm vectors.
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

/// Cosine distance, `1 - cosine_similarity`. Lower is closer.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
