use async_trait::async_trait;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::RetrievalError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Raw embedding of `text`; callers normalize.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

/// Scales `vector` to unit length.
pub fn normalize(vector: Vec<f32>) -> Result<Vec<f32>, RetrievalError> {
    let array = Array1::from(vector);
    let norm = array.dot(&array).sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return Err(RetrievalError::Embedding("zero-length embedding".into()));
    }
    Ok((array / norm).to_vec())
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini `embedContent` client.
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiEmbedder {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
        let request = EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
        };

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Embedding(format!(
                "embedContent returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        if parsed.embedding.values.is_empty() {
            return Err(RetrievalError::Embedding("empty embedding".into()));
        }
        Ok(parsed.embedding.values)
    }
}
