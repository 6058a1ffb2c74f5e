//! Web search: provider abstraction, URL identity and the aggregator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod aggregator;
pub mod providers;

pub use aggregator::WebSearchAggregator;

const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Priority index of the provider that produced this document (0 = highest).
    pub provider_rank: usize,
    pub provider: String,
    #[serde(default)]
    pub score: f32,
}

impl Document {
    pub fn new(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            provider_rank: 0,
            provider: String::new(),
            score: 0.0,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Builds a document from a Tavily-style result item
    /// (`{title, url, content, score}`).
    pub fn from_result_item(item: &Value) -> Option<Self> {
        let url = item.get("url").and_then(|v| v.as_str())?.trim();
        if url.is_empty() {
            return None;
        }
        let title = item
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(UNTITLED);
        let snippet = item
            .get("content")
            .or_else(|| item.get("snippet"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let score = item.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;

        Some(Document::new(url, title, snippet).with_score(score))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}

/// Maps a non-success HTTP status to the matching provider error.
pub(crate) async fn status_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(200).collect();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        ProviderError::Auth(format!("{}: {}", status, body))
    } else {
        ProviderError::Status {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<Document>, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded { returned: usize, added: usize },
    Failed { reason: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderAttempt {
    pub provider: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedContext {
    pub documents: Vec<Document>,
    pub attempts: Vec<ProviderAttempt>,
}

impl AggregatedContext {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn citations(&self) -> Vec<Citation> {
        self.documents
            .iter()
            .map(|doc| Citation {
                title: doc.title.clone(),
                url: doc.url.clone(),
            })
            .collect()
    }

    /// Providers that contributed at least one document, in order.
    pub fn contributing_providers(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, AttemptOutcome::Succeeded { added, .. } if added > 0))
            .map(|a| a.provider.as_str())
            .collect()
    }
}

/// Identity key of a document URL.
///
/// Scheme, host and path are compared case-insensitively, a trailing
/// slash on the path is dropped, query string and fragment are ignored. Returns `None` for
/// empty, relative or host-less URLs.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }

    let mut key = format!("{}://{}", url.scheme().to_ascii_lowercase(), host);
    if let Some(port) = url.port() {
        key.push_str(&format!(":{}", port));
    }
    key.push_str(url.path().to_ascii_lowercase().trim_end_matches('/'));
    Some(key)
}
