use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::jsonrpc::documents_from_results;
use crate::search::{status_error, Document, ProviderError, SearchProvider};

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
    include_images: bool,
}

/// Direct client of the Tavily REST API.
pub struct DirectSdkProvider {
    name: String,
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl DirectSdkProvider {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            endpoint: TAVILY_SEARCH_URL.to_string(),
            client,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for DirectSdkProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Document>, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("TAVILY_API_KEY".into()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&TavilyRequest {
                query,
                max_results,
                search_depth: "basic",
                include_images: false,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let payload: Value = response.json().await?;
        if !payload.is_object() {
            return Err(ProviderError::Malformed("expected a JSON object".into()));
        }
        let mut documents = documents_from_results(&payload);
        documents.truncate(max_results);
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_key_is_not_configured() {
        let provider = DirectSdkProvider::new("tavily-api", " ", reqwest::Client::new());
        let err = provider.search("limits", 3).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
