use async_trait::async_trait;
use serde_json::Value;

use crate::core::config::SearchSection;
use crate::search::{status_error, Document, ProviderError, SearchProvider};

const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";
const BRAVE_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const BING_URL: &str = "https://api.bing.microsoft.com/v7.0/search";
const GOOGLE_URL: &str = "https://www.googleapis.com/customsearch/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    Brave,
    Bing,
    Google,
    DuckDuckGo,
}

impl SearchEngine {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "brave" => SearchEngine::Brave,
            "bing" => SearchEngine::Bing,
            "google" => SearchEngine::Google,
            _ => SearchEngine::DuckDuckGo,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::Brave => "brave",
            SearchEngine::Bing => "bing",
            SearchEngine::Google => "google",
            SearchEngine::DuckDuckGo => "duckduckgo",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct EngineKeys {
    brave: Option<String>,
    bing: Option<String>,
    google: Option<String>,
    google_engine_id: Option<String>,
}

/// General-purpose web search tool with an engine selector.
///
/// The selected engine is used when its credentials are configured; any
/// failure or empty answer from it falls back to DuckDuckGo, which needs
/// no key.
pub struct LibraryToolProvider {
    name: String,
    engine: SearchEngine,
    keys: EngineKeys,
    client: reqwest::Client,
    duckduckgo_url: String,
}

impl LibraryToolProvider {
    pub fn from_config(search: &SearchSection, client: reqwest::Client) -> Self {
        let engine = SearchEngine::parse(&search.tool_engine);
        Self {
            name: format!("search-tool:{}", engine.as_str()),
            engine,
            keys: EngineKeys {
                brave: search.brave_search_api_key.clone(),
                bing: search.bing_search_api_key.clone(),
                google: search.google_search_api_key.clone(),
                google_engine_id: search.google_search_engine_id.clone(),
            },
            client,
            duckduckgo_url: DUCKDUCKGO_URL.to_string(),
        }
    }

    /// Points the keyless fallback at another endpoint (tests).
    pub fn with_duckduckgo_url(mut self, url: impl Into<String>) -> Self {
        self.duckduckgo_url = url.into();
        self
    }

    pub fn engine(&self) -> SearchEngine {
        self.engine
    }

    async fn search_selected(&self, query: &str) -> Option<Result<Vec<Document>, ProviderError>> {
        let key = |k: &Option<String>| k.clone().filter(|v| !v.trim().is_empty());
        match self.engine {
            SearchEngine::Brave => {
                let api_key = key(&self.keys.brave)?;
                Some(self.brave_search(query, &api_key).await)
            }
            SearchEngine::Bing => {
                let api_key = key(&self.keys.bing)?;
                Some(self.bing_search(query, &api_key).await)
            }
            SearchEngine::Google => {
                let api_key = key(&self.keys.google)?;
                let engine_id = key(&self.keys.google_engine_id)?;
                Some(self.google_search(query, &api_key, &engine_id).await)
            }
            SearchEngine::DuckDuckGo => None,
        }
    }

    async fn google_search(
        &self,
        query: &str,
        api_key: &str,
        engine_id: &str,
    ) -> Result<Vec<Document>, ProviderError> {
        let response = self
            .client
            .get(GOOGLE_URL)
            .query(&[("key", api_key), ("cx", engine_id), ("q", query)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let payload: Value = response.json().await?;
        let items = payload
            .get("items")
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(collect_items(items, "title", "link", "snippet"))
    }

    async fn brave_search(&self, query: &str, api_key: &str) -> Result<Vec<Document>, ProviderError> {
        let response = self
            .client
            .get(BRAVE_URL)
            .query(&[("q", query)])
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let payload: Value = response.json().await?;
        let items = payload
            .get("web")
            .and_then(|w| w.get("results"))
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(collect_items(items, "title", "url", "description"))
    }

    async fn bing_search(&self, query: &str, api_key: &str) -> Result<Vec<Document>, ProviderError> {
        let response = self
            .client
            .get(BING_URL)
            .query(&[("q", query)])
            .header("Ocp-Apim-Subscription-Key", api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let payload: Value = response.json().await?;
        let items = payload
            .get("webPages")
            .and_then(|wp| wp.get("value"))
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(collect_items(items, "name", "url", "snippet"))
    }

    async fn duckduckgo_search(&self, query: &str) -> Result<Vec<Document>, ProviderError> {
        let response = self
            .client
            .get(&self.duckduckgo_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_redirect", "1"),
                ("no_html", "1"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let payload: Value = response.json().await?;
        Ok(parse_duckduckgo(&payload))
    }
}

#[async_trait]
impl SearchProvider for LibraryToolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Document>, ProviderError> {
        let mut documents = match self.search_selected(query).await {
            Some(Ok(documents)) if !documents.is_empty() => documents,
            Some(Ok(_)) => {
                tracing::debug!(engine = self.engine.as_str(), "search.tool.empty_fallback");
                self.duckduckgo_search(query).await?
            }
            Some(Err(err)) => {
                tracing::warn!(engine = self.engine.as_str(), reason = %err, "search.tool.engine_failed");
                self.duckduckgo_search(query).await?
            }
            None => self.duckduckgo_search(query).await?,
        };
        documents.truncate(max_results);
        Ok(documents)
    }
}

fn collect_items(items: &[Value], title_key: &str, url_key: &str, snippet_key: &str) -> Vec<Document> {
    items
        .iter()
        .filter_map(|item| {
            let title = item.get(title_key).and_then(|v| v.as_str()).unwrap_or("");
            let url = item.get(url_key).and_then(|v| v.as_str()).unwrap_or("");
            let snippet = item.get(snippet_key).and_then(|v| v.as_str()).unwrap_or("");
            if title.is_empty() || url.is_empty() {
                return None;
            }
            Some(Document::new(url, title, snippet))
        })
        .collect()
}

pub(crate) fn parse_duckduckgo(payload: &Value) -> Vec<Document> {
    let mut results = Vec::new();

    let abstract_text = payload.get("AbstractText").and_then(|v| v.as_str()).unwrap_or("");
    let abstract_url = payload.get("AbstractURL").and_then(|v| v.as_str()).unwrap_or("");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let heading = payload
            .get("Heading")
            .and_then(|v| v.as_str())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| abstract_text.split(" - ").next().unwrap_or(abstract_text));
        results.push(Document::new(abstract_url, heading, abstract_text));
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        extract_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        extract_topics(items, &mut results);
    }

    results
}

fn extract_topics(items: &[Value], results: &mut Vec<Document>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        let title = text.split(" - ").next().unwrap_or(text);
        results.push(Document::new(url, title, text));
    }
}
