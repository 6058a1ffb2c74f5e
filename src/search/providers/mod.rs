use std::sync::Arc;

use crate::core::config::SearchSection;

use super::SearchProvider;

pub mod jsonrpc;
pub mod remote;
pub mod tavily;
pub mod tool;

pub use remote::{RemoteProtocolProvider, RemoteTransport};
pub use tavily::DirectSdkProvider;
pub use tool::{LibraryToolProvider, SearchEngine};

pub const REMOTE_PROVIDER: &str = "tavily-mcp";
pub const DIRECT_PROVIDER: &str = "tavily-api";

/// Builds the provider chain in priority order: remote protocol service,
/// web search tool, direct Tavily client. Unconfigured providers are left
/// out. The search tool is present unless switched off, since DuckDuckGo
/// needs no key.
pub fn build_providers(search: &SearchSection, client: &reqwest::Client) -> Vec<Arc<dyn SearchProvider>> {
    let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();

    let url = search.mcp_url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let command = search
        .mcp_command
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if let Some(url) = url {
        providers.push(Arc::new(RemoteProtocolProvider::http(
            REMOTE_PROVIDER,
            url,
            client.clone(),
        )));
    } else if let Some(command) = command {
        providers.push(Arc::new(RemoteProtocolProvider::stdio(
            REMOTE_PROVIDER,
            command,
            search.mcp_args.clone(),
        )));
    }

    if search.tool_enabled {
        providers.push(Arc::new(LibraryToolProvider::from_config(search, client.clone())));
    }

    if let Some(key) = search
        .tavily_api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
    {
        providers.push(Arc::new(DirectSdkProvider::new(
            DIRECT_PROVIDER,
            key,
            client.clone(),
        )));
    }

    let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
    tracing::info!(providers = ?names, "search.providers.configured");

    providers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(providers: &[Arc<dyn SearchProvider>]) -> Vec<String> {
        providers.iter().map(|p| p.name().to_string()).collect()
    }

    #[test]
    fn default_chain_is_only_the_search_tool() {
        let providers = build_providers(&SearchSection::default(), &reqwest::Client::new());
        assert_eq!(names(&providers), vec!["search-tool:duckduckgo"]);
    }

    #[test]
    fn full_chain_keeps_priority_order() {
        let mut section = SearchSection::default();
        section.mcp_url = Some("http://127.0.0.1:9/mcp".to_string());
        section.mcp_command = Some("tavily-server".to_string());
        section.tavily_api_key = Some("tvly-key".to_string());

        let providers = build_providers(&section, &reqwest::Client::new());
        assert_eq!(
            names(&providers),
            vec!["tavily-mcp", "search-tool:duckduckgo", "tavily-api"]
        );
    }

    #[test]
    fn disabled_search_tool_leaves_the_chain() {
        let mut section = SearchSection::default();
        section.tool_enabled = false;
        section.tavily_api_key = Some("tvly-key".to_string());
        let providers = build_providers(&section, &reqwest::Client::new());
        assert_eq!(names(&providers), vec!["tavily-api"]);

        section.tavily_api_key = None;
        assert!(build_providers(&section, &reqwest::Client::new()).is_empty());
    }

    #[test]
    fn stdio_is_used_when_no_url() {
        let mut section = SearchSection::default();
        section.mcp_command = Some("tavily-server".to_string());
        let providers = build_providers(&section, &reqwest::Client::new());
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].name(), "tavily-mcp");
    }
}
