use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use rmcp::model::CallToolRequestParams;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::ServiceExt;
use serde_json::{json, Value};
use tokio::process::Command;

use super::jsonrpc::{self, PayloadFormat, SEARCH_TOOL};
use crate::search::{status_error, Document, ProviderError, SearchProvider};

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Clone)]
pub enum RemoteTransport {
    Http { url: String },
    Stdio { command: String, args: Vec<String> },
}

/// Search service reached over JSON-RPC.
///
/// Over HTTP every payload format is tried in order within one call and the
/// first one that produces documents wins. Over stdio the child is an MCP
/// server and the search tool is called through an `rmcp` client session.
pub struct RemoteProtocolProvider {
    name: String,
    transport: RemoteTransport,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl RemoteProtocolProvider {
    pub fn new(name: impl Into<String>, transport: RemoteTransport, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            transport,
            client,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn http(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self::new(name, RemoteTransport::Http { url: url.into() }, client)
    }

    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self::new(
            name,
            RemoteTransport::Stdio {
                command: command.into(),
                args,
            },
            reqwest::Client::new(),
        )
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn search_http(
        &self,
        url: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Document>, ProviderError> {
        let mut last_error: Option<ProviderError> = None;
        let mut answered = false;

        for format in PayloadFormat::ALL {
            let payload = format.request(self.next_id(), query, max_results);
            tracing::debug!(provider = %self.name, method = format.method(), "search.remote.attempt");

            let response = match self
                .client
                .post(url)
                .header(ACCEPT, "text/event-stream, application/json")
                .header(CONTENT_TYPE, "application/json")
                .json(&payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) if err.is_connect() => return Err(err.into()),
                Err(err) => {
                    last_error = Some(err.into());
                    continue;
                }
            };

            if !response.status().is_success() {
                last_error = Some(status_error(response).await);
                continue;
            }

            let message = match read_message(response).await {
                Ok(message) => message,
                Err(err) => {
                    last_error = Some(err);
                    continue;
                }
            };

            match jsonrpc::parse_response(&message) {
                Ok(documents) if !documents.is_empty() => {
                    tracing::debug!(
                        provider = %self.name,
                        method = format.method(),
                        documents = documents.len(),
                        "search.remote.success"
                    );
                    return Ok(documents);
                }
                Ok(_) => answered = true,
                Err(err) => last_error = Some(err),
            }
        }

        if answered {
            return Ok(Vec::new());
        }
        Err(last_error.unwrap_or_else(|| ProviderError::Malformed("no payload format accepted".into())))
    }

    /// Runs one `tools/call` against a child process speaking the MCP
    /// stdio protocol. The process lives for this call only.
    async fn search_stdio(
        &self,
        command: &str,
        args: &[String],
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Document>, ProviderError> {
        let transport = TokioChildProcess::new(Command::new(command).configure(|cmd| {
            cmd.args(args).kill_on_drop(true);
        }))
        .map_err(|err| ProviderError::Transport(format!("failed to spawn '{}': {}", command, err)))?;

        let service = ().serve(transport).await.map_err(|err| {
            ProviderError::Transport(format!("failed to connect to '{}': {}", command, err))
        })?;

        let params = CallToolRequestParams {
            name: SEARCH_TOOL.into(),
            arguments: Some(jsonrpc::search_arguments(query, max_results)),
            meta: None,
            task: None,
        };
        tracing::debug!(provider = %self.name, method = "tools/call", "search.remote.attempt");
        let result = service.call_tool(params).await;

        if let Err(err) = service.cancel().await {
            tracing::debug!(provider = %self.name, reason = %err, "search.remote.shutdown_failed");
        }

        let result = result.map_err(|err| ProviderError::Remote {
            code: 0,
            message: err.to_string(),
        })?;
        let result = serde_json::to_value(&result)?;

        let documents = jsonrpc::parse_response(&json!({ "result": result }))?;
        if !documents.is_empty() {
            return Ok(documents);
        }
        Ok(result
            .get("structuredContent")
            .map(jsonrpc::documents_from_results)
            .unwrap_or_default())
    }
}

#[async_trait]
impl SearchProvider for RemoteProtocolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Document>, ProviderError> {
        match &self.transport {
            RemoteTransport::Http { url } => self.search_http(url, query, max_results).await,
            RemoteTransport::Stdio { command, args } => {
                self.search_stdio(command, args, query, max_results).await
            }
        }
    }
}

async fn read_message(response: reqwest::Response) -> Result<Value, ProviderError> {
    let is_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains(EVENT_STREAM))
        .unwrap_or(false);
    let body = response.text().await?;

    if is_stream {
        let payload = jsonrpc::last_sse_payload(&body)
            .ok_or_else(|| ProviderError::Malformed("empty event stream".into()))?;
        Ok(serde_json::from_str(&payload)?)
    } else {
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_command_is_a_transport_failure() {
        let provider = RemoteProtocolProvider::stdio(
            "tavily-mcp",
            "/nonexistent/definitely-not-a-search-server",
            Vec::new(),
        );
        let err = provider.search("limits", 3).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }

    /// A shell stand-in for an MCP search server: answers `initialize` and
    /// `tools/call`, ignores notifications.
    #[cfg(unix)]
    const FAKE_MCP_SERVER: &str = r#"
result='{"content":[{"type":"text","text":"{\"results\":[{\"title\":\"Limits\",\"url\":\"https://b.com/limits\",\"content\":\"lim\"}]}"}]}'
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"fake-search","version":"0.1.0"}}}\n' "$id" ;;
    *'"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":%s}\n' "$id" "$result" ;;
  esac
done
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn stdio_server_is_queried_through_an_mcp_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("server.sh");
        std::fs::write(&script, FAKE_MCP_SERVER).expect("write script");

        let provider = RemoteProtocolProvider::stdio(
            "tavily-mcp",
            "sh",
            vec![script.to_string_lossy().into_owned()],
        );
        let docs = provider.search("limits", 3).await.expect("docs");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].url, "https://b.com/limits");
        assert_eq!(docs[0].title, "Limits");
    }

    #[tokio::test]
    async fn unreachable_http_endpoint_fails_fast() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let provider = RemoteProtocolProvider::http(
            "tavily-mcp",
            format!("http://{}/mcp", addr),
            reqwest::Client::new(),
        );
        assert!(provider.search("limits", 3).await.is_err());
    }
}
