//! JSON-RPC framing shared by the HTTP and stdio transports.

use serde_json::{json, Map, Value};

use crate::search::{Document, ProviderError};

pub const JSONRPC_VERSION: &str = "2.0";
pub const SEARCH_TOOL: &str = "tavily_search";

/// Request shapes understood by the search services we talk to, tried in
/// this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    ToolsCall,
    DirectMethod,
    CallTool,
}

impl PayloadFormat {
    pub const ALL: [PayloadFormat; 3] = [
        PayloadFormat::ToolsCall,
        PayloadFormat::DirectMethod,
        PayloadFormat::CallTool,
    ];

    pub fn method(&self) -> &'static str {
        match self {
            PayloadFormat::ToolsCall => "tools/call",
            PayloadFormat::DirectMethod => SEARCH_TOOL,
            PayloadFormat::CallTool => "call_tool",
        }
    }

    pub fn request(&self, id: u64, query: &str, max_results: usize) -> Value {
        let arguments = Value::Object(search_arguments(query, max_results));
        let params = match self {
            PayloadFormat::DirectMethod => arguments,
            PayloadFormat::ToolsCall | PayloadFormat::CallTool => json!({
                "name": SEARCH_TOOL,
                "arguments": arguments,
            }),
        };
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": self.method(),
            "params": params,
        })
    }
}

/// Arguments of the search tool.
pub fn search_arguments(query: &str, max_results: usize) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("query".to_string(), Value::from(query));
    arguments.insert("max_results".to_string(), Value::from(max_results));
    arguments
}

/// Returns the data of the last event in a server-sent event body.
///
/// The `data:` lines of one event are joined with `\n`; a blank line ends
/// the event. `[DONE]` markers, comments and other fields are ignored.
pub fn last_sse_payload(body: &str) -> Option<String> {
    let mut last: Option<String> = None;
    let mut event: Vec<&str> = Vec::new();

    for line in body.lines().chain(std::iter::once("")) {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !event.is_empty() {
                let data = event.join("\n");
                let trimmed = data.trim();
                if !trimmed.is_empty() && trimmed != "[DONE]" {
                    last = Some(trimmed.to_string());
                }
                event.clear();
            }
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            event.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    last
}

/// Turns a JSON-RPC response into documents.
///
/// `error` objects are failures. A well-formed response without any
/// recognisable result list yields `Ok(vec![])`.
pub fn parse_response(message: &Value) -> Result<Vec<Document>, ProviderError> {
    if let Some(error) = message.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ProviderError::Remote { code, message });
    }

    let result = message
        .get("result")
        .ok_or_else(|| ProviderError::Malformed("response has neither result nor error".into()))?;

    if result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false) {
        let message = content_texts(result).collect::<Vec<_>>().join(" ");
        return Err(ProviderError::Remote {
            code: 0,
            message: if message.is_empty() {
                "tool reported an error".to_string()
            } else {
                message
            },
        });
    }

    // Nested: result.content[] text items holding a JSON document.
    for text in content_texts(result) {
        let Ok(inner) = serde_json::from_str::<Value>(text) else {
            continue;
        };
        let documents = documents_from_results(&inner);
        if !documents.is_empty() {
            return Ok(documents);
        }
    }

    Ok(documents_from_results(result))
}

fn content_texts<'a>(result: &'a Value) -> impl Iterator<Item = &'a str> + 'a {
    result
        .get("content")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
}

/// Direct shape: `{results: [...]}` or the array itself.
pub fn documents_from_results(value: &Value) -> Vec<Document> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("results") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };
    items.iter().filter_map(Document::from_result_item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_formats_follow_expected_shapes() {
        let tools_call = PayloadFormat::ToolsCall.request(7, "limits", 3);
        assert_eq!(tools_call["method"], "tools/call");
        assert_eq!(tools_call["id"], 7);
        assert_eq!(tools_call["params"]["name"], "tavily_search");
        assert_eq!(tools_call["params"]["arguments"]["max_results"], 3);

        let direct = PayloadFormat::DirectMethod.request(8, "limits", 3);
        assert_eq!(direct["method"], "tavily_search");
        assert_eq!(direct["params"]["query"], "limits");

        assert_eq!(PayloadFormat::CallTool.request(9, "q", 1)["method"], "call_tool");
    }

    #[test]
    fn sse_parser_keeps_last_data_line() {
        let body = ": keep-alive\n\
                    event: message\n\
                    data: {\"id\":1,\"partial\":true}\n\n\
                    id: 2\n\
                    data: {\"id\":1,\"result\":{}}\n\n\
                    data: [DONE]\n";
        assert_eq!(
            last_sse_payload(body).as_deref(),
            Some("{\"id\":1,\"result\":{}}")
        );
        assert_eq!(last_sse_payload("event: ping\n\n"), None);
        assert_eq!(last_sse_payload("data: [DONE]\n"), None);
    }

    #[test]
    fn sse_data_lines_of_one_event_are_joined() {
        let body = "event: message\r\n\
                    data: {\"id\":1,\r\n\
                    data: \"result\":{\"results\":[]}}\r\n\r\n";
        let payload = last_sse_payload(body).expect("payload");
        let message: Value = serde_json::from_str(&payload).expect("json");
        assert_eq!(message["id"], 1);
        assert!(parse_response(&message).expect("ok").is_empty());
    }

    #[test]
    fn direct_result_shape() {
        let message = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"results": [
                {"title": "Chain rule", "url": "https://a.com/chain", "content": "d/dx f(g(x))", "score": 0.9},
                {"title": "No url"}
            ]}
        });
        let docs = parse_response(&message).expect("docs");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "Chain rule");
        assert_eq!(docs[0].snippet, "d/dx f(g(x))");
    }

    #[test]
    fn result_may_be_the_array_itself() {
        let message = json!({"id": 1, "result": [{"url": "https://a.com/1"}]});
        assert_eq!(parse_response(&message).expect("docs").len(), 1);
    }

    #[test]
    fn nested_text_content_shape() {
        let inner = json!({"results": [{"title": "Limits", "url": "https://b.com/limits", "content": "lim"}]});
        let message = json!({
            "id": 1,
            "result": {"content": [
                {"type": "image", "data": "..."},
                {"type": "text", "text": "not json"},
                {"type": "text", "text": inner.to_string()}
            ]}
        });
        let docs = parse_response(&message).expect("docs");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].url, "https://b.com/limits");
    }

    #[test]
    fn rpc_error_is_a_failure() {
        let message = json!({"id": 1, "error": {"code": -32601, "message": "Method not found"}});
        match parse_response(&message) {
            Err(ProviderError::Remote { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn tool_error_flag_is_a_failure() {
        let message = json!({"id": 1, "result": {"isError": true, "content": [{"type": "text", "text": "quota exceeded"}]}});
        assert!(matches!(
            parse_response(&message),
            Err(ProviderError::Remote { .. })
        ));
    }

    #[test]
    fn unknown_shape_yields_no_documents() {
        let message = json!({"id": 1, "result": {"answer": "42"}});
        assert!(parse_response(&message).expect("ok").is_empty());
        assert!(matches!(
            parse_response(&json!({"id": 1})),
            Err(ProviderError::Malformed(_))
        ));
    }
}
