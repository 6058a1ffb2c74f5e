use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use mentor_backend::search::providers::RemoteProtocolProvider;
use mentor_backend::search::{ProviderError, SearchProvider};

/// How the fake service answers each JSON-RPC method.
type Script = fn(&str, &Value) -> Response;

#[derive(Clone)]
struct Fake {
    script: Script,
    methods: Arc<Mutex<Vec<String>>>,
}

async fn handle(State(fake): State<Fake>, Json(request): Json<Value>) -> Response {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    fake.methods.lock().expect("methods").push(method.clone());
    (fake.script)(&method, &request)
}

async fn serve(script: Script) -> (String, Arc<Mutex<Vec<String>>>) {
    let methods = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().route("/mcp", post(handle)).with_state(Fake {
        script,
        methods: methods.clone(),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{}/mcp", addr), methods)
}

fn provider(url: &str) -> RemoteProtocolProvider {
    RemoteProtocolProvider::http("tavily-mcp", url, reqwest::Client::new())
}

fn results() -> Value {
    json!({"results": [
        {"title": "Quadratic formula", "url": "https://math.example/quadratic", "content": "x = (-b ± √(b²-4ac)) / 2a"},
        {"title": "Discriminant", "url": "https://math.example/discriminant", "content": "b² - 4ac"}
    ]})
}

fn reply(request: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": request["id"], "result": result})
}

#[tokio::test]
async fn reads_event_stream_bodies() {
    let (url, methods) = serve(|_, request| {
        let body = format!(
            ": ping\n\nevent: message\ndata: {}\n\n",
            reply(request, results())
        );
        ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
    })
    .await;

    let docs = provider(&url).search("quadratic formula", 5).await.expect("docs");
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].title, "Quadratic formula");
    assert_eq!(methods.lock().expect("methods").as_slice(), ["tools/call"]);
}

#[tokio::test]
async fn reads_plain_json_with_nested_text_content() {
    let (url, _) = serve(|_, request| {
        let result = json!({"content": [{"type": "text", "text": results().to_string()}]});
        Json(reply(request, result)).into_response()
    })
    .await;

    let docs = provider(&url).search("discriminant", 5).await.expect("docs");
    assert_eq!(docs[1].url, "https://math.example/discriminant");
}

#[tokio::test]
async fn falls_back_to_the_next_payload_format() {
    let (url, methods) = serve(|method, request| match method {
        "tools/call" => Json(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .into_response(),
        _ => Json(reply(request, results())).into_response(),
    })
    .await;

    let docs = provider(&url).search("roots", 5).await.expect("docs");
    assert_eq!(docs.len(), 2);
    assert_eq!(
        methods.lock().expect("methods").as_slice(),
        ["tools/call", "tavily_search"]
    );
}

#[tokio::test]
async fn every_format_erroring_is_a_failure() {
    let (url, methods) = serve(|_, request| {
        Json(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": -32000, "message": "quota exceeded"}
        }))
        .into_response()
    })
    .await;

    match provider(&url).search("roots", 5).await {
        Err(ProviderError::Remote { code, message }) => {
            assert_eq!(code, -32000);
            assert_eq!(message, "quota exceeded");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(methods.lock().expect("methods").len(), 3);
}

#[tokio::test]
async fn well_formed_empty_answers_are_not_failures() {
    let (url, _) = serve(|_, request| Json(reply(request, json!({"results": []}))).into_response()).await;

    let docs = provider(&url).search("nothing", 5).await.expect("ok");
    assert!(docs.is_empty());
}
