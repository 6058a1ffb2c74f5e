use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use mentor_backend::retrieval::{KnowledgeStore, WeaviateStore};

/// In-memory stand-in for the few Weaviate endpoints the store uses. The
/// collection holds current-layout records once it exists.
#[derive(Default)]
struct FakeWeaviate {
    exists: AtomicBool,
    /// The collection shows up right after the first lookup, as when
    /// another writer creates it.
    appears_later: AtomicBool,
    schema_lookups: AtomicUsize,
    queries: Mutex<Vec<String>>,
    created: Mutex<Vec<Value>>,
}

async fn schema(State(fake): State<Arc<FakeWeaviate>>) -> Response {
    fake.schema_lookups.fetch_add(1, Ordering::SeqCst);
    if !fake.exists.load(Ordering::SeqCst) {
        if fake.appears_later.load(Ordering::SeqCst) {
            fake.exists.store(true, Ordering::SeqCst);
        }
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({"class": "Mathvectors", "properties": [
        {"name": "question", "dataType": ["text"]},
        {"name": "answer", "dataType": ["text"]},
        {"name": "source", "dataType": ["text"]}
    ]}))
    .into_response()
}

async fn create(State(fake): State<Arc<FakeWeaviate>>, Json(body): Json<Value>) -> Response {
    fake.created.lock().expect("created").push(body);
    fake.exists.store(true, Ordering::SeqCst);
    Json(json!({"class": "Mathvectors"})).into_response()
}

async fn graphql(State(fake): State<Arc<FakeWeaviate>>, Json(body): Json<Value>) -> Response {
    let query = body["query"].as_str().unwrap_or_default().to_string();
    fake.queries.lock().expect("queries").push(query.clone());
    if query.contains(" input ") {
        return Json(json!({"errors": [
            {"message": "no such prop with name 'input' found in class 'Mathvectors'"}
        ]}))
        .into_response();
    }
    Json(json!({"data": {"Get": {"Mathvectors": [
        {"question": "What is 2+2?", "answer": "4", "source": "user-feedback",
         "_additional": {"id": "kb-1", "certainty": 0.97, "distance": null}}
    ]}}}))
    .into_response()
}

async fn serve(fake: Arc<FakeWeaviate>) -> String {
    let app = Router::new()
        .route("/v1/schema/:class", get(schema))
        .route("/v1/schema", post(create))
        .route("/v1/graphql", post(graphql))
        .with_state(fake);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}", addr)
}

fn store(url: &str) -> WeaviateStore {
    WeaviateStore::new(reqwest::Client::new(), url, None, "mathvectors")
}

#[tokio::test]
async fn missing_schema_is_not_pinned_to_the_legacy_layout() {
    let fake = Arc::new(FakeWeaviate::default());
    fake.appears_later.store(true, Ordering::SeqCst);
    let store = store(&serve(fake.clone()).await);

    let first = store.nearest(&[1.0, 0.0], 4).await.expect("first read");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].question, "What is 2+2?");
    assert_eq!(first[0].answer, "4");

    let second = store.nearest(&[1.0, 0.0], 4).await.expect("second read");
    assert_eq!(second[0].id, "kb-1");

    let queries = fake.queries.lock().expect("queries").clone();
    assert_eq!(queries.len(), 3, "{:?}", queries);
    assert!(queries[0].contains("input label source_file"));
    assert!(queries[1].contains("question answer source"));
    assert!(queries[2].contains("question answer source"));
    assert_eq!(fake.schema_lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_collection_is_created_in_the_current_layout() {
    let fake = Arc::new(FakeWeaviate::default());
    let store = store(&serve(fake.clone()).await);

    store.ensure_ready().await.expect("bootstrap");

    let created = fake.created.lock().expect("created").clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["class"], "Mathvectors");
    let names: Vec<&str> = created[0]["properties"]
        .as_array()
        .expect("properties")
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, ["question", "answer", "source"]);

    let records = store.nearest(&[1.0, 0.0], 4).await.expect("read");
    assert_eq!(records.len(), 1);
    let queries = fake.queries.lock().expect("queries").clone();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("question answer source"));
}

#[tokio::test]
async fn existing_collection_is_left_alone() {
    let fake = Arc::new(FakeWeaviate::default());
    fake.exists.store(true, Ordering::SeqCst);
    let store = store(&serve(fake.clone()).await);

    store.ensure_ready().await.expect("bootstrap");

    assert!(fake.created.lock().expect("created").is_empty());
    store.nearest(&[1.0, 0.0], 4).await.expect("read");
    assert_eq!(fake.queries.lock().expect("queries").len(), 1);
}
