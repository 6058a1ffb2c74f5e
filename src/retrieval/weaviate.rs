//! Weaviate REST/GraphQL client.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::schema::{self, SchemaVariant};
use super::store::{KnowledgeStore, StoredRecord};
use super::RetrievalError;

pub struct WeaviateStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    class_name: String,
    /// Only a layout confirmed by the schema or by a successful query is
    /// remembered; guesses are re-checked on the next read.
    variant: RwLock<Option<SchemaVariant>>,
}

/// What the schema endpoint says about the collection.
enum SchemaLookup {
    Missing,
    Found(Vec<String>),
}

impl WeaviateStore {
    pub fn new(
        client: reqwest::Client,
        url: &str,
        api_key: Option<String>,
        collection: &str,
    ) -> Self {
        Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            class_name: class_name(collection),
            variant: RwLock::new(None),
        }
    }

    pub fn class(&self) -> &str {
        &self.class_name
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn lookup_schema(&self) -> Result<SchemaLookup, RetrievalError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/v1/schema/{}", self.class_name))
            .send()
            .await
            .map_err(transport)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(SchemaLookup::Missing);
        }
        if !response.status().is_success() {
            return Err(RetrievalError::Store(format!(
                "schema lookup returned {}",
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(transport)?;
        Ok(SchemaLookup::Found(property_names(&body)))
    }

    async fn remember(&self, variant: SchemaVariant) {
        let mut cached = self.variant.write().await;
        if *cached != Some(variant) {
            tracing::info!(
                collection = %self.class_name,
                variant = variant.as_str(),
                "retrieval.schema.detected"
            );
            *cached = Some(variant);
        }
    }

    /// The layout to query with. A missing collection or one without
    /// properties yields `Legacy` without caching it.
    async fn variant(&self) -> Result<SchemaVariant, RetrievalError> {
        if let Some(variant) = *self.variant.read().await {
            return Ok(variant);
        }

        match self.lookup_schema().await? {
            SchemaLookup::Found(names) if !names.is_empty() => {
                let variant = SchemaVariant::detect(&names);
                self.remember(variant).await;
                Ok(variant)
            }
            _ => {
                tracing::debug!(collection = %self.class_name, "retrieval.schema.unknown");
                Ok(SchemaVariant::Legacy)
            }
        }
    }

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        variant: SchemaVariant,
    ) -> Result<Vec<StoredRecord>, RetrievalError> {
        let query = near_vector_query(&self.class_name, variant, vector, limit);

        let response = self
            .request(reqwest::Method::POST, "/v1/graphql")
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(RetrievalError::Store(format!(
                "graphql returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(transport)?;
        parse_near_vector(&body, &self.class_name, variant)
    }

    /// Creates the collection in the current layout when it does not exist.
    pub async fn ensure_collection(&self) -> Result<(), RetrievalError> {
        match self.lookup_schema().await? {
            SchemaLookup::Found(names) => {
                if !names.is_empty() {
                    self.remember(SchemaVariant::detect(&names)).await;
                }
                return Ok(());
            }
            SchemaLookup::Missing => {}
        }

        let response = self
            .request(reqwest::Method::POST, "/v1/schema")
            .json(&collection_definition(&self.class_name))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(collection = %self.class_name, "retrieval.collection.created");
            self.remember(SchemaVariant::Current).await;
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        // Lost a race with another writer: the class exists now.
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY && body.contains("already exists") {
            tracing::warn!(collection = %self.class_name, "retrieval.collection.create_conflict");
            return Ok(());
        }
        Err(RetrievalError::Store(format!(
            "collection create returned {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )))
    }
}

#[async_trait]
impl KnowledgeStore for WeaviateStore {
    fn name(&self) -> &str {
        "weaviate"
    }

    async fn ensure_ready(&self) -> Result<(), RetrievalError> {
        self.ensure_collection().await
    }

    async fn nearest(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<StoredRecord>, RetrievalError> {
        let variant = self.variant().await?;
        match self.query(vector, limit, variant).await {
            Ok(records) => {
                self.remember(variant).await;
                Ok(records)
            }
            Err(err) if is_property_mismatch(&err) => {
                let other = variant.other();
                tracing::warn!(
                    collection = %self.class_name,
                    tried = variant.as_str(),
                    retrying = other.as_str(),
                    "retrieval.schema.mismatch"
                );
                let records = self.query(vector, limit, other).await?;
                self.remember(other).await;
                Ok(records)
            }
            Err(err) => Err(err),
        }
    }

    async fn insert(
        &self,
        question: &str,
        answer: &str,
        source: &str,
        vector: &[f32],
    ) -> Result<String, RetrievalError> {
        // New entries always use the current layout.
        let fields = SchemaVariant::Current.fields();
        let mut properties = serde_json::Map::new();
        properties.insert(fields.question.to_string(), json!(question));
        properties.insert(fields.answer.to_string(), json!(answer));
        properties.insert(fields.source.to_string(), json!(source));

        let response = self
            .request(reqwest::Method::POST, "/v1/objects")
            .json(&json!({
                "class": self.class_name,
                "properties": properties,
                "vector": vector,
            }))
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Store(format!(
                "insert returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: Value = response.json().await.map_err(transport)?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| RetrievalError::Store("insert response carried no id".into()))
    }
}

fn is_property_mismatch(err: &RetrievalError) -> bool {
    matches!(err, RetrievalError::Store(message) if message.to_lowercase().contains("no such prop"))
}

fn collection_definition(class: &str) -> Value {
    let fields = SchemaVariant::Current.fields();
    json!({
        "class": class,
        "vectorizer": "none",
        "vectorIndexType": "hnsw",
        "properties": ([fields.question, fields.answer, fields.source]
            .iter()
            .map(|name| json!({"name": name, "dataType": ["text"]}))
            .collect::<Vec<_>>()),
    })
}

fn transport(err: reqwest::Error) -> RetrievalError {
    RetrievalError::Store(err.to_string())
}

/// GraphQL class names start upper-case (`mathvectors` → `Mathvectors`).
pub fn class_name(collection: &str) -> String {
    let mut chars = collection.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn property_names(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(|v| v.as_array())
        .map(|props| {
            props
                .iter()
                .filter_map(|p| p.get("name").and_then(|n| n.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn near_vector_query(class: &str, variant: SchemaVariant, vector: &[f32], limit: usize) -> String {
    let fields = variant.fields();
    let vector = vector
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{{ Get {{ {class}(nearVector: {{vector: [{vector}]}}, limit: {limit}) {{ {q} {a} {s} _additional {{ id certainty distance }} }} }} }}",
        class = class,
        vector = vector,
        limit = limit,
        q = fields.question,
        a = fields.answer,
        s = fields.source,
    )
}

fn parse_near_vector(
    body: &Value,
    class: &str,
    variant: SchemaVariant,
) -> Result<Vec<StoredRecord>, RetrievalError> {
    if let Some(errors) = body.get("errors").and_then(|v| v.as_array()) {
        if !errors.is_empty() {
            let message = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RetrievalError::Store(format!("graphql error: {}", message)));
        }
    }

    let objects = body
        .get("data")
        .and_then(|d| d.get("Get"))
        .and_then(|g| g.get(class))
        .and_then(|c| c.as_array())
        .ok_or_else(|| RetrievalError::Store("graphql response missing objects".into()))?;

    let fields = variant.fields();
    Ok(objects
        .iter()
        .map(|object| {
            let mapped = fields.map(object);
            let additional = object.get("_additional");
            let id = additional
                .and_then(|a| a.get("id"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let certainty = additional.and_then(|a| a.get("certainty")).and_then(|v| v.as_f64());
            let distance = additional.and_then(|a| a.get("distance")).and_then(|v| v.as_f64());
            StoredRecord {
                id,
                question: mapped.question,
                answer: mapped.answer,
                source: mapped.source,
                similarity: schema::similarity(certainty, distance),
            }
        })
        .collect())
}
