//! Knowledge-base retrieval over a vector store.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

pub mod embedding;
pub mod schema;
pub mod store;
pub mod weaviate;

pub use embedding::{Embedder, GeminiEmbedder};
pub use schema::SchemaVariant;
pub use store::{KnowledgeStore, MemoryKnowledgeStore, NullKnowledgeStore, StoredRecord};
pub use weaviate::WeaviateStore;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vector store error: {0}")]
    Store(String),
    #[error("no knowledge store configured")]
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeHit {
    pub document_id: String,
    pub question: String,
    pub answer: String,
    pub source: String,
    pub similarity: f32,
}

impl From<StoredRecord> for KnowledgeHit {
    fn from(record: StoredRecord) -> Self {
        Self {
            document_id: record.id,
            question: record.question,
            answer: record.answer,
            source: record.source,
            similarity: record.similarity,
        }
    }
}

pub struct KnowledgeRetriever {
    embedder: Option<Arc<dyn Embedder>>,
    store: Arc<dyn KnowledgeStore>,
}

impl KnowledgeRetriever {
    /// Without an embedder every lookup yields zero hits.
    pub fn new(embedder: Option<Arc<dyn Embedder>>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    pub fn is_available(&self) -> bool {
        self.embedder.is_some() && self.store.is_configured()
    }

    /// Creates the collection if needed. An unreachable store is logged
    /// and left for the first read to retry.
    pub async fn prepare(&self) {
        if !self.store.is_configured() {
            return;
        }
        if let Err(err) = self.store.ensure_ready().await {
            tracing::warn!(reason = %err, store = self.store.name(), "retrieval.prepare_failed");
        }
    }

    /// Top `k` hits with similarity at least `threshold`, best first.
    ///
    /// Failures are logged and yield no hits.
    pub async fn retrieve(&self, query: &str, k: usize, threshold: f32) -> Vec<KnowledgeHit> {
        match self.try_retrieve(query, k, threshold).await {
            Ok(hits) => {
                tracing::info!(hits = hits.len(), threshold, "retrieval.completed");
                hits
            }
            Err(err) => {
                tracing::warn!(reason = %err, store = self.store.name(), "retrieval.failed");
                Vec::new()
            }
        }
    }

    pub async fn try_retrieve(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<KnowledgeHit>, RetrievalError> {
        if query.trim().is_empty() || k == 0 || !self.store.is_configured() {
            return Ok(Vec::new());
        }
        let embedder = self.embedder.as_ref().ok_or(RetrievalError::NotConfigured)?;

        let vector = embedding::normalize(embedder.embed(query).await?)?;
        let records = self.store.nearest(&vector, k).await?;

        let mut hits: Vec<KnowledgeHit> = records
            .into_iter()
            .filter(|r| r.similarity >= threshold)
            .map(KnowledgeHit::from)
            .collect();
        // Stable: ties keep store order.
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        Ok(hits)
    }

    /// Embeds `question + "\n" + answer` and stores the pair.
    pub async fn add_entry(
        &self,
        question: &str,
        answer: &str,
        source: &str,
    ) -> Result<String, RetrievalError> {
        if !self.store.is_configured() {
            return Err(RetrievalError::NotConfigured);
        }
        let embedder = self.embedder.as_ref().ok_or(RetrievalError::NotConfigured)?;
        let text = format!("{}\n{}", question, answer);
        let vector = embedding::normalize(embedder.embed(&text).await?)?;
        let id = self.store.insert(question, answer, source, &vector).await?;
        tracing::info!(id = %id, source, "retrieval.entry_added");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
            Ok(self.0.clone())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
            Err(RetrievalError::Embedding("quota".into()))
        }
    }

    /// Returns canned records in a fixed (deliberately unsorted) order.
    struct CannedStore(Vec<StoredRecord>);

    #[async_trait]
    impl KnowledgeStore for CannedStore {
        fn name(&self) -> &str {
            "canned"
        }

        async fn nearest(
            &self,
            _vector: &[f32],
            limit: usize,
        ) -> Result<Vec<StoredRecord>, RetrievalError> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }

        async fn insert(
            &self,
            _question: &str,
            _answer: &str,
            _source: &str,
            _vector: &[f32],
        ) -> Result<String, RetrievalError> {
            Ok("id".into())
        }
    }

    fn record(id: &str, similarity: f32) -> StoredRecord {
        StoredRecord {
            id: id.to_string(),
            question: format!("q{}", id),
            answer: format!("a{}", id),
            source: "kb".to_string(),
            similarity,
        }
    }

    fn retriever(store: Arc<dyn KnowledgeStore>) -> KnowledgeRetriever {
        KnowledgeRetriever::new(Some(Arc::new(FixedEmbedder(vec![1.0, 0.0]))), store)
    }

    #[tokio::test]
    async fn hits_are_thresholded_and_sorted_stably() {
        let store = Arc::new(CannedStore(vec![
            record("1", 0.81),
            record("2", 0.95),
            record("3", 0.50),
            record("4", 0.81),
            record("5", 0.90),
        ]));

        let hits = retriever(store).retrieve("x^2", 10, 0.8).await;
        let ids: Vec<_> = hits.iter().map(|h| h.document_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "5", "1", "4"]);
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[tokio::test]
    async fn embedding_failure_yields_no_hits() {
        let r = KnowledgeRetriever::new(
            Some(Arc::new(FailingEmbedder)),
            Arc::new(CannedStore(vec![record("1", 0.99)])),
        );
        assert!(r.retrieve("x", 4, 0.5).await.is_empty());
        assert!(r.try_retrieve("x", 4, 0.5).await.is_err());
    }

    #[tokio::test]
    async fn null_store_is_unavailable() {
        let r = retriever(Arc::new(NullKnowledgeStore));
        assert!(!r.is_available());
        assert!(r.retrieve("x", 4, 0.0).await.is_empty());
        assert!(matches!(
            r.add_entry("q", "a", "user-feedback").await,
            Err(RetrievalError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn added_entries_become_retrievable() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let r = retriever(store.clone());
        r.add_entry("What is 2+2?", "4", "user-feedback")
            .await
            .expect("add");

        let hits = r.retrieve("What is 2+2?", 4, 0.0).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].answer, "4");
        assert_eq!(hits[0].source, "user-feedback");
    }
}
