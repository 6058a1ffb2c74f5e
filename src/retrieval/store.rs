//! Knowledge store abstraction and the in-process implementations.

use async_trait::async_trait;
use ndarray::ArrayView1;
use tokio::sync::RwLock;

use super::RetrievalError;

/// A record returned by a nearest-neighbour query, already mapped to
/// logical fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub source: String,
    /// Similarity in [0, 1].
    pub similarity: f32,
}

/// Abstract vector store holding question/answer pairs.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a real backend sits behind this store.
    fn is_configured(&self) -> bool {
        true
    }

    /// Prepares the backing collection. Stores without setup have nothing
    /// to do.
    async fn ensure_ready(&self) -> Result<(), RetrievalError> {
        Ok(())
    }

    /// Up to `limit` records closest to `vector`, best first.
    async fn nearest(&self, vector: &[f32], limit: usize)
        -> Result<Vec<StoredRecord>, RetrievalError>;

    /// Inserts a question/answer pair and returns its id.
    async fn insert(
        &self,
        question: &str,
        answer: &str,
        source: &str,
        vector: &[f32],
    ) -> Result<String, RetrievalError>;
}

/// Stand-in used when no vector store is configured: finds nothing,
/// refuses inserts.
#[derive(Debug, Default)]
pub struct NullKnowledgeStore;

#[async_trait]
impl KnowledgeStore for NullKnowledgeStore {
    fn name(&self) -> &str {
        "null"
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn nearest(
        &self,
        _vector: &[f32],
        _limit: usize,
    ) -> Result<Vec<StoredRecord>, RetrievalError> {
        Ok(Vec::new())
    }

    async fn insert(
        &self,
        _question: &str,
        _answer: &str,
        _source: &str,
        _vector: &[f32],
    ) -> Result<String, RetrievalError> {
        tracing::warn!("retrieval.null_store.insert_ignored");
        Err(RetrievalError::NotConfigured)
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    id: String,
    question: String,
    answer: String,
    source: String,
    vector: Vec<f32>,
}

/// Brute-force cosine store kept in memory. Useful for local runs and
/// tests; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryKnowledgeStore {
    entries: RwLock<Vec<MemoryEntry>>,
}

impl MemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KnowledgeStore for MemoryKnowledgeStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn nearest(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<StoredRecord>, RetrievalError> {
        let entries = self.entries.read().await;
        let mut records: Vec<StoredRecord> = entries
            .iter()
            .map(|entry| StoredRecord {
                id: entry.id.clone(),
                question: entry.question.clone(),
                answer: entry.answer.clone(),
                source: entry.source.clone(),
                similarity: cosine_similarity(vector, &entry.vector).clamp(0.0, 1.0),
            })
            .collect();
        records.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        records.truncate(limit);
        Ok(records)
    }

    async fn insert(
        &self,
        question: &str,
        answer: &str,
        source: &str,
        vector: &[f32],
    ) -> Result<String, RetrievalError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.entries.write().await.push(MemoryEntry {
            id: id.clone(),
            question: question.to_string(),
            answer: answer.to_string(),
            source: source.to_string(),
            vector: vector.to_vec(),
        });
        Ok(id)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        a.dot(&b) / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn memory_store_returns_best_first() {
        let store = MemoryKnowledgeStore::new();
        store.insert("far", "a", "kb", &[0.0, 1.0]).await.expect("insert");
        store.insert("near", "b", "kb", &[1.0, 0.1]).await.expect("insert");
        store.insert("middle", "c", "kb", &[1.0, 1.0]).await.expect("insert");

        let records = store.nearest(&[1.0, 0.0], 2).await.expect("nearest");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].question, "near");
        assert_eq!(records[1].question, "middle");
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn null_store_finds_nothing_and_refuses_inserts() {
        let store = NullKnowledgeStore;
        assert!(!store.is_configured());
        assert!(store.nearest(&[1.0], 4).await.expect("nearest").is_empty());
        assert!(matches!(
            store.insert("q", "a", "s", &[1.0]).await,
            Err(RetrievalError::NotConfigured)
        ));
    }
}
