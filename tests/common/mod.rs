//! Fakes shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use mentor_backend::core::config::{AppConfig, AppPaths};
use mentor_backend::generation::{
    Generation, GenerationContext, GenerationError, Generator, Modality, Step, Transcriber,
};
use mentor_backend::guardrails::GuardrailFilter;
use mentor_backend::graph::NodeContext;
use mentor_backend::retrieval::{
    Embedder, KnowledgeRetriever, KnowledgeStore, MemoryKnowledgeStore, RetrievalError,
};
use mentor_backend::search::{Document, ProviderError, SearchProvider, WebSearchAggregator};
use mentor_backend::state::{AppState, Services};

/// Every text embeds to the same axis, so anything stored with
/// [`KB_AXIS`] is a perfect match and anything on [`OFF_AXIS`] is not.
pub const KB_AXIS: [f32; 3] = [1.0, 0.0, 0.0];
pub const OFF_AXIS: [f32; 3] = [0.0, 1.0, 0.0];

pub struct AxisEmbedder;

#[async_trait]
impl Embedder for AxisEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(KB_AXIS.to_vec())
    }
}

pub enum Behaviour {
    Returns(Vec<Document>),
    Fails,
    Hangs,
}

pub struct StaticProvider {
    name: String,
    behaviour: Behaviour,
    pub calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(name: &str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<Document>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Returns(docs) => Ok(docs.iter().take(max_results).cloned().collect()),
            Behaviour::Fails => Err(ProviderError::Transport("connection refused".into())),
            Behaviour::Hangs => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

pub fn as_provider(provider: &Arc<StaticProvider>) -> Arc<dyn SearchProvider> {
    provider.clone()
}

pub fn doc(url: &str, title: &str) -> Document {
    Document::new(url, title, format!("About {}", title))
}

/// Generator with a canned reply. Records the context sizes it saw.
pub struct ScriptedGenerator {
    pub answer: String,
    pub steps: Vec<Step>,
    pub fail: bool,
    pub delay: Option<Duration>,
    pub verdict: bool,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<(usize, usize)>>,
}

impl ScriptedGenerator {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            steps: vec![
                Step::new("Understand", "We add the two numbers."),
                Step::new("Compute", "Therefore 2 + 2 = 4."),
            ],
            fail: false,
            delay: None,
            verdict: true,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::answering("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        _question: &str,
        context: GenerationContext<'_>,
    ) -> Result<Generation, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((context.knowledge.len(), context.documents.len()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(GenerationError::Status {
                status: 503,
                body: "model overloaded".into(),
            });
        }
        Ok(Generation {
            answer: self.answer.clone(),
            steps: self.steps.clone(),
        })
    }

    async fn validate_solution(
        &self,
        _question: &str,
        _solution: &str,
    ) -> Result<bool, GenerationError> {
        Ok(self.verdict)
    }
}

pub struct EchoTranscriber;

#[async_trait]
impl Transcriber for EchoTranscriber {
    async fn transcribe(&self, modality: Modality, _base64: &str) -> Result<String, GenerationError> {
        match modality {
            Modality::Image => Ok("What is 3 + 5?".to_string()),
            Modality::Audio => Ok("What is 6 times 7?".to_string()),
            Modality::Text => Err(GenerationError::InvalidInput("text".into())),
        }
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.app.environment = "test".to_string();
    config.search.provider_timeout_secs = 1;
    config.vector_store.similarity_threshold = 0.8;
    config
}

pub fn retriever(store: Arc<dyn KnowledgeStore>) -> Arc<KnowledgeRetriever> {
    Arc::new(KnowledgeRetriever::new(Some(Arc::new(AxisEmbedder)), store))
}

pub async fn store_with(entries: &[(&str, &str, [f32; 3])]) -> Arc<MemoryKnowledgeStore> {
    let store = Arc::new(MemoryKnowledgeStore::new());
    for (question, answer, vector) in entries {
        store
            .insert(question, answer, "seed", vector)
            .await
            .expect("seed");
    }
    store
}

pub fn aggregator(
    providers: Vec<Arc<dyn SearchProvider>>,
    config: &AppConfig,
) -> Arc<WebSearchAggregator> {
    Arc::new(WebSearchAggregator::new(
        providers,
        config.search.max_documents,
        config.search.provider_timeout(),
    ))
}

pub fn node_context(
    config: &AppConfig,
    retriever: Arc<KnowledgeRetriever>,
    aggregator: Arc<WebSearchAggregator>,
    generator: Arc<dyn Generator>,
) -> NodeContext {
    let guardrails =
        Arc::new(GuardrailFilter::new(&config.guardrails.blocked_keywords).expect("keywords"));
    NodeContext::new(config, guardrails, retriever, aggregator, generator)
}

pub async fn app_state(
    dir: &tempfile::TempDir,
    config: AppConfig,
    retriever: Arc<KnowledgeRetriever>,
    aggregator: Arc<WebSearchAggregator>,
    generator: Arc<dyn Generator>,
) -> Arc<AppState> {
    let paths = Arc::new(AppPaths::from_data_dir(
        dir.path().to_path_buf(),
        dir.path().join("data"),
    ));
    let services = Services {
        retriever,
        aggregator,
        generator,
        transcriber: Arc::new(EchoTranscriber),
    };
    AppState::assemble(paths, config, services)
        .await
        .expect("state")
}
