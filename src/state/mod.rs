use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths};
use crate::feedback::FeedbackStore;
use crate::generation::{GeminiClient, Generator, Transcriber, UnconfiguredGenerator};
use crate::graph::{build_mentor_graph, GraphRuntime, NodeContext};
use crate::guardrails::GuardrailFilter;
use crate::history::HistoryStore;
use crate::retrieval::{
    Embedder, GeminiEmbedder, KnowledgeRetriever, KnowledgeStore, NullKnowledgeStore,
    WeaviateStore,
};
use crate::search::providers::build_providers;
use crate::search::WebSearchAggregator;

pub mod error;

use error::InitializationError;

/// The swappable collaborators behind the pipeline.
pub struct Services {
    pub retriever: Arc<KnowledgeRetriever>,
    pub aggregator: Arc<WebSearchAggregator>,
    pub generator: Arc<dyn Generator>,
    pub transcriber: Arc<dyn Transcriber>,
}

impl Services {
    /// Wires the concrete clients named by `config`. Anything left
    /// unconfigured degrades instead of failing start-up.
    pub fn from_config(config: &AppConfig, client: &reqwest::Client) -> Self {
        let gemini_key = config
            .generation
            .gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        let embedder: Option<Arc<dyn Embedder>> = gemini_key.map(|key| {
            Arc::new(GeminiEmbedder::new(
                client.clone(),
                key,
                config.generation.embedding_model.clone(),
            )) as Arc<dyn Embedder>
        });

        let store: Arc<dyn KnowledgeStore> = match config
            .vector_store
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        {
            Some(url) => Arc::new(WeaviateStore::new(
                client.clone(),
                url,
                config.vector_store.api_key.clone(),
                &config.vector_store.collection,
            )),
            None => {
                tracing::warn!("No vector store configured; knowledge retrieval disabled");
                Arc::new(NullKnowledgeStore)
            }
        };

        let (generator, transcriber): (Arc<dyn Generator>, Arc<dyn Transcriber>) = match gemini_key
        {
            Some(key) => {
                let gemini = Arc::new(GeminiClient::new(client.clone(), key, &config.generation));
                (
                    gemini.clone() as Arc<dyn Generator>,
                    gemini as Arc<dyn Transcriber>,
                )
            }
            None => {
                tracing::warn!("No Gemini API key configured; answers cannot be generated");
                let fallback = Arc::new(UnconfiguredGenerator);
                (
                    fallback.clone() as Arc<dyn Generator>,
                    fallback as Arc<dyn Transcriber>,
                )
            }
        };

        let aggregator = WebSearchAggregator::new(
            build_providers(&config.search, client),
            config.search.max_documents,
            config.search.provider_timeout(),
        );

        Self {
            retriever: Arc::new(KnowledgeRetriever::new(embedder, store)),
            aggregator: Arc::new(aggregator),
            generator,
            transcriber,
        }
    }
}

/// Global application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: Arc<AppConfig>,
    pub history: HistoryStore,
    pub feedback: Arc<FeedbackStore>,
    pub retriever: Arc<KnowledgeRetriever>,
    pub generator: Arc<dyn Generator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub graph_runtime: Arc<GraphRuntime>,
    pub pipeline: Arc<NodeContext>,
}

impl AppState {
    /// Builds the state with the clients named by `config`.
    pub async fn initialize(
        paths: Arc<AppPaths>,
        config: AppConfig,
    ) -> Result<Arc<Self>, InitializationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mentor-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InitializationError::HttpClient(e.into()))?;
        let services = Services::from_config(&config, &client);
        Self::assemble(paths, config, services).await
    }

    /// Builds the state around already-constructed services.
    pub async fn assemble(
        paths: Arc<AppPaths>,
        config: AppConfig,
        services: Services,
    ) -> Result<Arc<Self>, InitializationError> {
        tokio::fs::create_dir_all(&paths.data_dir)
            .await
            .map_err(|e| InitializationError::History(e.into()))?;
        let history = HistoryStore::new(&config.database_url(&paths))
            .await
            .map_err(|e| InitializationError::History(e.into()))?;

        let feedback = Arc::new(FeedbackStore::new(config.feedback_path(&paths)));
        services.retriever.prepare().await;

        let guardrails = Arc::new(
            GuardrailFilter::new(&config.guardrails.blocked_keywords)
                .map_err(|e| InitializationError::Guardrails(e.into()))?,
        );

        let graph_runtime =
            Arc::new(build_mentor_graph().map_err(|e| InitializationError::Graph(e.into()))?);

        let pipeline = Arc::new(NodeContext::new(
            &config,
            guardrails,
            services.retriever.clone(),
            services.aggregator,
            services.generator.clone(),
        ));

        Ok(Arc::new(AppState {
            paths,
            config: Arc::new(config),
            history,
            feedback,
            retriever: services.retriever,
            generator: services.generator,
            transcriber: services.transcriber,
            graph_runtime,
            pipeline,
        }))
    }
}
