// Node trait and types
// Base abstraction for pipeline stages

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::config::{AppConfig, GuardrailSection, VectorStoreSection};
use crate::core::errors::ApiError;
use crate::generation::Generator;
use crate::guardrails::GuardrailFilter;
use crate::retrieval::KnowledgeRetriever;
use crate::search::WebSearchAggregator;

use super::state::PipelineState;

/// Collaborators shared by every node. Built once at start-up.
pub struct NodeContext {
    pub guardrails: Arc<GuardrailFilter>,
    pub guardrail_policy: GuardrailSection,
    pub retriever: Arc<KnowledgeRetriever>,
    pub knowledge: VectorStoreSection,
    pub aggregator: Arc<WebSearchAggregator>,
    pub generator: Arc<dyn Generator>,
}

impl NodeContext {
    pub fn new(
        config: &AppConfig,
        guardrails: Arc<GuardrailFilter>,
        retriever: Arc<KnowledgeRetriever>,
        aggregator: Arc<WebSearchAggregator>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            guardrails,
            guardrail_policy: config.guardrails.clone(),
            retriever,
            knowledge: config.vector_store.clone(),
            aggregator,
            generator,
        }
    }
}

/// Output from a node execution
#[derive(Debug, Clone)]
pub enum NodeOutput {
    /// Move on, to the named stage or else along the unconditional edge.
    Continue(Option<String>),
    /// Follow the edge registered for this condition.
    Branch(String),
    /// Graph execution complete
    Final,
}

/// Graph execution error
///
/// `execution_trace` records the node IDs visited before the failure,
/// most-recent last.
#[derive(Debug, Clone)]
pub struct GraphError {
    pub node_id: String,
    pub message: String,
    pub execution_trace: Vec<String>,
}

impl GraphError {
    pub fn new(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            message: message.into(),
            execution_trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.execution_trace = trace;
        self
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        ApiError::internal(err)
    }
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.execution_trace.is_empty() {
            write!(f, "GraphError in {}: {}", self.node_id, self.message)
        } else {
            write!(
                f,
                "GraphError in {} (trace: {}): {}",
                self.node_id,
                self.execution_trace.join(" -> "),
                self.message
            )
        }
    }
}

impl std::error::Error for GraphError {}

/// Node trait - all pipeline stages implement this
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique identifier for this node
    fn id(&self) -> &'static str;

    /// Consumes the state and hands back the next one with a routing decision.
    async fn execute(
        &self,
        state: PipelineState,
        ctx: &NodeContext,
    ) -> Result<(PipelineState, NodeOutput), GraphError>;
}
