// Knowledge Node
// Nearest-neighbour lookup in the knowledge base

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{PipelineState, Stage};

use super::advance;

pub struct KnowledgeNode;

impl KnowledgeNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for KnowledgeNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for KnowledgeNode {
    fn id(&self) -> &'static str {
        "knowledge"
    }

    async fn execute(
        &self,
        state: PipelineState,
        ctx: &NodeContext,
    ) -> Result<(PipelineState, NodeOutput), GraphError> {
        // Retrieval failures surface as zero hits, never as an error.
        let hits = ctx
            .retriever
            .retrieve(
                &state.sanitized_query,
                ctx.knowledge.top_k,
                ctx.knowledge.similarity_threshold,
            )
            .await;

        let entry = match hits.first() {
            Some(best) => format!(
                "knowledge: {} hits (best {:.2})",
                hits.len(),
                best.similarity
            ),
            None => "knowledge: no hits".to_string(),
        };

        let state = state.with_knowledge(hits).traced(entry);
        let state = advance(state, Stage::KbRetrieved, self.id())?;
        Ok((state, NodeOutput::Continue(None)))
    }
}
