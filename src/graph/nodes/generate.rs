// Generate Node
// Hands the question and gathered context to the generator

use async_trait::async_trait;

use crate::generation::{enhance_answer, GenerationContext};
use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{PipelineState, Stage};

use super::advance;

pub struct GenerateNode;

impl GenerateNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GenerateNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for GenerateNode {
    fn id(&self) -> &'static str {
        "generate"
    }

    async fn execute(
        &self,
        state: PipelineState,
        ctx: &NodeContext,
    ) -> Result<(PipelineState, NodeOutput), GraphError> {
        let context = GenerationContext {
            knowledge: &state.knowledge_hits,
            documents: &state.web.documents,
        };

        let generation = ctx
            .generator
            .generate(&state.sanitized_query, context)
            .await
            .map_err(|err| {
                tracing::error!(reason = %err, stage = self.id(), "generation.failed");
                GraphError::new(self.id(), err.to_string())
            })?;

        let answer = enhance_answer(&generation.answer, &generation.steps);
        let entry = format!("generate: {} steps", generation.steps.len());
        let state = state.with_answer(answer, generation.steps).traced(entry);
        let state = advance(state, Stage::Generated, self.id())?;
        Ok((state, NodeOutput::Continue(None)))
    }
}
