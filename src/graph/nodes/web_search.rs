// Web Search Node
// Runs the provider chain; always executed regardless of knowledge hits

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{PipelineState, Stage};
use crate::search::{AttemptOutcome, ProviderAttempt};

use super::advance;

pub struct WebSearchNode;

impl WebSearchNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebSearchNode {
    fn default() -> Self {
        Self::new()
    }
}

fn trace_entry(attempt: &ProviderAttempt) -> String {
    match &attempt.outcome {
        AttemptOutcome::Succeeded { returned, added } => format!(
            "web_search: {} returned {} ({} new)",
            attempt.provider, returned, added
        ),
        AttemptOutcome::Failed { reason } => {
            format!("web_search: {} failed: {}", attempt.provider, reason)
        }
        AttemptOutcome::Skipped => format!("web_search: {} skipped", attempt.provider),
    }
}

#[async_trait]
impl Node for WebSearchNode {
    fn id(&self) -> &'static str {
        "web_search"
    }

    async fn execute(
        &self,
        state: PipelineState,
        ctx: &NodeContext,
    ) -> Result<(PipelineState, NodeOutput), GraphError> {
        let web = ctx.aggregator.aggregate(&state.sanitized_query).await;

        let mut state = state.with_citations(web.citations());
        for attempt in &web.attempts {
            state = state.traced(trace_entry(attempt));
        }
        let entry = format!("web_search: {} documents", web.documents.len());
        let state = state.with_web(web).traced(entry);

        let state = advance(state, Stage::WebAggregated, self.id())?;
        Ok((state, NodeOutput::Continue(None)))
    }
}
