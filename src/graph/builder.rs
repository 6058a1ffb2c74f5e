// Graph Builder
// Wires the tutoring pipeline using petgraph

use super::node::GraphError;
use super::nodes::{
    BlockedNode, FinishNode, GenerateNode, InputGuardNode, KnowledgeNode, OutputGuardNode,
    WebSearchNode, BLOCKED,
};
use super::runtime::{GraphBuilder, GraphRuntime};

/// Build the tutoring pipeline
///
/// input_guard -> knowledge -> web_search -> generate -> output_guard -> finish,
/// with both guards branching to `blocked` on rejection.
pub fn build_mentor_graph() -> Result<GraphRuntime, GraphError> {
    GraphBuilder::new()
        .entry("input_guard")
        .max_steps(16)
        .node(Box::new(InputGuardNode::new()))
        .node(Box::new(KnowledgeNode::new()))
        .node(Box::new(WebSearchNode::new()))
        .node(Box::new(GenerateNode::new()))
        .node(Box::new(OutputGuardNode::new()))
        .node(Box::new(FinishNode::new()))
        .node(Box::new(BlockedNode::new()))
        .edge("input_guard", "knowledge")
        .conditional_edge("input_guard", "blocked", BLOCKED)
        .edge("knowledge", "web_search")
        .edge("web_search", "generate")
        .edge("generate", "output_guard")
        .edge("output_guard", "finish")
        .conditional_edge("output_guard", "blocked", BLOCKED)
        .build()
}
