// Pipeline Nodes Module
// One node per stage

pub mod generate;
pub mod guard;
pub mod knowledge;
pub mod web_search;

pub use generate::GenerateNode;
pub use guard::{BlockedNode, FinishNode, InputGuardNode, OutputGuardNode};
pub use knowledge::KnowledgeNode;
pub use web_search::WebSearchNode;

use crate::graph::node::GraphError;
use crate::graph::state::{PipelineState, Stage};

/// Branch condition taken by a guard that rejects.
pub const BLOCKED: &str = "blocked";

/// Advances `state`, turning an illegal transition into a node error.
pub(crate) fn advance(
    state: PipelineState,
    next: Stage,
    node_id: &str,
) -> Result<PipelineState, GraphError> {
    let from = state.stage;
    state.advance(next).ok_or_else(|| {
        GraphError::new(
            node_id,
            format!("illegal transition {} -> {}", from.as_str(), next.as_str()),
        )
    })
}
