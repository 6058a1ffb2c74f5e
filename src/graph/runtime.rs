//! Stage graph for one mentor request: nodes run one after another, routed
//! by unconditional edges or by the condition a node branches on.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

use super::node::{GraphError, Node, NodeContext, NodeOutput};
use super::state::PipelineState;

/// When an edge may be taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeCondition {
    /// Taken when the node continues without a condition.
    Always,
    /// Taken when the node branches on exactly this condition.
    OnCondition(String),
}

impl EdgeCondition {
    pub fn on(condition: impl Into<String>) -> Self {
        Self::OnCondition(condition.into())
    }

    pub fn matches(&self, condition: Option<&str>) -> bool {
        match (self, condition) {
            (EdgeCondition::Always, None) => true,
            (EdgeCondition::OnCondition(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }
}

/// Built once at start-up through [`GraphBuilder`] and shared by every request.
pub struct GraphRuntime {
    graph: DiGraph<Box<dyn Node>, EdgeCondition>,
    node_indices: HashMap<String, NodeIndex>,
    entry_node_id: String,
    /// Upper bound on stages per run.
    max_steps: usize,
}

impl GraphRuntime {
    fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_indices: HashMap::new(),
            entry_node_id: String::new(),
            max_steps: 16,
        }
    }

    fn add_node(&mut self, node: Box<dyn Node>) {
        let id = node.id().to_string();
        let index = self.graph.add_node(node);
        self.node_indices.insert(id, index);
    }

    fn add_edge(
        &mut self,
        from: &str,
        to: &str,
        condition: EdgeCondition,
    ) -> Result<(), GraphError> {
        let from_idx = self
            .node_indices
            .get(from)
            .ok_or_else(|| GraphError::new(from, format!("unknown edge source: {}", from)))?;
        let to_idx = self
            .node_indices
            .get(to)
            .ok_or_else(|| GraphError::new(to, format!("unknown edge target: {}", to)))?;

        self.graph.add_edge(*from_idx, *to_idx, condition);
        Ok(())
    }

    /// Stage ids in the order they were added.
    #[cfg(test)]
    pub(crate) fn stage_ids(&self) -> Vec<&str> {
        self.graph.node_indices().map(|i| self.graph[i].id()).collect()
    }

    #[cfg(test)]
    pub(crate) fn is_acyclic(&self) -> bool {
        !petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Runs from the entry node until a node returns `Final`.
    pub async fn run(
        &self,
        mut state: PipelineState,
        ctx: &NodeContext,
    ) -> Result<PipelineState, GraphError> {
        let mut current = *self.node_indices.get(&self.entry_node_id).ok_or_else(|| {
            GraphError::new(
                "runtime",
                format!("entry stage missing: {:?}", self.entry_node_id),
            )
        })?;

        let mut visited: Vec<String> = Vec::new();

        for step in 0..self.max_steps {
            let node = &self.graph[current];
            let node_id = node.id();
            tracing::debug!(stage = node_id, step, "pipeline.node.start");

            let (next_state, output) = node
                .execute(state, ctx)
                .await
                .map_err(|err| err.with_trace(visited.clone()))?;
            state = next_state;
            visited.push(node_id.to_string());

            current = match output {
                NodeOutput::Final => {
                    tracing::debug!(stage = node_id, "pipeline.complete");
                    return Ok(state);
                }
                NodeOutput::Continue(jump) => self.next_stage(current, None, jump.as_deref()),
                NodeOutput::Branch(condition) => self.next_stage(current, Some(&condition), None),
            }
            .map_err(|err| err.with_trace(visited.clone()))?;
        }

        Err(GraphError::new(
            "runtime",
            format!("stage limit of {} reached", self.max_steps),
        )
        .with_trace(visited))
    }

    /// A jump target wins, then an edge matching the condition, then the
    /// unconditional edge.
    fn next_stage(
        &self,
        current: NodeIndex,
        condition: Option<&str>,
        jump: Option<&str>,
    ) -> Result<NodeIndex, GraphError> {
        let stage = self.graph[current].id();

        if let Some(target) = jump {
            return self.node_indices.get(target).copied().ok_or_else(|| {
                GraphError::new(stage, format!("jump to unknown stage: {}", target))
            });
        }

        let mut fallback = None;
        for edge in self.graph.edges_directed(current, Direction::Outgoing) {
            match edge.weight() {
                EdgeCondition::Always => fallback = fallback.or(Some(edge.target())),
                routed if condition.is_some() && routed.matches(condition) => {
                    return Ok(edge.target());
                }
                EdgeCondition::OnCondition(_) => {}
            }
        }

        match (fallback, condition) {
            (Some(target), Some(unmatched)) => {
                tracing::warn!(condition = unmatched, stage, "pipeline.condition_unmatched");
                Ok(target)
            }
            (Some(target), None) => Ok(target),
            (None, condition) => Err(GraphError::new(
                stage,
                format!("no route out of {} for {:?}", stage, condition.unwrap_or("(none)")),
            )),
        }
    }
}

/// Collects stages and edges; edges are checked against the stages on
/// [`GraphBuilder::build`].
pub struct GraphBuilder {
    runtime: GraphRuntime,
    pending_edges: Vec<(String, String, EdgeCondition)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            runtime: GraphRuntime::new(),
            pending_edges: Vec::new(),
        }
    }

    pub fn entry(mut self, node_id: impl Into<String>) -> Self {
        self.runtime.entry_node_id = node_id.into();
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.runtime.max_steps = max_steps;
        self
    }

    pub fn node(mut self, node: Box<dyn Node>) -> Self {
        self.runtime.add_node(node);
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.pending_edges
            .push((from.into(), to.into(), EdgeCondition::Always));
        self
    }

    pub fn conditional_edge(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        self.pending_edges
            .push((from.into(), to.into(), EdgeCondition::on(condition)));
        self
    }

    pub fn build(mut self) -> Result<GraphRuntime, GraphError> {
        for (from, to, condition) in self.pending_edges {
            self.runtime.add_edge(&from, &to, condition)?;
        }
        Ok(self.runtime)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
