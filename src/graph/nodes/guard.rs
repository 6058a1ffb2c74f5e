// Guard Nodes
// Input and output policy checks plus the two terminal nodes

use async_trait::async_trait;

use crate::generation::Step;
use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{BlockDetail, PipelineState, Stage};
use crate::guardrails::{self, Direction, GuardrailFilter, GuardrailVerdict};
use crate::search::Citation;

use super::{advance, BLOCKED};

fn block(
    state: PipelineState,
    verdict: &GuardrailVerdict,
    direction: Direction,
    node_id: &str,
) -> Result<(PipelineState, NodeOutput), GraphError> {
    let Some(reason) = verdict.reason.clone() else {
        return Err(GraphError::new(node_id, "rejection without a reason"));
    };
    let detail = BlockDetail {
        direction,
        message: verdict.message(direction),
        reason,
    };
    let state = advance(state.with_block(detail), Stage::Blocked, node_id)?;
    Ok((state, NodeOutput::Branch(BLOCKED.to_string())))
}

pub struct InputGuardNode;

impl InputGuardNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InputGuardNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for InputGuardNode {
    fn id(&self) -> &'static str {
        "input_guard"
    }

    async fn execute(
        &self,
        state: PipelineState,
        ctx: &NodeContext,
    ) -> Result<(PipelineState, NodeOutput), GraphError> {
        if !ctx.guardrail_policy.enforce_input {
            let sanitized = guardrails::sanitize_input(&state.query);
            let state = state
                .with_sanitized_query(sanitized)
                .traced("input_guard: skipped");
            let state = advance(state, Stage::InputFiltered, self.id())?;
            return Ok((state, NodeOutput::Continue(None)));
        }

        let verdict = ctx.guardrails.filter_input(&state.query);
        if !verdict.allowed {
            let state = state.traced("input_guard: rejected");
            return block(state, &verdict, Direction::Input, self.id());
        }

        let state = state
            .with_sanitized_query(verdict.sanitized_text)
            .traced("input_guard: passed");
        let state = advance(state, Stage::InputFiltered, self.id())?;
        Ok((state, NodeOutput::Continue(None)))
    }
}

pub struct OutputGuardNode;

impl OutputGuardNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OutputGuardNode {
    fn default() -> Self {
        Self::new()
    }
}

enum Filtered {
    Passed {
        answer: String,
        steps: Vec<Step>,
        urls: Vec<String>,
        redacted: bool,
    },
    Rejected(GuardrailVerdict),
}

/// Runs the answer and every step through the output filter. The first
/// rejection wins.
fn filter_generation(filter: &GuardrailFilter, answer: &str, steps: &[Step]) -> Filtered {
    let verdict = filter.filter_output(answer);
    if !verdict.allowed {
        return Filtered::Rejected(verdict);
    }
    let mut redacted = verdict.redacted;
    let mut urls = verdict.citations;
    let answer = verdict.sanitized_text;

    let mut filtered_steps = Vec::with_capacity(steps.len());
    for step in steps {
        let content = filter.filter_output(&step.content);
        if !content.allowed {
            return Filtered::Rejected(content);
        }
        let expression = match &step.expression {
            Some(expr) => {
                let verdict = filter.filter_output(expr);
                if !verdict.allowed {
                    return Filtered::Rejected(verdict);
                }
                redacted |= verdict.redacted;
                Some(verdict.sanitized_text)
            }
            None => None,
        };
        redacted |= content.redacted;
        urls.extend(content.citations);
        filtered_steps.push(Step {
            title: guardrails::sanitize_input(&step.title),
            content: content.sanitized_text,
            expression,
        });
    }

    Filtered::Passed {
        answer,
        steps: filtered_steps,
        urls,
        redacted,
    }
}

#[async_trait]
impl Node for OutputGuardNode {
    fn id(&self) -> &'static str {
        "output_guard"
    }

    async fn execute(
        &self,
        state: PipelineState,
        ctx: &NodeContext,
    ) -> Result<(PipelineState, NodeOutput), GraphError> {
        if !ctx.guardrail_policy.enforce_output {
            let answer = guardrails::sanitize_output(&state.answer);
            let steps = state.steps.clone();
            let state = state
                .with_filtered_output(answer, steps)
                .traced("output_guard: skipped");
            let state = advance(state, Stage::OutputFiltered, self.id())?;
            return Ok((state, NodeOutput::Continue(None)));
        }

        match filter_generation(&ctx.guardrails, &state.answer, &state.steps) {
            Filtered::Rejected(verdict) => {
                let state = state.traced("output_guard: rejected");
                block(state, &verdict, Direction::Output, self.id())
            }
            Filtered::Passed {
                answer,
                steps,
                urls,
                redacted,
            } => {
                let citations = urls
                    .into_iter()
                    .map(|url| Citation {
                        title: url.clone(),
                        url,
                    })
                    .collect();
                let entry = if redacted {
                    "output_guard: passed (redacted)"
                } else {
                    "output_guard: passed"
                };
                let state = state
                    .with_filtered_output(answer, steps)
                    .with_citations(citations)
                    .traced(entry);
                let state = advance(state, Stage::OutputFiltered, self.id())?;
                Ok((state, NodeOutput::Continue(None)))
            }
        }
    }
}

/// Terminal node for a request that passed every stage.
pub struct FinishNode;

impl FinishNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FinishNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for FinishNode {
    fn id(&self) -> &'static str {
        "finish"
    }

    async fn execute(
        &self,
        state: PipelineState,
        _ctx: &NodeContext,
    ) -> Result<(PipelineState, NodeOutput), GraphError> {
        let entry = format!("finish: source={}", state.source().as_str());
        let state = advance(state.traced(entry), Stage::Done, self.id())?;
        Ok((state, NodeOutput::Final))
    }
}

/// Terminal node for a rejected request. The state is already `Blocked`.
pub struct BlockedNode;

impl BlockedNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BlockedNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for BlockedNode {
    fn id(&self) -> &'static str {
        "blocked"
    }

    async fn execute(
        &self,
        state: PipelineState,
        _ctx: &NodeContext,
    ) -> Result<(PipelineState, NodeOutput), GraphError> {
        if !state.is_blocked() {
            return Err(GraphError::new(
                self.id(),
                format!("reached from stage {}", state.stage.as_str()),
            ));
        }
        tracing::info!(stage = state.stage.as_str(), "pipeline.blocked");
        Ok((state.traced("blocked"), NodeOutput::Final))
    }
}
