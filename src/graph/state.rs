//! Pipeline state carried from stage to stage.
//!
//! The state is moved into each node and a new value moved out; fields
//! that accumulate (trace, hits, documents) are only ever appended to.

use serde::Serialize;

use crate::generation::Step;
use crate::guardrails::{Direction, GuardrailReason};
use crate::retrieval::KnowledgeHit;
use crate::search::{AggregatedContext, Citation, ProviderAttempt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    InputFiltered,
    KbRetrieved,
    WebAggregated,
    Generated,
    OutputFiltered,
    Done,
    Blocked,
}

impl Stage {
    /// Legal successor stages.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Init, Stage::InputFiltered)
                | (Stage::Init, Stage::Blocked)
                | (Stage::InputFiltered, Stage::KbRetrieved)
                | (Stage::KbRetrieved, Stage::WebAggregated)
                | (Stage::WebAggregated, Stage::Generated)
                | (Stage::Generated, Stage::OutputFiltered)
                | (Stage::Generated, Stage::Blocked)
                | (Stage::OutputFiltered, Stage::Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Blocked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::InputFiltered => "input_filtered",
            Stage::KbRetrieved => "kb_retrieved",
            Stage::WebAggregated => "web_aggregated",
            Stage::Generated => "generated",
            Stage::OutputFiltered => "output_filtered",
            Stage::Done => "done",
            Stage::Blocked => "blocked",
        }
    }
}

/// Why a request ended in [`Stage::Blocked`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockDetail {
    #[serde(skip)]
    pub direction: Direction,
    pub reason: GuardrailReason,
    pub message: String,
}

/// Where the context behind an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnswerSource {
    #[serde(rename = "kb+web")]
    KbAndWeb,
    #[serde(rename = "kb")]
    Kb,
    #[serde(rename = "web")]
    Web,
    #[serde(rename = "generator")]
    Generator,
}

impl AnswerSource {
    pub fn from_context(has_kb: bool, has_web: bool) -> Self {
        match (has_kb, has_web) {
            (true, true) => AnswerSource::KbAndWeb,
            (true, false) => AnswerSource::Kb,
            (false, true) => AnswerSource::Web,
            (false, false) => AnswerSource::Generator,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::KbAndWeb => "kb+web",
            AnswerSource::Kb => "kb",
            AnswerSource::Web => "web",
            AnswerSource::Generator => "generator",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineState {
    pub stage: Stage,
    /// Query as received.
    pub query: String,
    /// Query after input sanitization; what every later stage works on.
    pub sanitized_query: String,
    pub knowledge_hits: Vec<KnowledgeHit>,
    pub web: AggregatedContext,
    pub answer: String,
    pub steps: Vec<Step>,
    pub citations: Vec<Citation>,
    pub blocked: Option<BlockDetail>,
    pub gateway_trace: Vec<String>,
}

impl PipelineState {
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            stage: Stage::Init,
            sanitized_query: query.clone(),
            query,
            knowledge_hits: Vec::new(),
            web: AggregatedContext::default(),
            answer: String::new(),
            steps: Vec::new(),
            citations: Vec::new(),
            blocked: None,
            gateway_trace: Vec::new(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.stage == Stage::Blocked
    }

    pub fn retrieved_from_kb(&self) -> bool {
        !self.knowledge_hits.is_empty()
    }

    pub fn source(&self) -> AnswerSource {
        AnswerSource::from_context(self.retrieved_from_kb(), !self.web.is_empty())
    }

    pub fn search_attempts(&self) -> &[ProviderAttempt] {
        &self.web.attempts
    }

    /// Moves to `next`, returning `None` for an illegal transition.
    pub fn advance(mut self, next: Stage) -> Option<Self> {
        if !self.stage.can_advance_to(next) {
            return None;
        }
        self.stage = next;
        Some(self)
    }

    pub fn traced(mut self, entry: impl Into<String>) -> Self {
        self.gateway_trace.push(entry.into());
        self
    }

    pub fn with_sanitized_query(mut self, sanitized: String) -> Self {
        self.sanitized_query = sanitized;
        self
    }

    pub fn with_knowledge(mut self, hits: Vec<KnowledgeHit>) -> Self {
        self.knowledge_hits.extend(hits);
        self
    }

    pub fn with_web(mut self, web: AggregatedContext) -> Self {
        self.web.documents.extend(web.documents);
        self.web.attempts.extend(web.attempts);
        self
    }

    pub fn with_answer(mut self, answer: String, steps: Vec<Step>) -> Self {
        self.answer = answer;
        self.steps.extend(steps);
        self
    }

    /// Swaps in the filtered rendering of the generated answer and steps.
    pub fn with_filtered_output(mut self, answer: String, steps: Vec<Step>) -> Self {
        self.answer = answer;
        self.steps = steps;
        self
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        for citation in citations {
            if !self.citations.iter().any(|c| c.url == citation.url) {
                self.citations.push(citation);
            }
        }
        self
    }

    pub fn with_block(mut self, detail: BlockDetail) -> Self {
        self.blocked = Some(detail);
        self
    }
}
