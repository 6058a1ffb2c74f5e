//! Answer generation: the LLM is a black box returning an answer plus
//! structured steps.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retrieval::KnowledgeHit;
use crate::search::Document;

pub mod gemini;
pub mod parse;
pub mod transcribe;

pub use gemini::GeminiClient;
pub use transcribe::{Modality, Transcriber};

/// Answers shorter than this are replaced by a concluding step.
const SHORT_ANSWER_CHARS: usize = 50;
const CONCLUSION_WORDS: [&str; 5] = ["therefore", "answer", "result", "thus", "hence"];

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator is not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(String),
    #[error("generator returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("rate limited by the model provider")]
    RateLimited,
    #[error("empty response from generator")]
    Empty,
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Request(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl Step {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            expression: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Generation {
    pub answer: String,
    pub steps: Vec<Step>,
}

/// Retrieved material handed to the generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationContext<'a> {
    pub knowledge: &'a [KnowledgeHit],
    pub documents: &'a [Document],
}

impl GenerationContext<'_> {
    pub fn is_empty(&self) -> bool {
        self.knowledge.is_empty() && self.documents.is_empty()
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        context: GenerationContext<'_>,
    ) -> Result<Generation, GenerationError>;

    /// Whether `solution` correctly answers `question`.
    async fn validate_solution(&self, question: &str, solution: &str)
        -> Result<bool, GenerationError>;
}

/// Stand-in used when no model API key is configured. Every call fails
/// with [`GenerationError::NotConfigured`].
pub struct UnconfiguredGenerator;

#[async_trait]
impl Generator for UnconfiguredGenerator {
    async fn generate(
        &self,
        _question: &str,
        _context: GenerationContext<'_>,
    ) -> Result<Generation, GenerationError> {
        Err(GenerationError::NotConfigured)
    }

    async fn validate_solution(
        &self,
        _question: &str,
        _solution: &str,
    ) -> Result<bool, GenerationError> {
        Err(GenerationError::NotConfigured)
    }
}

#[async_trait]
impl Transcriber for UnconfiguredGenerator {
    async fn transcribe(
        &self,
        _modality: Modality,
        _base64: &str,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::NotConfigured)
    }
}

/// Replaces an answer that is too short to be useful with the last step
/// that reads like a conclusion, else with the last step.
pub fn enhance_answer(answer: &str, steps: &[Step]) -> String {
    if answer.trim().chars().count() >= SHORT_ANSWER_CHARS || steps.is_empty() {
        return answer.to_string();
    }

    let contents: Vec<&str> = steps
        .iter()
        .map(|s| s.content.as_str())
        .filter(|c| !c.trim().is_empty())
        .collect();
    let Some(last) = contents.last() else {
        return answer.to_string();
    };

    contents
        .iter()
        .rev()
        .find(|content| {
            let lower = content.to_lowercase();
            CONCLUSION_WORDS.iter().any(|w| lower.contains(w))
        })
        .unwrap_or(last)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_answers_are_kept() {
        let answer = "x = 2 or x = 3 because the quadratic factors as (x - 2)(x - 3).";
        let steps = vec![Step::new("Factor", "Therefore x = 2 or 3")];
        assert_eq!(enhance_answer(answer, &steps), answer);
    }

    #[test]
    fn short_answer_prefers_concluding_step() {
        let steps = vec![
            Step::new("Setup", "Write x^2 - 5x + 6 = 0"),
            Step::new("Factor", "Thus (x - 2)(x - 3) = 0"),
            Step::new("Check", "Substitute back to verify"),
        ];
        assert_eq!(enhance_answer("Answer: 2", &steps), "Thus (x - 2)(x - 3) = 0");
    }

    #[test]
    fn short_answer_falls_back_to_last_step() {
        let steps = vec![Step::new("One", "expand"), Step::new("Two", "simplify to 4")];
        assert_eq!(enhance_answer("4", &steps), "simplify to 4");
    }

    #[test]
    fn short_answer_without_steps_is_kept() {
        assert_eq!(enhance_answer("4", &[]), "4");
    }
}
