//! Gemini `generateContent` client used for answers, solution validation
//! and multimodal transcription.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::parse::parse_generation;
use super::{Generation, GenerationContext, GenerationError, Generator};
use crate::core::config::GenerationSection;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const TUTOR_INSTRUCTIONS: &str = "You are an expert mathematics tutor across all math domains. \
Solve the entire problem, showing every step of the work. If there are multiple parts, answer \
all of them, labelled (a), (b) and so on. Avoid LaTeX markers like $...$ or \\frac{}{}; write \
math in plain words or simple unicode. Respond with a JSON object \
{\"final_answer\": string, \"steps\": [{\"title\": string, \"explanation\": string, \
\"expression\": string or null}]}.";

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum Part {
    Text {
        text: String,
    },
    Inline {
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_output_tokens: u32,
    base_url: String,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, config: &GenerationSection) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: config.model.clone(),
            max_output_tokens: config.max_output_tokens,
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Concatenated text of the first candidate.
    pub(crate) async fn generate_text(
        &self,
        parts: Vec<Part>,
        json_output: bool,
    ) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                max_output_tokens: self.max_output_tokens,
                top_p: 0.95,
                response_mime_type: json_output.then_some("application/json"),
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(format!("failed to parse response: {}", e)))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }
}

pub(crate) fn build_prompt(question: &str, context: &GenerationContext<'_>) -> String {
    let mut prompt = String::from(TUTOR_INSTRUCTIONS);
    prompt.push_str("\n\nSTUDENT'S QUESTION:\n");
    prompt.push_str(question);

    if !context.is_empty() {
        prompt.push_str("\n\nCONTEXT FROM KNOWLEDGE BASE AND WEB SEARCH:\n");
        for hit in context.knowledge {
            let block = json!({
                "document_id": hit.document_id,
                "question": hit.question,
                "answer": hit.answer,
                "similarity": hit.similarity,
            });
            prompt.push_str(&block.to_string());
            prompt.push('\n');
        }
        for doc in context.documents {
            let block = json!({
                "title": doc.title,
                "url": doc.url,
                "snippet": doc.snippet,
            });
            prompt.push_str(&block.to_string());
            prompt.push('\n');
        }
    }

    prompt.push_str("\nNow solve this problem completely.");
    prompt
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(
        &self,
        question: &str,
        context: GenerationContext<'_>,
    ) -> Result<Generation, GenerationError> {
        let prompt = build_prompt(question, &context);
        let text = self
            .generate_text(vec![Part::Text { text: prompt }], true)
            .await?;
        let generation = parse_generation(&text);
        tracing::debug!(steps = generation.steps.len(), model = %self.model, "generation.completed");
        Ok(generation)
    }

    async fn validate_solution(
        &self,
        question: &str,
        solution: &str,
    ) -> Result<bool, GenerationError> {
        let prompt = format!(
            "You are an expert mathematics professor. Validate the student's solution. \
             Return ONLY 'VALID' if the reasoning is mathematically correct. \
             Return ONLY 'INVALID' otherwise.\n\nQuestion: {}\nStudent solution:\n{}",
            question, solution
        );
        let text = self
            .generate_text(vec![Part::Text { text: prompt }], false)
            .await?;
        Ok(is_valid_verdict(&text))
    }
}

fn is_valid_verdict(text: &str) -> bool {
    text.trim()
        .trim_matches(|c: char| c == '*' || c == '\'' || c == '"')
        .to_lowercase()
        .starts_with("valid")
}
