//! Input/output policy filter.
//!
//! Permissive towards mathematical content: only PII and configured
//! keywords are acted on. Pure and deterministic, no external calls.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

const PII_PATTERN: &str = r"\b(\d{3}-\d{2}-\d{4}|\d{16}|[A-Z]{5}[0-9]{4}[A-Z])\b";
const URL_PATTERN: &str = r"https?://\S+";
const REDACTED: &str = "[redacted]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardrailReason {
    PiiDetected,
    BlockedKeyword { keyword: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Serialize)]
pub struct GuardrailVerdict {
    pub allowed: bool,
    pub sanitized_text: String,
    pub reason: Option<GuardrailReason>,
    /// Set when PII was masked rather than rejected (output only).
    pub redacted: bool,
    /// URLs quoted in generated text (output only).
    pub citations: Vec<String>,
}

impl GuardrailVerdict {
    fn allow(text: String) -> Self {
        Self {
            allowed: true,
            sanitized_text: text,
            reason: None,
            redacted: false,
            citations: Vec::new(),
        }
    }

    fn reject(text: String, reason: GuardrailReason) -> Self {
        Self {
            allowed: false,
            sanitized_text: text,
            reason: Some(reason),
            redacted: false,
            citations: Vec::new(),
        }
    }

    /// User-facing explanation for a rejection.
    pub fn message(&self, direction: Direction) -> String {
        match (&self.reason, direction) {
            (Some(GuardrailReason::PiiDetected), _) => {
                "The request may contain sensitive information. Please remove it and try again."
                    .to_string()
            }
            (Some(GuardrailReason::BlockedKeyword { .. }), Direction::Input) => {
                "I can only help with mathematics-related educational questions.".to_string()
            }
            (Some(GuardrailReason::BlockedKeyword { .. }), Direction::Output) => {
                "The generated response contains inappropriate content.".to_string()
            }
            (None, _) => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GuardrailFilter {
    keywords: Option<Regex>,
}

impl GuardrailFilter {
    pub fn new<S: AsRef<str>>(blocked_keywords: &[S]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = blocked_keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();

        let keywords = if alternatives.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(
                r"(?i)\b(?:{})\b",
                alternatives.join("|")
            ))?)
        };

        Ok(Self { keywords })
    }

    pub fn filter_input(&self, text: &str) -> GuardrailVerdict {
        let sanitized = sanitize_input(text);

        if pii_regex().is_match(&sanitized) {
            tracing::warn!(reason = "pii_match", "guardrails.input.blocked");
            return GuardrailVerdict::reject(sanitized, GuardrailReason::PiiDetected);
        }

        if let Some(keyword) = self.blocked_keyword(&sanitized) {
            tracing::warn!(reason = "blocked_keyword", %keyword, "guardrails.input.blocked");
            return GuardrailVerdict::reject(
                sanitized,
                GuardrailReason::BlockedKeyword { keyword },
            );
        }

        GuardrailVerdict::allow(sanitized)
    }

    pub fn filter_output(&self, text: &str) -> GuardrailVerdict {
        let mut sanitized = sanitize_output(text);
        let mut redacted = false;

        if pii_regex().is_match(&sanitized) {
            tracing::warn!(reason = "pii_detected", "guardrails.output.flag");
            sanitized = pii_regex().replace_all(&sanitized, REDACTED).into_owned();
            redacted = true;
        }

        if let Some(keyword) = self.blocked_keyword(&sanitized) {
            tracing::warn!(reason = "blocked_keyword", %keyword, "guardrails.output.blocked");
            return GuardrailVerdict::reject(
                sanitized,
                GuardrailReason::BlockedKeyword { keyword },
            );
        }

        let citations = extract_urls(&sanitized);
        let mut verdict = GuardrailVerdict::allow(sanitized);
        verdict.redacted = redacted;
        verdict.citations = citations;
        verdict
    }

    fn blocked_keyword(&self, text: &str) -> Option<String> {
        self.keywords
            .as_ref()
            .and_then(|re| re.find(text))
            .map(|m| m.as_str().to_lowercase())
    }
}

fn pii_regex() -> &'static Regex {
    static PII: OnceLock<Regex> = OnceLock::new();
    PII.get_or_init(|| Regex::new(PII_PATTERN).expect("PII pattern is valid"))
}

fn url_regex() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(URL_PATTERN).expect("URL pattern is valid"))
}

/// Drops control characters and collapses all whitespace to single spaces.
pub fn sanitize_input(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Like [`sanitize_input`] but keeps line structure so step-by-step
/// answers survive.
pub fn sanitize_output(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(sanitize_input)
        .collect();

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        // At most one blank line in a row.
        if line.is_empty() && out.last().map(|l| l.is_empty()).unwrap_or(true) {
            continue;
        }
        out.push(line);
    }
    while out.last().map(|l| l.is_empty()).unwrap_or(false) {
        out.pop();
    }
    out.join("\n")
}

fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in url_regex().find_iter(text) {
        let url = m
            .as_str()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | ')' | ']' | '>' | '"' | '\''))
            .to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}
