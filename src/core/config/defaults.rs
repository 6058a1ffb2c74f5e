pub const ENVIRONMENT: &str = "local";
pub const HOST: &str = "127.0.0.1";
pub const PORT: u16 = 8000;
pub const REQUEST_TIMEOUT_SECS: u64 = 90;

pub const VECTOR_COLLECTION: &str = "mathvectors";
pub const TOP_K: usize = 4;
pub const SIMILARITY_THRESHOLD: f32 = 0.80;

pub const MAX_DOCUMENTS: usize = 5;
pub const PROVIDER_TIMEOUT_SECS: u64 = 15;
pub const TOOL_ENGINE: &str = "duckduckgo";

pub const GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const EMBEDDING_MODEL: &str = "text-embedding-004";
pub const MAX_OUTPUT_TOKENS: u32 = 2048;

/// Topics the tutor refuses regardless of phrasing.
pub fn blocked_keywords() -> Vec<String> {
    [
        "violence",
        "weapon",
        "politics",
        "hate",
        "self-harm",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
