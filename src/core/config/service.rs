use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::defaults;
use super::paths::AppPaths;
use super::validation::validate_config;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 5] = [
    "api_key",
    "secret",
    "password",
    "credential",
    "database_url",
];

/// Threshold aliases, highest priority first.
const THRESHOLD_ALIASES: [&str; 3] = [
    "KB_SIMILARITY_THRESHOLD",
    "KB_THRESHOLD",
    "SIMILARITY_THRESHOLD",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    /// Empty allows any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            environment: defaults::ENVIRONMENT.to_string(),
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSection {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub collection: String,
    pub top_k: usize,
    pub similarity_threshold: f32,
}

impl Default for VectorStoreSection {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            collection: defaults::VECTOR_COLLECTION.to_string(),
            top_k: defaults::TOP_K,
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub max_documents: usize,
    pub provider_timeout_secs: u64,
    /// JSON-RPC endpoint speaking HTTP (SSE or JSON).
    pub mcp_url: Option<String>,
    /// JSON-RPC server launched as a child process, used when no URL is set.
    pub mcp_command: Option<String>,
    pub mcp_args: Vec<String>,
    pub tavily_api_key: Option<String>,
    /// The general web search tool; off means no keyless outbound search.
    pub tool_enabled: bool,
    pub tool_engine: String,
    pub brave_search_api_key: Option<String>,
    pub bing_search_api_key: Option<String>,
    pub google_search_api_key: Option<String>,
    pub google_search_engine_id: Option<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            max_documents: defaults::MAX_DOCUMENTS,
            provider_timeout_secs: defaults::PROVIDER_TIMEOUT_SECS,
            mcp_url: None,
            mcp_command: None,
            mcp_args: Vec::new(),
            tavily_api_key: None,
            tool_enabled: true,
            tool_engine: defaults::TOOL_ENGINE.to_string(),
            brave_search_api_key: None,
            bing_search_api_key: None,
            google_search_api_key: None,
            google_search_engine_id: None,
        }
    }
}

impl SearchSection {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub gemini_api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub max_output_tokens: u32,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            model: defaults::GEMINI_MODEL.to_string(),
            embedding_model: defaults::EMBEDDING_MODEL.to_string(),
            max_output_tokens: defaults::MAX_OUTPUT_TOKENS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailSection {
    pub enforce_input: bool,
    pub enforce_output: bool,
    pub blocked_keywords: Vec<String>,
}

impl Default for GuardrailSection {
    fn default() -> Self {
        Self {
            enforce_input: true,
            enforce_output: true,
            blocked_keywords: defaults::blocked_keywords(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub feedback_path: Option<PathBuf>,
    pub database_url: Option<String>,
}

/// Process-wide configuration, built once at start-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub vector_store: VectorStoreSection,
    pub search: SearchSection,
    pub generation: GenerationSection,
    pub guardrails: GuardrailSection,
    pub storage: StorageSection,
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.app.request_timeout_secs)
    }

    pub fn feedback_path(&self, paths: &AppPaths) -> PathBuf {
        self.storage
            .feedback_path
            .clone()
            .unwrap_or_else(|| paths.feedback_path.clone())
    }

    pub fn database_url(&self, paths: &AppPaths) -> String {
        self.storage.database_url.clone().unwrap_or_else(|| {
            format!("sqlite://{}?mode=rwc", paths.db_path.to_string_lossy())
        })
    }

    /// Overlays environment variables on top of file/default values.
    ///
    /// `lookup` abstracts `std::env::var` so the overlay can be exercised
    /// without mutating the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ENVIRONMENT") {
            self.app.environment = v;
        }
        if let Some(v) = get("HOST") {
            self.app.host = v;
        }
        set_parsed(&mut self.app.port, get("PORT"));
        set_parsed(&mut self.app.request_timeout_secs, get("REQUEST_TIMEOUT_SECS"));
        if let Some(v) = get("CORS_ALLOWED_ORIGINS") {
            self.app.cors_allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        set_opt(&mut self.vector_store.url, get("WEAVIATE_URL"));
        set_opt(&mut self.vector_store.api_key, get("WEAVIATE_API_KEY"));
        if let Some(v) = get("WEAVIATE_COLLECTION") {
            self.vector_store.collection = v;
        }
        set_parsed(&mut self.vector_store.top_k, get("TOP_K"));
        let threshold = THRESHOLD_ALIASES.iter().find_map(|key| get(key));
        set_parsed(&mut self.vector_store.similarity_threshold, threshold);

        set_parsed(&mut self.search.max_documents, get("SEARCH_MAX_DOCUMENTS"));
        set_parsed(
            &mut self.search.provider_timeout_secs,
            get("SEARCH_PROVIDER_TIMEOUT_SECS"),
        );
        set_opt(&mut self.search.mcp_url, get("MCP_TAVILY_URL"));
        set_opt(&mut self.search.mcp_command, get("MCP_TAVILY_COMMAND"));
        if let Some(v) = get("MCP_TAVILY_ARGS") {
            self.search.mcp_args = v.split_whitespace().map(str::to_string).collect();
        }
        set_opt(&mut self.search.tavily_api_key, get("TAVILY_API_KEY"));
        set_bool(&mut self.search.tool_enabled, get("SEARCH_TOOL_ENABLED"));
        if let Some(v) = get("SEARCH_TOOL_ENGINE") {
            self.search.tool_engine = v.to_lowercase();
        }
        set_opt(&mut self.search.brave_search_api_key, get("BRAVE_SEARCH_API_KEY"));
        set_opt(&mut self.search.bing_search_api_key, get("BING_SEARCH_API_KEY"));
        set_opt(&mut self.search.google_search_api_key, get("GOOGLE_SEARCH_API_KEY"));
        set_opt(
            &mut self.search.google_search_engine_id,
            get("GOOGLE_SEARCH_ENGINE_ID"),
        );

        set_opt(&mut self.generation.gemini_api_key, get("GEMINI_API_KEY"));
        if let Some(v) = get("GEMINI_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.generation.embedding_model = v;
        }
        set_parsed(
            &mut self.generation.max_output_tokens,
            get("GENERATION_MAX_TOKENS"),
        );

        set_bool(&mut self.guardrails.enforce_input, get("ENFORCE_INPUT_GUARDRAILS"));
        set_bool(
            &mut self.guardrails.enforce_output,
            get("ENFORCE_OUTPUT_GUARDRAILS"),
        );
        if let Some(v) = get("BLOCKED_KEYWORDS") {
            self.guardrails.blocked_keywords = v
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
        }

        if let Some(v) = get("FEEDBACK_STORE_PATH") {
            self.storage.feedback_path = Some(PathBuf::from(v));
        }
        set_opt(&mut self.storage.database_url, get("DATABASE_URL"));
    }

    /// JSON view with credentials masked, safe to log.
    pub fn redacted(&self) -> Value {
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        redact_sensitive_values(&value)
    }
}

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("MENTOR_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let data_config = self.paths.data_dir.join("config.yml");
        if data_config.exists() {
            return data_config;
        }

        self.paths.project_root.join("config.yml")
    }

    /// Defaults, then the YAML file (if any), then the environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = load_yaml_file(&self.config_path())?;
        config.apply_env(|key| env::var(key).ok());
        validate_config(&config)?;
        Ok(config)
    }
}

fn load_yaml_file(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    serde_yaml::from_str::<AppConfig>(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn set_opt(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: Option<String>) {
    let Some(raw) = value else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(value = %raw, "ignoring unparseable config value"),
    }
}

fn set_bool(slot: &mut bool, value: Option<String>) {
    let Some(raw) = value else {
        return;
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => *slot = true,
        "0" | "false" | "no" | "off" => *slot = false,
        _ => tracing::warn!(value = %raw, "ignoring unparseable boolean config value"),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, child) in map {
                let redacted = if is_sensitive_key(key) && !child.is_null() {
                    Value::String(REDACT_PLACEHOLDER.to_string())
                } else {
                    redact_sensitive_values(child)
                };
                out.insert(key.clone(), redacted);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        other => other.clone(),
    }
}
