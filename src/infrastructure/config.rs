use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::domain::DomainError;

/// Everything loaded at startup: settings plus prompt texts.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub config: Config,
    pub prompts: PromptsConfig,
}

impl AppConfig {
    /// Reads `config.yaml` and `prompts.yaml` from `$CONFIG_DIR` (default
    /// `config`), applies environment overrides and validates the result.
    pub fn load() -> Result<Self, DomainError> {
        let dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        Self::load_from(Path::new(&dir), |key| std::env::var(key).ok())
    }

    pub fn load_from(dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self, DomainError> {
        let mut config: Config = read_yaml(&dir.join("config.yaml"))?.unwrap_or_default();
        let prompts: PromptsConfig = read_yaml(&dir.join("prompts.yaml"))?.unwrap_or_default();

        config.apply_env(&env)?;
        config.validate(&env)?;

        Ok(Self { config, prompts })
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, DomainError> {
    match std::fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => serde_yaml::from_str(&raw)
            .map(Some)
            .map_err(|e| DomainError::configuration(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DomainError::configuration(format!("{}: {e}", path.display()))),
    }
}

/// Parses a provider tag the same way serde does for the YAML files.
fn parse_provider<T: DeserializeOwned>(kind: &str, tag: &str) -> Result<T, DomainError> {
    serde_json::from_value(Value::String(tag.trim().to_lowercase()))
        .map_err(|_| DomainError::configuration(format!("unsupported {kind} provider: {tag}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
}

impl ChatProvider {
    pub fn credential(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

impl EmbeddingProvider {
    pub fn credential(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreProvider {
    Qdrant,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub memory: MemoryConfig,
    pub summarization: SummarizationConfig,
    pub weather: WeatherConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ChatProvider,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tool_rounds: usize,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ChatProvider::OpenAi,
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 120,
            max_tool_rounds: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            model: "text-embedding-3-small".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub provider: VectorStoreProvider,
    pub url: String,
    pub collection: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: VectorStoreProvider::Qdrant,
            url: "http://localhost:6334".to_string(),
            collection: "knowledge_base".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub search_top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            search_top_k: 4,
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    pub max_tokens_before_summary: usize,
    pub messages_to_keep: usize,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            max_tokens_before_summary: 1000,
            messages_to_keep: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub geocoding_url: String,
    pub forecast_url: String,
    pub geocoding_timeout_seconds: u64,
    pub forecast_timeout_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            geocoding_url: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            geocoding_timeout_seconds: 5,
            forecast_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Config {
    pub fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), DomainError> {
        if let Some(host) = env("BACKEND_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env("BACKEND_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| DomainError::configuration(format!("invalid BACKEND_PORT: {port}")))?;
        }
        if let Some(provider) = env("VECTOR_DB_PROVIDER") {
            self.vector_store.provider = parse_provider("vector store", &provider)?;
        }
        if let Some(url) = env("VECTOR_DB_URL") {
            self.vector_store.url = url;
        }
        if let Some(collection) = env("VECTOR_DB_COLLECTION") {
            self.vector_store.collection = collection;
        }
        if let Some(provider) = env("EMBEDDING_PROVIDER") {
            self.embedding.provider = parse_provider("embedding", &provider)?;
        }
        if let Some(model) = env("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(provider) = env("LLM_PROVIDER") {
            self.llm.provider = parse_provider("chat", &provider)?;
        }
        if let Some(model) = env("LLM_MODEL") {
            self.llm.model = model;
        }
        Ok(())
    }

    /// Fails when a selected provider has no credential or a setting is out
    /// of range.
    pub fn validate(&self, env: &impl Fn(&str) -> Option<String>) -> Result<(), DomainError> {
        for credential in [self.llm.provider.credential(), self.embedding.provider.credential()] {
            if env(credential).map_or(true, |v| v.trim().is_empty()) {
                return Err(DomainError::configuration(format!(
                    "{credential} must be set for the selected provider"
                )));
            }
        }

        let checks = [
            (self.llm.timeout_seconds == 0, "llm.timeout_seconds must be positive"),
            (self.llm.max_tool_rounds == 0, "llm.max_tool_rounds must be positive"),
            (self.memory.search_top_k == 0, "memory.search_top_k must be positive"),
            (self.memory.chunk_size == 0, "memory.chunk_size must be positive"),
            (
                self.memory.chunk_overlap >= self.memory.chunk_size,
                "memory.chunk_overlap must be smaller than memory.chunk_size",
            ),
            (
                self.summarization.messages_to_keep == 0,
                "summarization.messages_to_keep must be positive",
            ),
            (
                self.vector_store.collection.trim().is_empty(),
                "vector_store.collection must not be empty",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(DomainError::configuration(*message)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub agent: AgentPrompts,
    pub summary: SummaryPrompts,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentPrompts {
    pub system: String,
}

impl Default for AgentPrompts {
    fn default() -> Self {
        Self {
            system: "You are a helpful assistant with a personal knowledge base.\n\
                     - When the user attaches files and asks you to remember them, call save_memory.\n\
                     - When the user asks about material they supplied earlier, call search_memory.\n\
                     - When the user asks about the weather, call query_weather.\n\
                     - Otherwise answer directly.\n\
                     Reply in plain text without Markdown."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryPrompts {
    /// `{messages}` is replaced with the transcript being summarized.
    pub prompt: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            prompt: "Summarize the conversation below. Keep facts, names, numbers and any \
                     decisions the user made, so the conversation can continue from the \
                     summary alone.\n\n{messages}"
                .to_string(),
        }
    }
}
