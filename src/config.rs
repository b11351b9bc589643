use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the study assistant server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the shared Qdrant collection; students are separated by namespace.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Completion backend used for answers, summaries, and flashcards.
    pub generation_provider: GenerationProvider,
    /// Completion model identifier passed to the provider.
    pub generation_model: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// API key for the OpenAI-compatible API.
    pub openai_api_key: Option<String>,
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Maximum characters of chunk text persisted in the index payload.
    pub chunk_text_max_chars: usize,
    /// Directory receiving raw uploads.
    pub upload_dir: PathBuf,
    /// Request body limit for uploads, in bytes.
    pub upload_max_bytes: usize,
    /// Attempts per external call, including the first.
    pub retry_max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub retry_initial_backoff_ms: u64,
    /// Upper bound for any single retry delay, in milliseconds.
    pub retry_max_backoff_ms: u64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
    /// Deterministic byte-hashing embeddings for offline use.
    Hash,
}

/// Supported completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible chat completions API.
    OpenAI,
    /// Returns the leading context verbatim; no model involved.
    Extractive,
}

const DEFAULT_COLLECTION: &str = "study-notes";
const DEFAULT_GENERATION_MODEL: &str = "llama3.1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_UPLOAD_DIR: &str = "data/uploads";

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: load_env("EMBEDDING_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            generation_provider: load_env_optional("GENERATION_PROVIDER")
                .map(|value| {
                    value.parse().map_err(|()| {
                        ConfigError::InvalidValue("GENERATION_PROVIDER".to_string())
                    })
                })
                .transpose()?
                .unwrap_or(GenerationProvider::Ollama),
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            chunk_size: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?.unwrap_or(1000),
            chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?.unwrap_or(200),
            chunk_text_max_chars: parse_optional("CHUNK_TEXT_MAX_CHARS")?.unwrap_or(1200),
            upload_dir: load_env_optional("UPLOAD_DIR")
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string())
                .into(),
            upload_max_bytes: parse_optional("UPLOAD_MAX_BYTES")?.unwrap_or(50 * 1024 * 1024),
            retry_max_attempts: parse_optional("RETRY_MAX_ATTEMPTS")?.unwrap_or(3),
            retry_initial_backoff_ms: parse_optional("RETRY_INITIAL_BACKOFF_MS")?.unwrap_or(200),
            retry_max_backoff_ms: parse_optional("RETRY_MAX_BACKOFF_MS")?.unwrap_or(5_000),
            server_port: parse_optional("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".into(),
            ));
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("RETRY_MAX_ATTEMPTS".into()));
        }
        let needs_openai_key = self.embedding_provider == EmbeddingProvider::OpenAI
            || self.generation_provider == GenerationProvider::OpenAI;
        if needs_openai_key && self.openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }
        Ok(())
    }

    /// Retry policy applied to every external call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_initial_backoff_ms),
            Duration::from_millis(self.retry_max_backoff_ms),
        )
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "extractive" => Ok(Self::Extractive),
            _ => Err(()),
        }
    }
}

/// Load `.env` (when present) and parse the configuration.
///
/// Called once from each binary's `main`; the resulting value is handed to the services that
/// need it rather than stored globally.
pub fn load_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        embedding_provider = ?config.embedding_provider,
        generation_provider = ?config.generation_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(config)
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        qdrant_url: "http://127.0.0.1:6333".into(),
        qdrant_collection_name: "study-notes-test".into(),
        qdrant_api_key: None,
        embedding_provider: EmbeddingProvider::Hash,
        embedding_model: "test-model".into(),
        embedding_dimension: 16,
        generation_provider: GenerationProvider::Extractive,
        generation_model: "test-llm".into(),
        ollama_url: DEFAULT_OLLAMA_URL.into(),
        openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
        openai_api_key: None,
        chunk_size: 1000,
        chunk_overlap: 200,
        chunk_text_max_chars: 1200,
        upload_dir: std::env::temp_dir().join("studyrag-test-uploads"),
        upload_max_bytes: 1024 * 1024,
        retry_max_attempts: 1,
        retry_initial_backoff_ms: 1,
        retry_max_backoff_ms: 1,
        server_port: None,
    }
}
