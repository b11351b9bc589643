//! Answer generation via chat-completion providers.
//!
//! Every answer, summary, and flashcard set is produced by an [`AnswerGenerator`] given a
//! prompt, a grounding context block, and a sampling temperature. The Ollama and OpenAI
//! clients issue HTTP requests directly; the extractive generator needs no model and is used
//! for offline runs.

use crate::config::{Config, GenerationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

const SYSTEM_PROMPT: &str = "You are a study assistant for students. Answer using the provided context from the student's own notes. If the context does not contain the answer, say so plainly instead of guessing.";

const EXTRACTIVE_MAX_CHARS: usize = 800;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider was unreachable or reported itself unavailable.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate text for `prompt`, grounded in `context`.
    async fn complete(
        &self,
        prompt: &str,
        context: &str,
        temperature: f64,
    ) -> Result<String, GenerationError>;
}

/// Build the user message shared by chat-style providers.
pub(crate) fn build_user_message(prompt: &str, context: &str) -> String {
    format!("Question/Task:\n{prompt}\n\nContext:\n{context}")
}

/// Build an answer generator for the configured provider.
pub fn get_answer_generator(config: &Config) -> Result<Arc<dyn AnswerGenerator>, GenerationError> {
    let generator: Arc<dyn AnswerGenerator> = match config.generation_provider {
        GenerationProvider::Extractive => Arc::new(ExtractiveGenerator),
        GenerationProvider::Ollama => Arc::new(OllamaGenerator::new(
            config.ollama_url.clone(),
            config.generation_model.clone(),
        )?),
        GenerationProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                GenerationError::ProviderUnavailable("OPENAI_API_KEY is not set".into())
            })?;
            Arc::new(OpenAiGenerator::new(
                config.openai_base_url.clone(),
                api_key,
                config.generation_model.clone(),
            )?)
        }
    };
    tracing::info!(
        provider = ?config.generation_provider,
        model = %config.generation_model,
        "Answer generator initialized"
    );
    Ok(generator)
}

/// Chat completions against a local Ollama runtime (`/api/chat`).
pub struct OllamaGenerator {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    /// Build a generator for the given runtime and model.
    pub fn new(base_url: String, model: String) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("studyrag/generate")
            .build()
            .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn complete(
        &self,
        prompt: &str,
        context: &str,
        temperature: f64,
    ) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_user_message(prompt, context) }
            ],
            "options": { "temperature": temperature }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaChatResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        body.message
            .map(|message| message.content.trim().to_string())
            .ok_or_else(|| GenerationError::InvalidResponse("response had no message".into()))
    }
}

/// Chat completions against an OpenAI-compatible API (`/v1/chat/completions`).
pub struct OpenAiGenerator {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    /// Build a generator for the given base URL, key, and model.
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("studyrag/generate")
            .build()
            .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn complete(
        &self,
        prompt: &str,
        context: &str,
        temperature: f64,
    ) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "temperature": temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_user_message(prompt, context) }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "OpenAI returned {status}: {body}"
            )));
        }

        let body: Value = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode OpenAI response: {error}"))
        })?;

        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| GenerationError::InvalidResponse("response had no choices".into()))
    }
}

/// Model-free generator that returns the leading part of the context.
pub struct ExtractiveGenerator;

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    async fn complete(
        &self,
        _prompt: &str,
        context: &str,
        _temperature: f64,
    ) -> Result<String, GenerationError> {
        let trimmed = context.trim();
        if trimmed.chars().count() <= EXTRACTIVE_MAX_CHARS {
            return Ok(trimmed.to_string());
        }
        let mut excerpt: String = trimmed.chars().take(EXTRACTIVE_MAX_CHARS - 1).collect();
        excerpt.push('…');
        Ok(excerpt)
    }
}
