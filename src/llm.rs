//! Chat-completion providers.
//!
//! [`ChatProvider`] turns a message list into one completion string.
//! Implementations send exactly one request per call and classify failures
//! into [`ProviderError`]; the answer orchestrator decides what a failure
//! means for the user.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::embedding::DEFAULT_OLLAMA_URL;
use crate::error::{ProviderError, RagError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Configuration check performed before any request.
    fn ensure_configured(&self) -> Result<(), RagError> {
        Ok(())
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<String, ProviderError>;
}

// ============ OpenAI ============

pub struct OpenAIChat {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAIChat {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatProvider for OpenAIChat {
    fn name(&self) -> &str {
        "openai"
    }

    fn ensure_configured(&self) -> Result<(), RagError> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(RagError::configuration(
                "OpenAI API key not set (OPENAI_API_KEY or [openai].api_key)",
            )),
        }
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Auth("no OpenAI API key configured".into()))?;

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("OpenAI", status, &body_text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_transport("OpenAI", e))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

// ============ Ollama ============

pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
}

impl OllamaChat {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatChoiceMessage,
}

#[async_trait]
impl ChatProvider for OllamaChat {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": temperature },
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport("Ollama", e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("Ollama", status, &body_text));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_transport("Ollama", e))?;
        Ok(parsed.message.content.unwrap_or_default())
    }
}

/// Create the [`ChatProvider`] named by `[llm].provider`.
pub fn create_chat_provider(config: &Config) -> Result<Arc<dyn ChatProvider>, RagError> {
    let llm = &config.llm;
    match llm.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChat::new(
            llm.url.clone().unwrap_or_else(|| config.openai.base_url.clone()),
            config.openai.key().map(str::to_string),
        ))),
        "ollama" => Ok(Arc::new(OllamaChat::new(
            llm.url.clone().unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
        ))),
        other => Err(RagError::configuration(format!(
            "Unknown llm provider: {}",
            other
        ))),
    }
}
