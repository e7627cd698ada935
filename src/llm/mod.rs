pub mod gemini;
pub mod openai;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Hosted chat-completion providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    #[default]
    Groq,
    OpenAi,
    Google,
}

impl ChatProvider {
    pub const ALL: [ChatProvider; 3] = [ChatProvider::Groq, ChatProvider::OpenAi, ChatProvider::Google];

    /// Human-readable provider name used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ChatProvider::Groq => "Groq",
            ChatProvider::OpenAi => "OpenAI",
            ChatProvider::Google => "Google",
        }
    }

    pub fn default_model<'a>(&self, config: &'a Config) -> &'a str {
        match self {
            ChatProvider::Groq => &config.models.groq_chat,
            ChatProvider::OpenAi => &config.models.openai_chat,
            ChatProvider::Google => &config.models.google_chat,
        }
    }

    fn configured_key<'a>(&self, config: &'a Config) -> Option<&'a str> {
        match self {
            ChatProvider::Groq => config.credentials.groq(),
            ChatProvider::OpenAi => config.credentials.openai(),
            ChatProvider::Google => config.credentials.google(),
        }
    }
}

impl fmt::Display for ChatProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatProvider::Groq => "groq",
            ChatProvider::OpenAi => "openai",
            ChatProvider::Google => "google",
        };
        f.write_str(name)
    }
}

impl FromStr for ChatProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(ChatProvider::Groq),
            "openai" => Ok(ChatProvider::OpenAi),
            "google" | "gemini" => Ok(ChatProvider::Google),
            _ => Err(AppError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// A model that turns an ordered, role-tagged conversation into one reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn provider(&self) -> ChatProvider;

    fn model(&self) -> &str;

    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// Resolve a chat model. The credential comes from `api_key_override` when it
/// is non-empty, otherwise from the configuration. No network call is made.
pub fn get_chat_model(
    provider: ChatProvider,
    model_override: Option<&str>,
    api_key_override: Option<&str>,
    config: &Config,
) -> Result<Box<dyn ChatModel>> {
    let api_key = api_key_override
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .or_else(|| provider.configured_key(config))
        .ok_or(AppError::MissingCredential(provider.display_name()))?
        .to_string();

    let model = model_override
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| provider.default_model(config))
        .to_string();

    debug!("Initializing {} chat model {}", provider, model);
    let client = http_client(config).map_err(|e| AppError::provider(provider.display_name(), e))?;

    let chat: Box<dyn ChatModel> = match provider {
        ChatProvider::Groq => Box::new(openai::OpenAiChat::new(
            provider,
            client,
            openai::OpenAiConfig {
                api_key,
                base_url: config.endpoints.groq_base_url.clone(),
            },
            model,
        )),
        ChatProvider::OpenAi => Box::new(openai::OpenAiChat::new(
            provider,
            client,
            openai::OpenAiConfig {
                api_key,
                base_url: config.endpoints.openai_base_url.clone(),
            },
            model,
        )),
        ChatProvider::Google => Box::new(gemini::GeminiChat::new(
            client,
            gemini::GeminiConfig {
                api_key,
                base_url: config.endpoints.google_base_url.clone(),
            },
            model,
        )),
    };
    Ok(chat)
}

/// HTTP client shared by the provider, embedding and search clients.
pub fn http_client(config: &Config) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Turn a non-2xx response into `LlmError::Api`, passing successes through.
pub(crate) async fn check_status(
    resp: reqwest::Response,
) -> std::result::Result<reqwest::Response, LlmError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    Err(LlmError::Api { status, message })
}
