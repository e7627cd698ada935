use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, ChatModel, ChatProvider, LlmError, Message, Role};
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

/// Gemini keeps the system prompt out of the turn list and calls the
/// assistant role `model`.
fn build_request(messages: &[Message]) -> GeminiRequest {
    let system: Vec<GeminiPart> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| GeminiPart {
            text: m.content.clone(),
        })
        .collect();

    let contents = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| GeminiContent {
            role: Some(
                match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                }
                .to_string(),
            ),
            parts: vec![GeminiPart {
                text: m.content.clone(),
            }],
        })
        .collect();

    GeminiRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| GeminiContent {
            role: None,
            parts: system,
        }),
    }
}

fn model_path(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

pub struct GeminiChat {
    client: Client,
    config: GeminiConfig,
    model: String,
}

impl GeminiChat {
    pub fn new(client: Client, config: GeminiConfig, model: String) -> Self {
        Self {
            client,
            config,
            model,
        }
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn provider(&self) -> ChatProvider {
        ChatProvider::Google
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        chat(&self.client, &self.config, &self.model, messages)
            .await
            .map_err(|e| AppError::provider(ChatProvider::Google.display_name(), e))
    }
}

pub async fn chat(
    client: &Client,
    config: &GeminiConfig,
    model: &str,
    messages: &[Message],
) -> std::result::Result<String, LlmError> {
    let body = build_request(messages);
    let url = format!(
        "{}/models/{}:generateContent",
        config.base_url.trim_end_matches('/'),
        model_path(model)
    );
    debug!("POST {} ({} turns)", url, body.contents.len());

    let resp = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("x-goog-api-key", &config.api_key)
        .json(&body)
        .send()
        .await?;

    let resp = check_status(resp).await?;

    let data: GeminiResponse = resp.json().await?;
    let candidate = data
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("response contained no candidates".to_string()))?;

    Ok(candidate
        .content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .concat())
}

/// Names of the models available to `config.api_key` that support
/// `generateContent`, across all result pages.
pub async fn list_models(
    client: &Client,
    config: &GeminiConfig,
) -> std::result::Result<Vec<String>, LlmError> {
    let url = format!("{}/models", config.base_url.trim_end_matches('/'));
    let mut names = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut request = client
            .get(&url)
            .query(&[("pageSize", "1000")])
            .header("x-goog-api-key", &config.api_key);
        if let Some(token) = &page_token {
            request = request.query(&[("pageToken", token.as_str())]);
        }

        let resp = check_status(request.send().await?).await?;
        let data: ModelsResponse = resp.json().await?;

        names.extend(
            data.models
                .into_iter()
                .filter(|m| {
                    m.supported_generation_methods
                        .iter()
                        .any(|method| method == "generateContent")
                })
                .map(|m| m.name),
        );

        match data.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    debug!("Listed {} Gemini models", names.len());
    Ok(names)
}
