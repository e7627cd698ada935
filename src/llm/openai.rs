use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, ChatModel, ChatProvider, LlmError, Message};
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

/// Chat model speaking the OpenAI `/chat/completions` protocol. Serves both
/// OpenAI and Groq, which differ only in base URL.
pub struct OpenAiChat {
    provider: ChatProvider,
    client: Client,
    config: OpenAiConfig,
    model: String,
}

impl OpenAiChat {
    pub fn new(provider: ChatProvider, client: Client, config: OpenAiConfig, model: String) -> Self {
        Self {
            provider,
            client,
            config,
            model,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn provider(&self) -> ChatProvider {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        chat(&self.client, &self.config, &self.model, messages)
            .await
            .map_err(|e| AppError::provider(self.provider.display_name(), e))
    }
}

pub async fn chat(
    client: &Client,
    config: &OpenAiConfig,
    model: &str,
    messages: &[Message],
) -> std::result::Result<String, LlmError> {
    let messages: Vec<OpenAiMessage> = messages
        .iter()
        .map(|m| OpenAiMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect();

    let body = OpenAiRequest {
        model,
        messages,
        stream: false,
    };

    debug!(
        "POST {}/chat/completions ({} messages)",
        config.base_url,
        body.messages.len()
    );

    let resp = client
        .post(format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        ))
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", config.api_key))
        .json(&body)
        .send()
        .await?;

    let resp = check_status(resp).await?;

    let data: OpenAiResponse = resp.json().await?;
    data.choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .ok_or_else(|| LlmError::Parse("response contained no choices".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> OpenAiConfig {
        OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: format!("{}/v1", server.uri()),
        }
    }

    #[tokio::test]
    async fn test_chat_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hello there"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = chat(
            &Client::new(),
            &config_for(&server),
            "gpt-4o-mini",
            &[Message::system("be brief"), Message::user("hi")],
        )
        .await
        .unwrap();
        assert_eq!(reply, "hello there");
    }

    #[tokio::test]
    async fn test_chat_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = chat(
            &Client::new(),
            &config_for(&server),
            "gpt-4o-mini",
            &[Message::user("hi")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 429, ref message } if message == "rate limited"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = chat(
            &Client::new(),
            &config_for(&server),
            "m",
            &[Message::user("hi")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }
}
