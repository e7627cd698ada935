use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_count, Embedder, EmbeddingProvider};
use crate::error::{AppError, Result};
use crate::llm::openai::OpenAiConfig;
use crate::llm::{check_status, LlmError};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiConfig,
    model: String,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(client: Client, config: OpenAiConfig, model: String, batch_size: usize) -> Self {
        Self {
            client,
            config,
            model,
            batch_size,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn provider(&self) -> EmbeddingProvider {
        EmbeddingProvider::OpenAi
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = generate_embeddings(&self.client, &self.config, batch, &self.model)
                .await
                .map_err(|e| AppError::provider("OpenAI", e))?;
            check_count(self.provider(), batch.len(), embeddings.len())?;
            vectors.extend(embeddings);
        }
        Ok(vectors)
    }
}

/// Generate embeddings for a list of texts using the OpenAI-compatible API
pub async fn generate_embeddings(
    client: &Client,
    config: &OpenAiConfig,
    texts: &[String],
    model: &str,
) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
    debug!("Embedding {} texts with {}", texts.len(), model);

    let body = EmbeddingRequest {
        model,
        input: texts,
    };

    let resp = client
        .post(format!("{}/embeddings", config.base_url.trim_end_matches('/')))
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", config.api_key))
        .json(&body)
        .send()
        .await?;

    let resp = check_status(resp).await?;

    let mut data: EmbeddingResponse = resp.json().await?;
    data.data.sort_by_key(|d| d.index);
    Ok(data.data.into_iter().map(|d| d.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embedder_for(server: &MockServer, batch_size: usize) -> OpenAiEmbedder {
        OpenAiEmbedder::new(
            Client::new(),
            OpenAiConfig {
                api_key: "sk-test".to_string(),
                base_url: server.uri(),
            },
            "text-embedding-3-small".to_string(),
            batch_size,
        )
    }

    #[tokio::test]
    async fn test_embed_orders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "text-embedding-3-small"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let vectors = embedder_for(&server, 16)
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_embed_batches_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.5]}]
            })))
            .expect(3)
            .mount(&server)
            .await;

        let texts: Vec<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        let vectors = embedder_for(&server, 1).embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.5]}]
            })))
            .mount(&server)
            .await;

        let result = embedder_for(&server, 16)
            .embed(&["a".to_string(), "b".to_string()])
            .await;
        assert!(matches!(result, Err(AppError::Provider { provider: "OpenAI", .. })));
    }

    #[tokio::test]
    async fn test_unauthorized_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let result = embedder_for(&server, 16).embed_query("a").await;
        assert!(matches!(
            result,
            Err(AppError::Provider {
                source: LlmError::Api { status: 401, .. },
                ..
            })
        ));
    }
}
