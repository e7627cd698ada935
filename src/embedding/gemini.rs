use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_count, Embedder, EmbeddingProvider};
use crate::error::{AppError, Result};
use crate::llm::{check_status, LlmError};
use crate::llm::gemini::GeminiConfig;

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    task_type: TaskType,
}

/// Documents and queries are embedded with different task types.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

pub struct GeminiEmbedder {
    client: Client,
    config: GeminiConfig,
    model: String,
    batch_size: usize,
}

impl GeminiEmbedder {
    pub fn new(client: Client, config: GeminiConfig, model: String, batch_size: usize) -> Self {
        let model = if model.starts_with("models/") {
            model
        } else {
            format!("models/{}", model)
        };
        Self {
            client,
            config,
            model,
            batch_size,
        }
    }

    async fn embed_batch(&self, texts: &[String], task_type: TaskType) -> Result<Vec<Vec<f32>>> {
        let url = format!(
            "{}/{}:batchEmbedContents",
            self.config.base_url.trim_end_matches('/'),
            self.model
        );
        debug!("Embedding {} texts at {}", texts.len(), url);

        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: self.model.clone(),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                    task_type,
                })
                .collect(),
        };

        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::provider("Google", e))?;

        let resp = check_status(resp)
            .await
            .map_err(|e| AppError::provider("Google", e))?;

        let data: BatchEmbedResponse = resp
            .json()
            .await
            .map_err(|e| AppError::provider("Google", e))?;
        Ok(data.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn provider(&self) -> EmbeddingProvider {
        EmbeddingProvider::Google
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.embed_batch(batch, TaskType::RetrievalDocument).await?;
            check_count(self.provider(), batch.len(), embeddings.len())?;
            vectors.extend(embeddings);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embed_batch(&[text.to_string()], TaskType::RetrievalQuery)
            .await?;
        check_count(self.provider(), 1, vectors.len())?;
        vectors.pop().ok_or_else(|| {
            AppError::provider(
                "Google",
                LlmError::Parse("no embedding returned for query".to_string()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_batch_embed_contents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/embedding-001:batchEmbedContents"))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_json(json!({
                "requests": [
                    {"model": "models/embedding-001", "content": {"parts": [{"text": "one"}]}, "taskType": "RETRIEVAL_DOCUMENT"},
                    {"model": "models/embedding-001", "content": {"parts": [{"text": "two"}]}, "taskType": "RETRIEVAL_DOCUMENT"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [{"values": [1.0, 0.0]}, {"values": [0.0, 1.0]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = GeminiEmbedder::new(
            Client::new(),
            GeminiConfig {
                api_key: "g-key".to_string(),
                base_url: format!("{}/v1beta", server.uri()),
            },
            "embedding-001".to_string(),
            16,
        );
        let vectors = embedder
            .embed(&["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_query_uses_retrieval_query_task() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/embedding-001:batchEmbedContents"))
            .and(body_json(json!({
                "requests": [
                    {"model": "models/embedding-001", "content": {"parts": [{"text": "margin trend"}]}, "taskType": "RETRIEVAL_QUERY"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [{"values": [0.5, 0.5]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = GeminiEmbedder::new(
            Client::new(),
            GeminiConfig {
                api_key: "g-key".to_string(),
                base_url: format!("{}/v1beta", server.uri()),
            },
            "models/embedding-001".to_string(),
            16,
        );
        let vector = embedder.embed_query("margin trend").await.unwrap();
        assert_eq!(vector, vec![0.5, 0.5]);
    }
}
