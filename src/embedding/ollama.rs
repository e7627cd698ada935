use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_count, Embedder, EmbeddingProvider};
use crate::error::{AppError, Result};
use crate::llm::check_status;

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings from a local Ollama server (`/api/embed`).
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    batch_size: usize,
}

impl OllamaEmbedder {
    pub fn new(client: Client, base_url: String, model: String, batch_size: usize) -> Self {
        Self {
            client,
            base_url,
            model,
            batch_size,
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        debug!("Embedding {} texts at {}", texts.len(), url);

        let resp = self
            .client
            .post(url)
            .json(&BatchEmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| AppError::provider("Ollama", e))?;

        let resp = check_status(resp)
            .await
            .map_err(|e| AppError::provider("Ollama", e))?;

        let data: BatchEmbedResponse = resp
            .json()
            .await
            .map_err(|e| AppError::provider("Ollama", e))?;
        Ok(data.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn provider(&self) -> EmbeddingProvider {
        EmbeddingProvider::Local
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.embed_batch(batch).await?;
            check_count(self.provider(), batch.len(), embeddings.len())?;
            vectors.extend(embeddings);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_posts_model_and_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_json(json!({"model": "all-minilm", "input": ["alpha", "beta"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "all-minilm",
                "embeddings": [[0.1, 0.2], [0.3, 0.4]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder =
            OllamaEmbedder::new(Client::new(), server.uri(), "all-minilm".to_string(), 16);
        let vectors = embedder
            .embed(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn test_server_error_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let embedder =
            OllamaEmbedder::new(Client::new(), server.uri(), "all-minilm".to_string(), 16);
        let result = embedder.embed_query("alpha").await;
        assert!(matches!(result, Err(AppError::Provider { provider: "Ollama", .. })));
    }
}
