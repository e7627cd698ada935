//! Embedding providers.
//!
//! Every provider is reached over HTTP. `local` talks to an Ollama server on
//! the same machine and needs no credential; `openai` and `google` are hosted
//! and require an API key in the configuration.

pub mod gemini;
pub mod ollama;
pub mod openai;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::llm::{http_client, LlmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    #[serde(alias = "huggingface")]
    Local,
    OpenAi,
    Google,
}

impl EmbeddingProvider {
    pub fn display_name(&self) -> &'static str {
        match self {
            EmbeddingProvider::Local => "Ollama",
            EmbeddingProvider::OpenAi => "OpenAI",
            EmbeddingProvider::Google => "Google",
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmbeddingProvider::Local => "local",
            EmbeddingProvider::OpenAi => "openai",
            EmbeddingProvider::Google => "google",
        };
        f.write_str(name)
    }
}

impl FromStr for EmbeddingProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "huggingface" | "ollama" => Ok(EmbeddingProvider::Local),
            "openai" => Ok(EmbeddingProvider::OpenAi),
            "google" | "gemini" => Ok(EmbeddingProvider::Google),
            _ => Err(AppError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn provider(&self) -> EmbeddingProvider;

    /// Embed `texts`, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            AppError::provider(
                self.provider().display_name(),
                LlmError::Parse("no embedding returned for query".to_string()),
            )
        })
    }
}

/// Resolve an embedder for `provider`. Hosted providers fail with
/// `MissingCredential` when no API key is configured.
pub fn get_embedder(provider: EmbeddingProvider, config: &Config) -> Result<Arc<dyn Embedder>> {
    let client = http_client(config).map_err(|e| AppError::provider(provider.display_name(), e))?;
    let batch_size = config.rag.embedding_batch_size.max(1);

    let embedder: Arc<dyn Embedder> = match provider {
        EmbeddingProvider::Local => Arc::new(ollama::OllamaEmbedder::new(
            client,
            config.endpoints.ollama_url.clone(),
            config.models.local_embedding.clone(),
            batch_size,
        )),
        EmbeddingProvider::OpenAi => {
            let api_key = config
                .credentials
                .openai()
                .ok_or(AppError::MissingCredential("OpenAI"))?;
            Arc::new(openai::OpenAiEmbedder::new(
                client,
                crate::llm::openai::OpenAiConfig {
                    api_key: api_key.to_string(),
                    base_url: config.endpoints.openai_base_url.clone(),
                },
                config.models.openai_embedding.clone(),
                batch_size,
            ))
        }
        EmbeddingProvider::Google => {
            let api_key = config
                .credentials
                .google()
                .ok_or(AppError::MissingCredential("Google"))?;
            Arc::new(gemini::GeminiEmbedder::new(
                client,
                crate::llm::gemini::GeminiConfig {
                    api_key: api_key.to_string(),
                    base_url: config.endpoints.google_base_url.clone(),
                },
                config.models.google_embedding.clone(),
                batch_size,
            ))
        }
    };
    Ok(embedder)
}

/// Fail when a provider answered a batch with the wrong number of vectors.
pub(crate) fn check_count(
    provider: EmbeddingProvider,
    expected: usize,
    got: usize,
) -> Result<()> {
    if expected == got {
        return Ok(());
    }
    Err(AppError::provider(
        provider.display_name(),
        LlmError::Parse(format!(
            "Mismatch between request and response counts: {} vs {}",
            expected, got
        )),
    ))
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_provider_names_are_strict() {
        assert_eq!(
            "huggingface".parse::<EmbeddingProvider>().unwrap(),
            EmbeddingProvider::Local
        );
        assert_eq!(
            "openai".parse::<EmbeddingProvider>().unwrap(),
            EmbeddingProvider::OpenAi
        );
        assert!(matches!(
            "cohere".parse::<EmbeddingProvider>(),
            Err(AppError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_hosted_embedders_need_credentials() {
        let config = Config::default();
        assert!(matches!(
            get_embedder(EmbeddingProvider::OpenAi, &config),
            Err(AppError::MissingCredential("OpenAI"))
        ));
        assert!(matches!(
            get_embedder(EmbeddingProvider::Google, &config),
            Err(AppError::MissingCredential("Google"))
        ));
    }

    #[test]
    fn test_local_embedder_needs_no_credential() {
        let config = Config::default();
        let embedder = get_embedder(EmbeddingProvider::Local, &config).unwrap();
        assert_eq!(embedder.provider(), EmbeddingProvider::Local);
    }
}
