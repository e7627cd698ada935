use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::embedding::EmbeddingProvider;

pub const APP_DIR_NAME: &str = "analyst-chat";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    DirectoryError,
    #[error("Invalid URL for {0}: {1}")]
    InvalidUrl(&'static str, String),
    #[error("Invalid chunk size: {0} (must be greater than 0)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
    #[error("Invalid retrieval count: {0} (must be at least 1)")]
    InvalidRetrievalCount(usize),
    #[error("Invalid embedding batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid request timeout: {0} (must be at least 1 second)")]
    InvalidTimeout(u64),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Runtime configuration. Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub credentials: Credentials,
    pub endpoints: Endpoints,
    pub models: ModelDefaults,
    pub rag: RagSettings,
    pub app: AppMetadata,
    /// Where uploaded documents are copied before ingestion.
    pub upload_dir: PathBuf,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            endpoints: Endpoints::default(),
            models: ModelDefaults::default(),
            rag: RagSettings::default(),
            app: AppMetadata::default(),
            upload_dir: std::env::temp_dir().join(APP_DIR_NAME),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Credentials {
    pub groq_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

impl Credentials {
    pub fn groq(&self) -> Option<&str> {
        non_empty(&self.groq_api_key)
    }

    pub fn openai(&self) -> Option<&str> {
        non_empty(&self.openai_api_key)
    }

    pub fn google(&self) -> Option<&str> {
        non_empty(&self.google_api_key)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("groq_api_key", &self.groq().map(mask_secret))
            .field("openai_api_key", &self.openai().map(mask_secret))
            .field("google_api_key", &self.google().map(mask_secret))
            .finish()
    }
}

/// Mask an API key for display, keeping the first and last four characters.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub groq_base_url: String,
    pub openai_base_url: String,
    pub google_base_url: String,
    pub ollama_url: String,
    pub search_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            groq_base_url: "https://api.groq.com/openai/v1".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            google_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            search_url: "https://api.duckduckgo.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelDefaults {
    pub groq_chat: String,
    pub openai_chat: String,
    pub google_chat: String,
    pub local_embedding: String,
    pub openai_embedding: String,
    pub google_embedding: String,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            groq_chat: "llama-3.3-70b-versatile".to_string(),
            openai_chat: "gpt-4o-mini".to_string(),
            google_chat: "gemini-2.5-flash".to_string(),
            // all-MiniLM-L6-v2 as packaged for Ollama
            local_embedding: "all-minilm".to_string(),
            openai_embedding: "text-embedding-3-small".to_string(),
            google_embedding: "models/embedding-001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagSettings {
    /// Chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    pub retrieval_k: usize,
    /// Pull chunk ends back to paragraph, line, sentence or word boundaries.
    pub prefer_boundaries: bool,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_batch_size: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_k: 3,
            prefer_boundaries: true,
            embedding_provider: EmbeddingProvider::Local,
            embedding_batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppMetadata {
    pub title: String,
    pub icon: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            title: "Strategic Business Intelligence Analyst".to_string(),
            icon: "📊".to_string(),
        }
    }
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME).join("config.toml"))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load from `path` (or the default location when it exists), then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Ok(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading config from {}", path.display());
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment-style overrides. `lookup` returns the value for a key.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GROQ_API_KEY") {
            self.credentials.groq_api_key = Some(v);
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.credentials.openai_api_key = Some(v);
        }
        if let Some(v) = lookup("GOOGLE_API_KEY") {
            self.credentials.google_api_key = Some(v);
        }
        if let Some(v) = lookup("ANALYST_CHUNK_SIZE") {
            self.rag.chunk_size = parse_number("ANALYST_CHUNK_SIZE", v)?;
        }
        if let Some(v) = lookup("ANALYST_CHUNK_OVERLAP") {
            self.rag.chunk_overlap = parse_number("ANALYST_CHUNK_OVERLAP", v)?;
        }
        if let Some(v) = lookup("ANALYST_RETRIEVAL_K") {
            self.rag.retrieval_k = parse_number("ANALYST_RETRIEVAL_K", v)?;
        }
        if let Some(v) = lookup("ANALYST_EMBEDDING_PROVIDER") {
            self.rag.embedding_provider =
                v.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "ANALYST_EMBEDDING_PROVIDER",
                    value: v,
                })?;
        }
        if let Some(v) = lookup("ANALYST_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ANALYST_OLLAMA_URL") {
            self.endpoints.ollama_url = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;
        if rag.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(rag.chunk_size));
        }
        if rag.chunk_overlap >= rag.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: rag.chunk_overlap,
                size: rag.chunk_size,
            });
        }
        if rag.retrieval_k == 0 {
            return Err(ConfigError::InvalidRetrievalCount(rag.retrieval_k));
        }
        if !(1..=1000).contains(&rag.embedding_batch_size) {
            return Err(ConfigError::InvalidBatchSize(rag.embedding_batch_size));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(self.request_timeout_secs));
        }

        let endpoints = &self.endpoints;
        for (name, value) in [
            ("groq_base_url", &endpoints.groq_base_url),
            ("openai_base_url", &endpoints.openai_base_url),
            ("google_base_url", &endpoints.google_base_url),
            ("ollama_url", &endpoints.ollama_url),
            ("search_url", &endpoints.search_url),
        ] {
            Url::parse(value).map_err(|_| ConfigError::InvalidUrl(name, value.clone()))?;
        }

        Ok(())
    }
}

fn parse_number(key: &'static str, value: String) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}
