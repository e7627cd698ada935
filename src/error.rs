use crate::config::ConfigError;
use crate::llm::LlmError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("Error processing document: {0}")]
    Ingestion(String),
    #[error("{0} API Key is missing")]
    MissingCredential(&'static str),
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("Cannot build an index from zero chunks")]
    EmptyIndex,
    #[error("{provider} request failed: {source}")]
    Provider {
        provider: &'static str,
        #[source]
        source: LlmError,
    },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn provider(provider: &'static str, source: impl Into<LlmError>) -> Self {
        AppError::Provider {
            provider,
            source: source.into(),
        }
    }
}
