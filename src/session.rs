use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, ConfigError};
use crate::doc_processor::{self, DocumentFormat};
use crate::embedding::{get_embedder, Embedder};
use crate::error::{AppError, Result};
use crate::index::VectorIndex;
use crate::llm::{get_chat_model, ChatModel, ChatProvider, Message};
use crate::orchestrator::{self, ContextSource};
use crate::prompt::ResponseMode;
use crate::search::{DuckDuckGoSearch, WebSearch};

pub const DOCUMENT_GREETING: &str = "I've processed your document. How can I help you with it? You can ask for a summary, specific details, or analysis.";

/// Which context a turn is grounded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    #[default]
    Chat,
    Document,
    Search,
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextMode::Chat => f.write_str("chat"),
            ContextMode::Document => f.write_str("document"),
            ContextMode::Search => f.write_str("search"),
        }
    }
}

impl FromStr for ContextMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" | "none" => Ok(ContextMode::Chat),
            "document" | "rag" => Ok(ContextMode::Document),
            "search" | "web" => Ok(ContextMode::Search),
            _ => Err(AppError::Config(ConfigError::InvalidValue {
                key: "context mode",
                value: s.to_string(),
            })),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub provider: ChatProvider,
    pub model: Option<String>,
    /// Request-scoped credential; takes precedence over the configuration.
    pub api_key: Option<String>,
    pub context_mode: ContextMode,
    pub response_mode: ResponseMode,
}

/// State of one conversation: history, the selected model and context mode,
/// and the index built from the last uploaded document.
pub struct Session {
    id: Uuid,
    config: Arc<Config>,
    chat_model: Box<dyn ChatModel>,
    search: Box<dyn WebSearch>,
    embedder: Option<Arc<dyn Embedder>>,
    history: Vec<Message>,
    index: Option<VectorIndex>,
    context_mode: ContextMode,
    response_mode: ResponseMode,
}

impl Session {
    /// Start a session. The chat model is resolved here, so a missing
    /// credential is reported before the first message.
    pub fn new(config: Arc<Config>, options: SessionOptions) -> Result<Self> {
        let chat_model = get_chat_model(
            options.provider,
            options.model.as_deref(),
            options.api_key.as_deref(),
            &config,
        )?;
        let mut session = Self::with_chat_model(config, chat_model)?;
        session.context_mode = options.context_mode;
        session.response_mode = options.response_mode;
        Ok(session)
    }

    pub fn with_chat_model(config: Arc<Config>, chat_model: Box<dyn ChatModel>) -> Result<Self> {
        let search = Box::new(DuckDuckGoSearch::from_config(&config)?);
        let id = Uuid::new_v4();
        info!(
            "Session {} started with {} {}",
            id,
            chat_model.provider(),
            chat_model.model()
        );
        Ok(Self {
            id,
            config,
            chat_model,
            search,
            embedder: None,
            history: Vec::new(),
            index: None,
            context_mode: ContextMode::default(),
            response_mode: ResponseMode::default(),
        })
    }

    pub fn with_search(mut self, search: Box<dyn WebSearch>) -> Self {
        self.search = search;
        self
    }

    /// Use `embedder` for documents instead of the configured provider.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn chat_model(&self) -> &dyn ChatModel {
        self.chat_model.as_ref()
    }

    pub fn context_mode(&self) -> ContextMode {
        self.context_mode
    }

    pub fn response_mode(&self) -> ResponseMode {
        self.response_mode
    }

    pub fn set_context_mode(&mut self, mode: ContextMode) {
        self.context_mode = mode;
    }

    pub fn set_response_mode(&mut self, mode: ResponseMode) {
        self.response_mode = mode;
    }

    /// Switch provider. On failure the current model stays selected.
    pub fn set_provider(
        &mut self,
        provider: ChatProvider,
        model: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<()> {
        self.chat_model = get_chat_model(provider, model, api_key, &self.config)?;
        info!(
            "Session {} switched to {} {}",
            self.id,
            provider,
            self.chat_model.model()
        );
        Ok(())
    }

    /// Store an uploaded file in the working directory and index it.
    ///
    /// The extension is checked before anything is written. The copy is left
    /// in `upload_dir` for the caller to clean up. Returns the chunk count.
    pub async fn upload_document(&mut self, file_name: &str, bytes: &[u8]) -> Result<usize> {
        DocumentFormat::from_path(Path::new(file_name))?;

        let base_name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Ingestion(format!("invalid file name: {}", file_name)))?;

        let dir = &self.config.upload_dir;
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            AppError::Ingestion(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let path: PathBuf = dir.join(format!("{}-{}", self.id, base_name));
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            AppError::Ingestion(format!("cannot write {}: {}", path.display(), e))
        })?;

        self.load_document(&path).await
    }

    /// Ingest a document already on disk and replace the current index.
    /// The old index is kept when anything fails.
    pub async fn load_document(&mut self, path: &Path) -> Result<usize> {
        let settings = self.config.rag.clone();
        let owned = path.to_path_buf();
        // pdf parsing is CPU-bound and may panic on malformed input
        let chunks = tokio::task::spawn_blocking(move || doc_processor::ingest(&owned, &settings))
            .await
            .map_err(|e| AppError::Ingestion(format!("ingestion task failed: {}", e)))??;

        let embedder = match &self.embedder {
            Some(embedder) => Arc::clone(embedder),
            None => get_embedder(self.config.rag.embedding_provider, &self.config)?,
        };

        let index = VectorIndex::build(chunks, embedder).await?;
        let count = index.len();
        self.index = Some(index);

        if self.history.is_empty() {
            self.history.push(Message::assistant(DOCUMENT_GREETING));
        }

        info!("Session {} indexed {} ({} chunks)", self.id, path.display(), count);
        Ok(count)
    }

    /// Run one turn. The user message and the reply (or error text) are both
    /// appended to history; earlier turns are never touched.
    pub async fn send_message(&mut self, text: &str) -> String {
        self.history.push(Message::user(text));

        let context = match self.context_mode {
            ContextMode::Chat => ContextSource::None,
            ContextMode::Document => match &self.index {
                Some(index) => ContextSource::Retrieval {
                    index,
                    k: self.config.rag.retrieval_k,
                },
                None => {
                    warn!("Document mode without an uploaded document; answering without context");
                    ContextSource::None
                }
            },
            ContextMode::Search => ContextSource::Search(self.search.as_ref()),
        };

        let system_prompt = self.response_mode.system_prompt();
        let reply = orchestrator::respond(
            self.chat_model.as_ref(),
            &self.history,
            text,
            &system_prompt,
            context,
        )
        .await;

        self.history.push(Message::assistant(reply.clone()));
        reply
    }

    /// Forget the conversation. The document index is kept.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
