pub mod config;
pub mod doc_processor;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod search;
pub mod session;

pub use config::Config;
pub use error::{AppError, Result};
pub use llm::{ChatProvider, Message, Role};
pub use prompt::ResponseMode;
pub use session::{ContextMode, Session, SessionOptions};
