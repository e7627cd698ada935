use tracing::{debug, warn};

use crate::error::Result;
use crate::index::VectorIndex;
use crate::llm::{ChatModel, Message};
use crate::prompt::with_context;
use crate::search::{search_text, WebSearch};

/// Where the context for a turn comes from.
pub enum ContextSource<'a> {
    None,
    Retrieval { index: &'a VectorIndex, k: usize },
    Search(&'a dyn WebSearch),
}

/// Produce the assistant reply for the newest user turn.
///
/// `history` must already end with `user_message`. Never fails: any error is
/// returned as displayable text.
pub async fn respond(
    model: &dyn ChatModel,
    history: &[Message],
    user_message: &str,
    system_prompt: &str,
    context: ContextSource<'_>,
) -> String {
    match try_respond(model, history, user_message, system_prompt, context).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Turn failed with {} {}: {}", model.provider(), model.model(), e);
            format!("Error getting response: {}", e)
        }
    }
}

async fn try_respond(
    model: &dyn ChatModel,
    history: &[Message],
    user_message: &str,
    system_prompt: &str,
    context: ContextSource<'_>,
) -> Result<String> {
    let context = resolve_context(context, user_message).await?;
    let messages = build_messages(history, system_prompt, &context);
    debug!(
        "Calling {} {} with {} messages",
        model.provider(),
        model.model(),
        messages.len()
    );
    model.complete(&messages).await
}

/// Fetch the context text for `query`.
pub async fn resolve_context(context: ContextSource<'_>, query: &str) -> Result<String> {
    match context {
        ContextSource::None => Ok(String::new()),
        ContextSource::Retrieval { index, k } => {
            let chunks = index.retrieve(query, k).await?;
            debug!("Retrieved {} relevant chunks from document", chunks.len());
            Ok(chunks
                .iter()
                .map(|c| c.chunk.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"))
        }
        ContextSource::Search(search) => Ok(search_text(search, query).await),
    }
}

/// One system message followed by the whole history, in order.
pub fn build_messages(history: &[Message], system_prompt: &str, context: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(with_context(system_prompt, context)));
    messages.extend(history.iter().cloned());
    messages
}
