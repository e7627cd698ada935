use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use analyst_chat::config::{mask_secret, Config};
use analyst_chat::doc_processor;
use analyst_chat::llm::{gemini, get_chat_model, http_client, Message};
use analyst_chat::{ChatProvider, ContextMode, ResponseMode, Session, SessionOptions};

#[derive(Parser)]
#[command(name = "analyst-chat")]
#[command(about = "Business analyst chat over hosted language models, documents and web search")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        #[arg(long, default_value = "groq")]
        provider: ChatProvider,
        /// Model name; the provider default when omitted
        #[arg(long)]
        model: Option<String>,
        /// API key for this session only
        #[arg(long)]
        api_key: Option<String>,
        /// Context source: chat, document or search
        #[arg(long, default_value = "chat")]
        source: ContextMode,
        /// Document to load before the first message
        #[arg(long)]
        document: Option<PathBuf>,
        #[arg(long, default_value = "concise")]
        mode: ResponseMode,
    },
    /// Chunk a document and print chunk attribution
    Ingest {
        path: PathBuf,
    },
    /// Report configured credentials
    Doctor {
        /// Send a short message to every configured provider
        #[arg(long)]
        probe: bool,
    },
    /// List Gemini models that support content generation
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stderr keeps log lines out of the conversation
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Chat {
            provider,
            model,
            api_key,
            source,
            document,
            mode,
        } => {
            let options = SessionOptions {
                provider,
                model,
                api_key,
                context_mode: source,
                response_mode: mode,
            };
            let mut session = Session::new(Arc::new(config), options)?;
            if let Some(path) = document {
                let count = session.load_document(&path).await?;
                println!("Indexed {} ({} chunks)", path.display(), count);
            }
            run_repl(&mut session).await?;
        }
        Commands::Ingest { path } => {
            let settings = config.rag.clone();
            let chunks =
                tokio::task::spawn_blocking(move || doc_processor::ingest(&path, &settings))
                    .await??;
            println!("{} chunks", chunks.len());
            for chunk in &chunks {
                let page = chunk
                    .source
                    .page
                    .map(|p| format!(" page {}", p))
                    .unwrap_or_default();
                println!(
                    "#{} {}{} @{} ({} chars)",
                    chunk.source.chunk_index,
                    chunk.source.file_name,
                    page,
                    chunk.source.char_offset,
                    chunk.text.chars().count()
                );
            }
        }
        Commands::Doctor { probe } => doctor(&config, probe).await,
        Commands::Models => {
            let api_key = config
                .credentials
                .google()
                .context("Google API Key is missing")?
                .to_string();
            let client = http_client(&config)?;
            let models = gemini::list_models(
                &client,
                &gemini::GeminiConfig {
                    api_key,
                    base_url: config.endpoints.google_base_url.clone(),
                },
            )
            .await?;
            for model in models {
                println!("{}", model);
            }
        }
    }

    Ok(())
}

async fn run_repl(session: &mut Session) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "{} {} | source: {} | mode: {}  (/clear, /quit)",
        session.chat_model().provider().display_name(),
        session.chat_model().model(),
        session.context_mode(),
        session.response_mode()
    );
    if let Some(greeting) = session.history().last() {
        println!("{}\n", greeting.content);
    }

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear_history();
                println!("History cleared.");
                continue;
            }
            _ => {}
        }

        let reply = session.send_message(line).await;
        println!("{}\n", reply);
    }
    Ok(())
}

async fn doctor(config: &Config, probe: bool) {
    let keys = [
        (ChatProvider::Groq, config.credentials.groq()),
        (ChatProvider::OpenAi, config.credentials.openai()),
        (ChatProvider::Google, config.credentials.google()),
    ];

    for (provider, key) in keys {
        match key {
            Some(key) => println!("{:<8} {}", provider.display_name(), mask_secret(key)),
            None => println!("{:<8} not configured", provider.display_name()),
        }
        if !probe || key.is_none() {
            continue;
        }
        match get_chat_model(provider, None, None, config) {
            Ok(model) => match model.complete(&[Message::user("Hello")]).await {
                Ok(_) => println!("         {} responded", model.model()),
                Err(e) => println!("         {} failed: {}", model.model(), e),
            },
            Err(e) => {
                warn!("Could not build {} client: {}", provider, e);
                println!("         {}", e);
            }
        }
    }
    println!(
        "Embeddings: {} | upload dir: {}",
        config.rag.embedding_provider,
        config.upload_dir.display()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn chat_defaults() {
        let cli = Cli::try_parse_from(["analyst-chat", "chat"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Chat {
                provider,
                source,
                mode,
                document,
                ..
            } = parsed.command
            {
                assert_eq!(provider, ChatProvider::Groq);
                assert_eq!(source, ContextMode::Chat);
                assert_eq!(mode, ResponseMode::Concise);
                assert_eq!(document, None);
            }
        }
    }

    #[test]
    fn chat_with_document_source() {
        let cli = Cli::try_parse_from([
            "analyst-chat",
            "chat",
            "--provider",
            "gemini",
            "--source",
            "document",
            "--document",
            "q3.pdf",
            "--mode",
            "detailed",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Chat {
                provider,
                source,
                document,
                mode,
                ..
            } = parsed.command
            {
                assert_eq!(provider, ChatProvider::Google);
                assert_eq!(source, ContextMode::Document);
                assert_eq!(document, Some(PathBuf::from("q3.pdf")));
                assert_eq!(mode, ResponseMode::Detailed);
            }
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let cli = Cli::try_parse_from(["analyst-chat", "chat", "--provider", "anthropic"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::try_parse_from(["analyst-chat", "doctor", "--config", "/tmp/a.toml"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config, Some(PathBuf::from("/tmp/a.toml")));
            matches!(parsed.command, Commands::Doctor { probe: false });
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["analyst-chat", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }
}
