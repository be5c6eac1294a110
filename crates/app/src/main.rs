use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_answer_core::{
    ChatTurn, DocumentKind, DocumentMeta, Engine, EngineOptions, OpenAiChatModel, OpenAiEmbedder,
    PineconeIndex, Source, EMBEDDING_DIMENSIONS,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "doc-answer", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenAI API key for embeddings and chat completions.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    /// Pinecone index host, e.g. https://docs-abc123.svc.us-east-1.pinecone.io
    #[arg(long, env = "PINECONE_INDEX_HOST")]
    pinecone_host: String,

    /// Pinecone API key.
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pinecone_api_key: String,

    /// Chat completion model.
    #[arg(long, default_value = "gpt-4")]
    chat_model: String,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest extracted text (.txt or .md) from a file or folder.
    Ingest {
        /// Path to one text file or a folder searched recursively.
        #[arg(long)]
        path: PathBuf,

        /// Document kind the text was extracted from: pdf or audio.
        #[arg(long, default_value = "pdf")]
        kind: String,
    },
    /// Ask a one-shot question against the active documents.
    Ask {
        /// The question.
        #[arg(long)]
        question: String,

        /// Active document names, comma separated or repeated.
        #[arg(long = "active", value_delimiter = ',')]
        active: Vec<String>,
    },
    /// Hold a conversation over the active documents.
    Chat {
        /// Active document names, comma separated or repeated.
        #[arg(long = "active", value_delimiter = ',')]
        active: Vec<String>,
    },
    /// Remove a document's vectors from the index.
    Remove {
        /// Document name as it was ingested.
        #[arg(long)]
        name: String,
    },
    /// Show index statistics.
    Stats,
}

fn parse_kind(kind: &str) -> anyhow::Result<DocumentKind> {
    match kind {
        "pdf" => Ok(DocumentKind::Pdf),
        "audio" => Ok(DocumentKind::Audio),
        other => anyhow::bail!("unknown document kind: {other} (expected pdf or audio)"),
    }
}

fn discover_text_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_text = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md"));

        if is_text {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn print_sources(sources: &[Source]) {
    for source in sources {
        match source {
            Source::Scored { file_name, score } => {
                println!("  source={file_name} score={score:.4}");
            }
            Source::Overview {
                file_name,
                relevance,
                excerpts,
            } => {
                println!("  source={file_name} relevance={relevance} excerpts={excerpts}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let embedder = OpenAiEmbedder::new(&cli.openai_api_key)?;
    let index = PineconeIndex::new(
        &cli.pinecone_host,
        &cli.pinecone_api_key,
        EMBEDDING_DIMENSIONS,
    )?;
    let model = OpenAiChatModel::new(&cli.openai_api_key, &cli.chat_model);
    let engine = Engine::new(embedder, index, model, EngineOptions::default());

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-answer boot"
    );

    match cli.command {
        Command::Ingest { path, kind } => {
            let kind = parse_kind(&kind)?;
            let files = if path.is_dir() {
                discover_text_files(&path)
            } else {
                vec![path.clone()]
            };

            if files.is_empty() {
                anyhow::bail!("no text files found under {}", path.display());
            }

            for file in files {
                let name = file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", file.display()))?;
                let text = tokio::fs::read_to_string(&file).await?;

                let meta = DocumentMeta {
                    kind,
                    page_count: None,
                    duration_secs: None,
                };
                let report = engine.ingest_document(&name, &text, &meta).await;

                if let Some(warning) = &report.index_warning {
                    warn!(document = %name, warning, "indexing degraded");
                }
                println!(
                    "{}: {} chunks, {} vectors, {} failed",
                    report.document_id, report.chunk_count, report.vector_count, report.failed_chunks
                );
            }
        }
        Command::Ask { question, active } => {
            let response = engine.handle_query(&question, &active).await;
            println!("{}", response.answer);
            print_sources(&response.sources);
        }
        Command::Chat { active } => {
            let mut turns: Vec<ChatTurn> = Vec::new();
            let stdin = io::stdin();

            loop {
                print!("> ");
                io::stdout().flush()?;

                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let message = line.trim();
                if message.is_empty() || message == "exit" || message == "quit" {
                    break;
                }

                let response = engine.handle_chat_turn(message, &turns, &active).await;
                println!("{}", response.message);
                print_sources(&response.sources);

                turns.push(ChatTurn::user(message));
                turns.push(ChatTurn::assistant(
                    response.message.clone(),
                    response.sources.clone(),
                ));
            }
        }
        Command::Remove { name } => {
            engine.remove_document(&name).await?;
            println!("removed {name}");
        }
        Command::Stats => {
            let stats = engine.index_stats().await?;
            println!(
                "records={} dimension={} fullness={:.4}",
                stats.total_records, stats.dimension, stats.fullness
            );
        }
    }

    Ok(())
}
