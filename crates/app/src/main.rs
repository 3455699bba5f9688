use chrono::Utc;
use clap::{Parser, Subcommand};
use librarian_core::{
    discover_pdf_files, shared_client, ChatEngine, ChatSession, ChunkIndex, ChunkingConfig,
    DocumentExtractor, DocumentIngestor, DocumentUpload, HybridRetriever, OllamaConfig,
    OpenSearchIndex, RetrievalSettings,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "librarian", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenSearch base URL
    #[arg(long, env = "OPENSEARCH_URL", default_value = "http://localhost:9200")]
    opensearch_url: String,

    /// OpenSearch index name
    #[arg(long, env = "OPENSEARCH_INDEX", default_value = "documents")]
    index: String,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Chat model served by Ollama
    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama3.1")]
    chat_model: String,

    /// Embedding model served by Ollama
    #[arg(long, env = "OLLAMA_EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    embedding_model: String,

    /// Dimension of the embedding vectors
    #[arg(long, env = "EMBEDDING_DIMENSION", default_value = "768")]
    embedding_dimension: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Index PDF files, or a folder of PDFs, into the document library.
    Ingest {
        /// PDF files to index.
        files: Vec<PathBuf>,
        /// Folder to scan recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// List the names of all indexed documents.
    List,
    /// Delete every chunk of one document.
    Delete {
        /// Document name as printed by `list`.
        #[arg(long)]
        name: String,
    },
    /// Run a one-off retrieval query against the library.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of chunks to return.
        #[arg(long, default_value = "10")]
        top_k: usize,
        /// Search by keywords only, without embedding the query.
        #[arg(long, default_value_t = false)]
        lexical: bool,
    },
    /// Chat with the indexed documents.
    Chat {
        /// Retrieve by keywords only for this session.
        #[arg(long, default_value_t = false)]
        no_hybrid: bool,
        /// Number of chunks in the context window.
        #[arg(long, default_value = "10")]
        num_results: usize,
        /// Sampling temperature.
        #[arg(long, default_value = "0.7")]
        temperature: f32,
        /// Ask the model to answer without its reasoning pass.
        #[arg(long, default_value_t = false)]
        no_think: bool,
        /// Seconds to wait for each response fragment.
        #[arg(long, default_value = "120")]
        read_timeout: u64,
        /// Replace the built-in system instructions.
        #[arg(long)]
        system_prompt: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let index = OpenSearchIndex::new(&cli.opensearch_url, &cli.index, cli.embedding_dimension)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let ollama = OllamaConfig {
        endpoint: cli.ollama_url.clone(),
        chat_model: cli.chat_model.clone(),
        embedding_model: cli.embedding_model.clone(),
        embedding_dimension: cli.embedding_dimension,
    };

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "librarian boot"
    );

    match cli.command {
        Command::Ingest { files, folder } => {
            let mut paths = files;
            if let Some(folder) = folder {
                paths.extend(discover_pdf_files(&folder));
            }
            if paths.is_empty() {
                anyhow::bail!("nothing to ingest: pass PDF files or --folder");
            }

            let mut uploads = Vec::new();
            for path in &paths {
                match DocumentUpload::from_path(path) {
                    Ok(upload) => uploads.push(upload),
                    Err(error) => {
                        warn!(path = %path.display(), reason = %error, "skipping unreadable file");
                    }
                }
            }

            let client = shared_client(&ollama)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let ingestor = DocumentIngestor::new(
                DocumentExtractor,
                index,
                client.clone(),
                ChunkingConfig::default(),
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let report = ingestor
                .ingest_batch(&uploads)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for outcome in &report.completed {
                println!(
                    "{}: {} chunks indexed (sha256 {})",
                    outcome.document_name,
                    outcome.chunks_indexed,
                    &outcome.checksum[..12]
                );
                for failure in &outcome.failures {
                    warn!(doc_id = %failure.doc_id, cause = %failure.cause, "chunk rejected");
                }
            }
            for skipped in &report.skipped {
                println!("{}: skipped ({})", skipped.document_name, skipped.reason);
            }
            println!(
                "{} of {} documents ingested at {}",
                report.completed.len(),
                uploads.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::List => {
            index
                .ensure_index()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let names = index
                .list_document_names()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if names.is_empty() {
                println!("no documents indexed");
            }
            for name in names {
                println!("{name}");
            }
        }
        Command::Delete { name } => {
            index
                .ensure_index()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let deleted = index
                .delete_by_document_name(&name)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("deleted {deleted} chunks of {name}");
        }
        Command::Search {
            query,
            top_k,
            lexical,
        } => {
            index
                .ensure_index()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let embedder = if lexical {
                None
            } else {
                match shared_client(&ollama).await {
                    Ok(client) => Some(client.clone()),
                    Err(error) => {
                        warn!(reason = %error, "embedding backend unavailable, searching by keywords");
                        None
                    }
                }
            };

            let retriever = HybridRetriever::new(index, embedder);
            let settings = RetrievalSettings {
                use_hybrid_search: !lexical,
                num_results: top_k,
                ..RetrievalSettings::default()
            };

            let chunks = retriever
                .retrieve(&query, &settings)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if chunks.is_empty() {
                println!("no matches");
            }
            for chunk in chunks {
                println!(
                    "[{:.4}] {} ({})",
                    chunk.score, chunk.doc_id, chunk.document_name
                );
                println!("  {}", chunk.text);
            }
        }
        Command::Chat {
            no_hybrid,
            num_results,
            temperature,
            no_think,
            read_timeout,
            system_prompt,
        } => {
            let settings = RetrievalSettings {
                use_hybrid_search: !no_hybrid,
                num_results,
                temperature,
                show_reasoning: !no_think,
            };
            settings
                .validate()
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            index
                .ensure_index()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let client = shared_client(&ollama)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let retriever = HybridRetriever::new(index, Some(client.clone()));
            let mut engine = ChatEngine::new(retriever, client.clone())
                .with_read_timeout(Duration::from_secs(read_timeout));
            if let Some(prompt) = system_prompt {
                engine = engine.with_system_prompt(prompt);
            }
            let mut session = ChatSession::new();

            println!("chatting with the document library (empty line to exit)");

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                print!("> ");
                std::io::stdout().flush()?;

                let line = match lines.next_line().await? {
                    Some(line) => line,
                    None => break,
                };
                let prompt = line.trim().to_string();
                if prompt.is_empty() {
                    break;
                }

                let mut stream = match engine.send(&mut session, &prompt, &settings).await {
                    Ok(stream) => stream,
                    Err(error) => {
                        println!("cannot send that: {error}");
                        continue;
                    }
                };

                loop {
                    match stream.next_fragment().await {
                        Ok(Some(fragment)) => {
                            print!("{fragment}");
                            std::io::stdout().flush()?;
                        }
                        Ok(None) => break,
                        Err(error) => {
                            warn!(reason = %error, "response interrupted");
                            println!();
                            if stream.is_truncated() {
                                println!("[response truncated: {error}]");
                            } else {
                                println!("[no response: {error}]");
                            }
                            break;
                        }
                    }
                }
                println!();
            }
        }
    }

    Ok(())
}
