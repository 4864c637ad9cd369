//! # Finsight CLI (`finq`)
//!
//! The `finq` binary is the primary interface for Finsight. It provides
//! commands for database initialization, document ingestion, retrieval,
//! question answering, and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! finq --config ./config/finq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `finq init` | Create the SQLite database and run schema migrations |
//! | `finq ingest <file>` | Ingest a document (txt, md, pdf, docx) |
//! | `finq list` | List ingested documents |
//! | `finq get <id>` | Print a document and its chunks |
//! | `finq delete <id>` | Delete a document and its embeddings |
//! | `finq query "<text>"` | Ask a question over the corpus |
//! | `finq history` | Show recent query records |
//! | `finq stats` | Corpus and query statistics |
//! | `finq serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! finq init --config ./config/finq.toml
//!
//! # Ingest a bank statement, overriding type detection
//! finq ingest march.pdf --doc-type bank_statement
//!
//! # Ask a question restricted to tax documents
//! finq query "how much federal tax was withheld?" --doc-type tax
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use finsight::models::DocumentType;
use finsight::services::Services;
use finsight::{config, documents, ingest, logging, migrate, query, server, stats};

/// Finsight — a retrieval-augmented question answering engine for
/// financial documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/finq.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "finq",
    about = "Finsight — retrieval-augmented question answering over financial documents",
    version,
    long_about = "Finsight ingests financial documents (txt, md, pdf, docx), chunks and embeds \
    them, and answers natural-language questions by retrieving the most relevant chunks and \
    feeding them to a text-generation model. Exposes a CLI and a JSON HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/finq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunk_embeddings, query_history). Idempotent.
    Init,

    /// Ingest a document from disk.
    ///
    /// Validates, deduplicates, extracts text, classifies, chunks, and
    /// embeds the file. A chunk whose embedding fails is skipped; the
    /// document still completes.
    Ingest {
        /// Path to the document (txt, md, pdf, docx).
        file: PathBuf,

        /// Skip type detection and use this type
        /// (bank_statement, credit_card, investment, tax, unknown).
        #[arg(long)]
        doc_type: Option<String>,
    },

    /// List ingested documents.
    List {
        /// Only show documents of this type.
        #[arg(long)]
        doc_type: Option<String>,
    },

    /// Print a document and its stored chunks.
    Get {
        /// Document UUID.
        id: String,
    },

    /// Delete a document and its embeddings.
    Delete {
        /// Document UUID.
        id: String,
    },

    /// Ask a question over the ingested corpus.
    Query {
        /// The question text.
        text: String,

        /// Restrict retrieval to documents of this type.
        #[arg(long)]
        doc_type: Option<String>,

        /// Maximum number of chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show recent query records.
    History {
        /// Maximum number of records to show.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Corpus and query statistics.
    Stats,

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// JSON API endpoints.
    Serve,
}

fn parse_doc_type(s: &str) -> Result<DocumentType> {
    DocumentType::parse(s).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown document type '{}': expected bank_statement, credit_card, investment, tax, or unknown",
            s
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let services = Services::from_config(cfg).await?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Ingest { file, doc_type } => {
            let doc_type = doc_type.as_deref().map(parse_doc_type).transpose()?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("invalid file path: {}", file.display()))?
                .to_string();
            let bytes = std::fs::read(&file)?;

            let receipt = ingest::ingest_document(&services, &filename, &bytes, doc_type).await?;

            println!("ingest {}", receipt.title);
            println!("  document id: {}", receipt.document_id);
            println!("  type:        {}", receipt.doc_type);
            println!("  status:      {}", receipt.status);
            println!(
                "  chunks:      {} ({} embedded)",
                receipt.chunk_count, receipt.embedded_chunks
            );
            println!("ok");
        }
        Commands::List { doc_type } => {
            let doc_type = doc_type.as_deref().map(parse_doc_type).transpose()?;
            let docs = documents::list_documents(&services, doc_type).await?;

            if docs.is_empty() {
                println!("No documents.");
            } else {
                println!(
                    "{:<36}  {:<14}  {:<10}  {:>6}  {}",
                    "ID", "TYPE", "STATUS", "CHUNKS", "TITLE"
                );
                println!("{}", "-".repeat(90));
                for doc in &docs {
                    println!(
                        "{:<36}  {:<14}  {:<10}  {:>6}  {}",
                        doc.id, doc.doc_type, doc.status, doc.processed_chunks, doc.title
                    );
                }
            }
        }
        Commands::Get { id } => {
            let detail = documents::get_document(&services, &id).await?;
            let doc = &detail.document;

            println!("--- Document ---");
            println!("id:           {}", doc.id);
            println!("title:        {}", doc.title);
            println!("type:         {}", doc.doc_type);
            println!("status:       {}", doc.status);
            println!("file size:    {} bytes", doc.file_size);
            println!("word count:   {}", doc.word_count);
            println!("content hash: {}", doc.content_hash);
            println!();

            if let Some(body) = &doc.body {
                println!("--- Body ---");
                println!("{}", body);
                println!();
            }

            println!("--- Chunks ({}) ---", detail.chunks.len());
            for chunk in &detail.chunks {
                println!("[chunk {}]", chunk.chunk_index);
                println!("{}", chunk.text);
                println!();
            }
        }
        Commands::Delete { id } => {
            documents::delete_document(&services, &id).await?;
            println!("Deleted document {}.", id);
        }
        Commands::Query {
            text,
            doc_type,
            top_k,
        } => {
            let doc_type = doc_type.as_deref().map(parse_doc_type).transpose()?;
            let outcome = query::run_query(&services, &text, doc_type, top_k).await?;

            println!("{}", outcome.answer);
            if !outcome.relevant_documents.is_empty() {
                println!();
                println!("Sources ({}):", outcome.relevant_documents.len());
                for (i, source) in outcome.relevant_documents.iter().enumerate() {
                    println!(
                        "  {}. [{:.2}] {} ({})",
                        i + 1,
                        source.relevance,
                        source.title,
                        source.document_type
                    );
                    println!("     \"{}\"", source.excerpt.replace('\n', " "));
                }
            }
            println!();
            println!("(processed in {:.3}s)", outcome.processing_secs);
        }
        Commands::History { limit } => {
            let records = query::fetch_history(&services, limit).await?;

            if records.is_empty() {
                println!("No queries recorded.");
            }
            for record in &records {
                let date = chrono::DateTime::from_timestamp(record.created_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("[{}] ({:.3}s)", date, record.processing_secs);
                println!("  Q: {}", record.query_text);
                println!("  A: {}", record.answer.replace('\n', " "));
                println!();
            }
        }
        Commands::Stats => {
            stats::run_stats(&services).await?;
        }
        Commands::Serve => {
            server::run_server(services).await?;
            return Ok(());
        }
    }

    services.close().await;
    Ok(())
}
