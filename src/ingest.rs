//! Ingestion pipeline orchestration.
//!
//! Drives an uploaded document through validation, deduplication, text
//! extraction, type classification, chunking, and per-chunk embedding.
//! Each document moves `processing → completed` or `processing → failed`;
//! a chunk whose embedding fails is logged and skipped, never failing the
//! document. Only validation and persistence faults are document-level.
//!
//! Deduplication is enforced by the UNIQUE constraint on
//! `documents.content_hash`: the pre-check gives a fast rejection, and the
//! insert itself settles any concurrent race.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::classify;
use crate::embedding::{vec_to_blob, EmbeddingProvider};
use crate::extract::{self, ExtractError};
use crate::models::{ChunkEmbedding, DocumentType, ProcessingStatus};
use crate::services::Services;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file type not allowed: .{0}")]
    ExtensionNotAllowed(String),
    #[error("no usable file extension on '{0}'")]
    MissingExtension(String),
    #[error("file too large: {size} bytes (maximum {max})")]
    FileTooLarge { size: usize, max: usize },
    #[error("this file has already been uploaded")]
    Duplicate,
    #[error("no text content found in file")]
    EmptyText,
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for IngestError {
    fn from(e: sqlx::Error) -> Self {
        IngestError::Internal(e.into())
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestReceipt {
    pub document_id: String,
    pub title: String,
    pub doc_type: DocumentType,
    pub status: ProcessingStatus,
    /// Chunks produced by the chunker.
    pub chunk_count: usize,
    /// Chunks successfully embedded and stored. Always ≤ `chunk_count`.
    pub embedded_chunks: usize,
}

/// Ingest one uploaded document.
///
/// `doc_type_override` bypasses classification. Chunk embedding is strictly
/// sequential; a chunk is only requested after the previous one resolved.
pub async fn ingest_document(
    services: &Services,
    filename: &str,
    bytes: &[u8],
    doc_type_override: Option<DocumentType>,
) -> Result<IngestReceipt, IngestError> {
    let config = &services.config;
    let pool = &services.pool;

    tracing::info!(filename, size = bytes.len(), "starting document ingestion");

    // 1. Validate before any further work.
    let extension = extract::file_extension(filename)
        .ok_or_else(|| IngestError::MissingExtension(filename.to_string()))?;
    if !config.upload.allowed_extensions.contains(&extension) {
        return Err(IngestError::ExtensionNotAllowed(extension));
    }
    if bytes.len() > config.upload.max_file_size {
        return Err(IngestError::FileTooLarge {
            size: bytes.len(),
            max: config.upload.max_file_size,
        });
    }

    // 2. Content hash; fast duplicate rejection.
    let content_hash = format!("{:x}", Sha256::digest(bytes));
    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM documents WHERE content_hash = ?")
            .bind(&content_hash)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Err(IngestError::Duplicate);
    }

    // 3. Extract text.
    let text = extract::extract_text(bytes, &extension)?;
    if text.trim().is_empty() {
        return Err(IngestError::EmptyText);
    }

    // 4. Resolve document type.
    let doc_type = match doc_type_override {
        Some(t) => t,
        None => classify::classify(services.completions.as_ref(), &text).await,
    };
    tracing::info!(filename, doc_type = %doc_type, "resolved document type");

    // 5. Persist the document in `processing` status. The UNIQUE constraint
    //    on content_hash settles concurrent duplicate uploads here.
    let document_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();
    let word_count = text.split_whitespace().count() as i64;

    let insert = sqlx::query(
        r#"
        INSERT INTO documents
            (id, title, body, file_size, content_hash, doc_type, word_count, status, processed_chunks, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&document_id)
    .bind(filename)
    .bind(&text)
    .bind(bytes.len() as i64)
    .bind(&content_hash)
    .bind(doc_type.as_str())
    .bind(word_count)
    .bind(ProcessingStatus::Processing.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    if let Err(e) = insert {
        if e.as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            return Err(IngestError::Duplicate);
        }
        return Err(e.into());
    }

    // 6–7. Chunk, embed sequentially, persist. Failures past this point are
    //      document-level: mark the row failed and surface an internal error.
    let chunks = chunk_text(&text, &config.chunking);
    tracing::info!(filename, chunk_count = chunks.len(), "chunked document");

    match embed_and_store(pool, services.embeddings.as_ref(), &document_id, &chunks).await {
        Ok(embedded_chunks) => {
            sqlx::query(
                "UPDATE documents SET processed_chunks = ?, status = ?, updated_at = ? WHERE id = ?",
            )
            .bind(embedded_chunks as i64)
            .bind(ProcessingStatus::Completed.as_str())
            .bind(chrono::Utc::now().timestamp())
            .bind(&document_id)
            .execute(pool)
            .await?;

            tracing::info!(
                filename,
                document_id,
                embedded_chunks,
                total_chunks = chunks.len(),
                "ingestion completed"
            );

            Ok(IngestReceipt {
                document_id,
                title: filename.to_string(),
                doc_type,
                status: ProcessingStatus::Completed,
                chunk_count: chunks.len(),
                embedded_chunks,
            })
        }
        Err(e) => {
            tracing::error!(filename, document_id, error = %e, "ingestion failed");
            let _ = sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
                .bind(ProcessingStatus::Failed.as_str())
                .bind(chrono::Utc::now().timestamp())
                .bind(&document_id)
                .execute(pool)
                .await;
            Err(IngestError::Internal(e))
        }
    }
}

/// Embed each chunk in order and store the successes. Returns the number of
/// chunks embedded; an embedding failure skips that chunk, while a storage
/// failure aborts (the caller marks the document failed).
async fn embed_and_store(
    pool: &SqlitePool,
    embeddings: &dyn EmbeddingProvider,
    document_id: &str,
    chunks: &[String],
) -> anyhow::Result<usize> {
    let mut embedded = 0usize;

    for (index, chunk) in chunks.iter().enumerate() {
        let vector = match embeddings.embed(chunk).await {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => {
                tracing::warn!(document_id, chunk_index = index, "empty embedding; skipping chunk");
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    document_id,
                    chunk_index = index,
                    error = %e,
                    "embedding failed; skipping chunk"
                );
                continue;
            }
        };

        let record = ChunkEmbedding {
            document_id: document_id.to_string(),
            chunk_index: index as i64,
            text: chunk.clone(),
            char_len: chunk.chars().count() as i64,
            embedding: vector,
        };

        sqlx::query(
            r#"
            INSERT INTO chunk_embeddings (document_id, chunk_index, text, char_len, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.document_id)
        .bind(record.chunk_index)
        .bind(&record.text)
        .bind(record.char_len)
        .bind(vec_to_blob(&record.embedding))
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await?;

        embedded += 1;
    }

    Ok(embedded)
}
