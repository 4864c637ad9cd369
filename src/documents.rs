//! Document listing, retrieval, and deletion.
//!
//! Fetches stored documents and their chunks; deletion removes the
//! document row and cascades to its chunk embeddings. A missing id is a
//! distinct not-found signal, never a generic failure.

use anyhow::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use crate::models::{Document, DocumentType, ProcessingStatus};
use crate::services::Services;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for DocumentError {
    fn from(e: sqlx::Error) -> Self {
        DocumentError::Internal(e.into())
    }
}

/// A stored chunk as returned to callers (vector omitted).
#[derive(Debug, Clone, Serialize)]
pub struct StoredChunk {
    pub chunk_index: i64,
    pub text: String,
    pub char_len: i64,
}

/// A document together with its stored chunks.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentWithChunks {
    #[serde(flatten)]
    pub document: Document,
    pub chunks: Vec<StoredChunk>,
}

fn row_to_document(row: &SqliteRow, include_body: bool) -> Document {
    let doc_type: String = row.get("doc_type");
    let status: String = row.get("status");
    Document {
        id: row.get("id"),
        title: row.get("title"),
        body: if include_body {
            Some(row.get("body"))
        } else {
            None
        },
        file_size: row.get("file_size"),
        content_hash: row.get("content_hash"),
        doc_type: DocumentType::parse(&doc_type).unwrap_or(DocumentType::Unknown),
        word_count: row.get("word_count"),
        status: ProcessingStatus::parse(&status).unwrap_or(ProcessingStatus::Failed),
        processed_chunks: row.get("processed_chunks"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const DOCUMENT_COLUMNS: &str = "id, title, body, file_size, content_hash, doc_type, word_count, status, processed_chunks, created_at, updated_at";

/// List documents, newest first, optionally filtered by type. Bodies are
/// omitted from listings.
pub async fn list_documents(
    services: &Services,
    doc_type: Option<DocumentType>,
) -> Result<Vec<Document>> {
    let rows = match doc_type {
        Some(ty) => {
            sqlx::query(&format!(
                "SELECT {} FROM documents WHERE doc_type = ? ORDER BY created_at DESC, id",
                DOCUMENT_COLUMNS
            ))
            .bind(ty.as_str())
            .fetch_all(&services.pool)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {} FROM documents ORDER BY created_at DESC, id",
                DOCUMENT_COLUMNS
            ))
            .fetch_all(&services.pool)
            .await?
        }
    };

    Ok(rows.iter().map(|r| row_to_document(r, false)).collect())
}

/// Fetch one document with its chunks, ordered by chunk index.
pub async fn get_document(
    services: &Services,
    id: &str,
) -> Result<DocumentWithChunks, DocumentError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM documents WHERE id = ?",
        DOCUMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&services.pool)
    .await?
    .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;

    let document = row_to_document(&row, true);

    let chunk_rows = sqlx::query(
        "SELECT chunk_index, text, char_len FROM chunk_embeddings WHERE document_id = ? ORDER BY chunk_index ASC",
    )
    .bind(id)
    .fetch_all(&services.pool)
    .await?;

    let chunks = chunk_rows
        .iter()
        .map(|row| StoredChunk {
            chunk_index: row.get("chunk_index"),
            text: row.get("text"),
            char_len: row.get("char_len"),
        })
        .collect();

    Ok(DocumentWithChunks { document, chunks })
}

/// Delete a document; its chunk embeddings go with it (ON DELETE CASCADE).
pub async fn delete_document(services: &Services, id: &str) -> Result<(), DocumentError> {
    let result = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(&services.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DocumentError::NotFound(id.to_string()));
    }

    tracing::info!(document_id = id, "deleted document and its embeddings");
    Ok(())
}
