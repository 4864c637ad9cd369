//! Core data models used throughout Finsight.
//!
//! These types represent the documents, chunk embeddings, and query records
//! that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Category assigned to an ingested document.
///
/// Detection is best-effort (keyword heuristics with a model fallback);
/// callers must tolerate misclassification and may override at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    BankStatement,
    CreditCard,
    Investment,
    Tax,
    Unknown,
}

impl DocumentType {
    /// Stable string form used in the database and API.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::BankStatement => "bank_statement",
            DocumentType::CreditCard => "credit_card",
            DocumentType::Investment => "investment",
            DocumentType::Tax => "tax",
            DocumentType::Unknown => "unknown",
        }
    }

    /// Parse the stable string form. Unrecognized labels map to `None`
    /// so callers can distinguish "bad input" from an explicit `unknown`.
    pub fn parse(s: &str) -> Option<DocumentType> {
        match s {
            "bank_statement" => Some(DocumentType::BankStatement),
            "credit_card" => Some(DocumentType::CreditCard),
            "investment" => Some(DocumentType::Investment),
            "tax" => Some(DocumentType::Tax),
            "unknown" => Some(DocumentType::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a document through the ingestion pipeline.
///
/// `pending → processing → completed | failed`. A document is never
/// mutated again once it reaches `completed` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<ProcessingStatus> {
        match s {
            "pending" => Some(ProcessingStatus::Pending),
            "processing" => Some(ProcessingStatus::Processing),
            "completed" => Some(ProcessingStatus::Completed),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingested document as stored in SQLite.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Extracted plain text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Byte length of the uploaded file.
    pub file_size: i64,
    /// SHA-256 hex digest of the raw upload bytes. Unique across documents.
    pub content_hash: String,
    pub doc_type: DocumentType,
    pub word_count: i64,
    pub status: ProcessingStatus,
    /// Chunks that were successfully embedded and stored.
    pub processed_chunks: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One embedded chunk of a document. Owned by its document; removed with it.
#[derive(Debug, Clone)]
pub struct ChunkEmbedding {
    pub document_id: String,
    /// Position within the document, assigned in chunking order. A chunk
    /// whose embedding failed leaves a gap in the stored sequence.
    pub chunk_index: i64,
    pub text: String,
    /// Character count of `text`.
    pub char_len: i64,
    pub embedding: Vec<f32>,
}

/// A ranked retrieval hit returned by the similarity engine.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub title: String,
    pub doc_type: DocumentType,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub similarity: f32,
}

/// Summary of a source document attached to a query answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub title: String,
    pub document_type: String,
    pub relevance: f32,
    /// First ≤200 characters of the chunk, `...`-suffixed when truncated.
    pub excerpt: String,
}

/// Append-only record of one answered (or failed) query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    pub id: i64,
    pub query_text: String,
    pub answer: String,
    pub relevant_documents: Vec<DocumentSummary>,
    pub processing_secs: f64,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_round_trip() {
        for ty in [
            DocumentType::BankStatement,
            DocumentType::CreditCard,
            DocumentType::Investment,
            DocumentType::Tax,
            DocumentType::Unknown,
        ] {
            assert_eq!(DocumentType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(DocumentType::parse("receipt"), None);
    }

    #[test]
    fn test_status_round_trip() {
        for st in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(ProcessingStatus::parse(st.as_str()), Some(st));
        }
        assert_eq!(ProcessingStatus::parse("done"), None);
    }
}
