//! HTTP JSON API.
//!
//! Thin glue over the core pipeline: routes deserialize requests, call into
//! [`ingest`](crate::ingest), [`query`](crate::query),
//! [`documents`](crate::documents), and [`stats`](crate::stats), and map
//! typed errors onto HTTP statuses.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/documents/upload` | Multipart upload (`file`, optional `document_type`) |
//! | `GET`  | `/documents` | List documents (`?document_type=` filter) |
//! | `GET`  | `/documents/{id}` | One document with its chunks |
//! | `DELETE` | `/documents/{id}` | Delete a document and its embeddings |
//! | `POST` | `/query` | Ask a question over the corpus |
//! | `GET`  | `/history` | Recent query records (`?limit=`) |
//! | `GET`  | `/stats` | Corpus and query analytics |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one body shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "file type not allowed: .zip" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::documents::{self, DocumentError};
use crate::ingest::{self, IngestError};
use crate::models::DocumentType;
use crate::query;
use crate::services::Services;
use crate::stats;

/// Starts the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(services: Services) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let state = Arc::new(services);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // The framework's own body cap must sit above the configured upload
    // ceiling, with headroom for multipart framing.
    let body_limit = DefaultBodyLimit::max(state.config.upload.max_file_size + 64 * 1024);

    let app = Router::new()
        .route("/documents/upload", post(handle_upload))
        .route("/documents", get(handle_list_documents))
        .route(
            "/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/query", post(handle_query))
        .route("/history", get(handle_history))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(body_limit)
        .with_state(state);

    println!("Finsight API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match &e {
            IngestError::Internal(_) => {
                tracing::error!(error = %e, "ingestion failed");
                internal("internal error during ingestion")
            }
            _ => bad_request(e.to_string()),
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(e: DocumentError) -> Self {
        match &e {
            DocumentError::NotFound(_) => not_found(e.to_string()),
            DocumentError::Internal(_) => {
                tracing::error!(error = %e, "document operation failed");
                internal("internal error")
            }
        }
    }
}

fn parse_doc_type(s: &str) -> Result<DocumentType, AppError> {
    DocumentType::parse(s).ok_or_else(|| {
        bad_request(format!(
            "unknown document type '{}': expected bank_statement, credit_card, investment, tax, or unknown",
            s
        ))
    })
}

// ============ POST /documents/upload ============

async fn handle_upload(
    State(services): State<Arc<Services>>,
    mut multipart: Multipart,
) -> Result<Json<ingest::IngestReceipt>, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut doc_type_override: Option<DocumentType> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("failed to process form: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .ok_or_else(|| bad_request("file name not provided"))?
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read file data: {}", e)))?;
                file = Some((file_name, data.to_vec()));
            }
            Some("document_type") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("failed to read document_type: {}", e)))?;
                if !value.trim().is_empty() {
                    doc_type_override = Some(parse_doc_type(value.trim())?);
                }
            }
            _ => {}
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| bad_request("missing 'file' field"))?;

    let receipt = ingest::ingest_document(&services, &file_name, &bytes, doc_type_override).await?;
    Ok(Json(receipt))
}

// ============ GET /documents ============

#[derive(Deserialize)]
struct ListParams {
    document_type: Option<String>,
}

async fn handle_list_documents(
    State(services): State<Arc<Services>>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let doc_type = match params.document_type.as_deref() {
        Some(s) => Some(parse_doc_type(s)?),
        None => None,
    };

    let docs = documents::list_documents(&services, doc_type)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "listing documents failed");
            internal("internal error")
        })?;

    Ok(Json(serde_json::json!({ "documents": docs })))
}

// ============ GET /documents/{id} ============

async fn handle_get_document(
    State(services): State<Arc<Services>>,
    Path(id): Path<String>,
) -> Result<Json<documents::DocumentWithChunks>, AppError> {
    let detail = documents::get_document(&services, &id).await?;
    Ok(Json(detail))
}

// ============ DELETE /documents/{id} ============

async fn handle_delete_document(
    State(services): State<Arc<Services>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    documents::delete_document(&services, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query_text: String,
    document_type: Option<String>,
    top_k: Option<usize>,
}

async fn handle_query(
    State(services): State<Arc<Services>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<query::QueryOutcome>, AppError> {
    if request.query_text.trim().is_empty() {
        return Err(bad_request("query_text must not be empty"));
    }

    let doc_type = match request.document_type.as_deref() {
        Some(s) => Some(parse_doc_type(s)?),
        None => None,
    };

    let outcome = query::run_query(&services, &request.query_text, doc_type, request.top_k)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "query failed");
            internal("internal error during query")
        })?;

    Ok(Json(outcome))
}

// ============ GET /history ============

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
}

async fn handle_history(
    State(services): State<Arc<Services>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let records = query::fetch_history(&services, limit).await.map_err(|e| {
        tracing::error!(error = %e, "fetching history failed");
        internal("internal error")
    })?;

    Ok(Json(serde_json::json!({ "queries": records })))
}

// ============ GET /stats ============

async fn handle_stats(
    State(services): State<Arc<Services>>,
) -> Result<Json<stats::Analytics>, AppError> {
    let analytics = stats::collect_stats(&services).await.map_err(|e| {
        tracing::error!(error = %e, "collecting stats failed");
        internal("internal error")
    })?;
    Ok(Json(analytics))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
