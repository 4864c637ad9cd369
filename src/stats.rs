//! Corpus and query statistics.
//!
//! Gives a quick overview of what's ingested and how queries are
//! performing: document counts by type, stored chunk totals, query volume
//! and average latency, and recent activity. Served as JSON by the HTTP
//! API and printed as a table by `finq stats`.

use anyhow::Result;
use serde::Serialize;
use sqlx::Row;
use std::collections::BTreeMap;

use crate::services::Services;

#[derive(Debug, Serialize)]
pub struct Analytics {
    pub documents: DocumentStats,
    pub chunks: ChunkStats,
    pub queries: QueryStats,
}

#[derive(Debug, Serialize)]
pub struct DocumentStats {
    pub total: i64,
    pub by_type: BTreeMap<String, i64>,
    pub recent: Vec<RecentDocument>,
}

#[derive(Debug, Serialize)]
pub struct ChunkStats {
    /// Chunk embeddings currently stored across all documents.
    pub stored: i64,
}

#[derive(Debug, Serialize)]
pub struct QueryStats {
    pub total: i64,
    pub average_processing_secs: f64,
    pub recent: Vec<RecentQuery>,
}

#[derive(Debug, Serialize)]
pub struct RecentDocument {
    pub id: String,
    pub title: String,
    pub doc_type: String,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct RecentQuery {
    pub query_text: String,
    pub processing_secs: f64,
    pub created_at: i64,
}

/// Gather the full analytics payload.
pub async fn collect_stats(services: &Services) -> Result<Analytics> {
    let pool = &services.pool;

    let total_documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;

    let by_type_rows = sqlx::query(
        "SELECT doc_type, COUNT(*) AS doc_count FROM documents GROUP BY doc_type ORDER BY doc_type",
    )
    .fetch_all(pool)
    .await?;
    let by_type: BTreeMap<String, i64> = by_type_rows
        .iter()
        .map(|row| (row.get("doc_type"), row.get("doc_count")))
        .collect();

    let recent_documents = sqlx::query(
        "SELECT id, title, doc_type, created_at FROM documents ORDER BY created_at DESC, id LIMIT 5",
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| RecentDocument {
        id: row.get("id"),
        title: row.get("title"),
        doc_type: row.get("doc_type"),
        created_at: row.get("created_at"),
    })
    .collect();

    let stored_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_embeddings")
        .fetch_one(pool)
        .await?;

    let total_queries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_history")
        .fetch_one(pool)
        .await?;

    let average_processing_secs: f64 =
        sqlx::query_scalar("SELECT COALESCE(AVG(processing_secs), 0.0) FROM query_history")
            .fetch_one(pool)
            .await?;

    let recent_queries = sqlx::query(
        "SELECT query_text, processing_secs, created_at FROM query_history ORDER BY created_at DESC, id DESC LIMIT 5",
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| RecentQuery {
        query_text: row.get("query_text"),
        processing_secs: row.get("processing_secs"),
        created_at: row.get("created_at"),
    })
    .collect();

    Ok(Analytics {
        documents: DocumentStats {
            total: total_documents,
            by_type,
            recent: recent_documents,
        },
        chunks: ChunkStats {
            stored: stored_chunks,
        },
        queries: QueryStats {
            total: total_queries,
            average_processing_secs,
            recent: recent_queries,
        },
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(services: &Services) -> Result<()> {
    let stats = collect_stats(services).await?;

    println!("Finsight — Corpus Stats");
    println!("=======================");
    println!();
    println!("  Documents:   {}", stats.documents.total);
    println!("  Chunks:      {}", stats.chunks.stored);
    println!("  Queries:     {}", stats.queries.total);
    println!(
        "  Avg latency: {:.3}s",
        stats.queries.average_processing_secs
    );

    if !stats.documents.by_type.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<20} {:>6}", "TYPE", "DOCS");
        println!("  {}", "-".repeat(28));
        for (doc_type, count) in &stats.documents.by_type {
            println!("  {:<20} {:>6}", doc_type, count);
        }
    }

    if !stats.queries.recent.is_empty() {
        println!();
        println!("  Recent queries:");
        for q in &stats.queries.recent {
            println!("    [{:.3}s] {}", q.processing_secs, q.query_text);
        }
    }

    println!();
    Ok(())
}
