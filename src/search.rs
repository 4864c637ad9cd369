//! Exact similarity search over stored chunk embeddings.
//!
//! Every query is an exhaustive cosine scan: all stored vectors matching
//! the optional document-type filter are fetched and compared in Rust,
//! O(N·D) per query. That is a deliberate design at this corpus scale —
//! there is no approximate index, and result order is fully deterministic:
//! descending similarity, with exact ties kept in scan (insertion) order.

use anyhow::Result;
use sqlx::Row;

use crate::embedding::{blob_to_vec, cosine_similarity};
use crate::models::{DocumentType, SearchHit};
use crate::services::Services;

/// A stored chunk vector joined with its document metadata, in scan order.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub document_id: String,
    pub title: String,
    pub doc_type: DocumentType,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Rank candidates against a query vector.
///
/// Keeps candidates scoring strictly above `threshold`, sorts descending
/// by similarity (stable, so ties preserve scan order), and returns at
/// most `limit` hits.
pub fn rank_chunks(
    query_vec: &[f32],
    candidates: Vec<ChunkCandidate>,
    threshold: f32,
    limit: usize,
) -> Vec<SearchHit> {
    let mut scored: Vec<(ChunkCandidate, f32)> = candidates
        .into_iter()
        .map(|c| {
            let similarity = cosine_similarity(query_vec, &c.embedding);
            (c, similarity)
        })
        .filter(|(_, similarity)| *similarity > threshold)
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);

    scored
        .into_iter()
        .map(|(c, similarity)| SearchHit {
            document_id: c.document_id,
            title: c.title,
            doc_type: c.doc_type,
            chunk_index: c.chunk_index,
            chunk_text: c.text,
            similarity,
        })
        .collect()
}

/// Embed the query and scan all stored chunks for the `top_k` most similar.
///
/// A failed query embedding degrades to an empty result set — retrieval
/// has nothing to rank, which the caller reports as "no relevant
/// information" rather than an error.
pub async fn search_similar_chunks(
    services: &Services,
    query: &str,
    top_k: usize,
    doc_type: Option<DocumentType>,
) -> Result<Vec<SearchHit>> {
    let query_vec = match services.embeddings.embed(query).await {
        Ok(v) if !v.is_empty() => v,
        Ok(_) => {
            tracing::warn!("query embedding was empty; returning no results");
            return Ok(Vec::new());
        }
        Err(e) => {
            tracing::warn!(error = %e, "query embedding failed; returning no results");
            return Ok(Vec::new());
        }
    };

    let candidates = fetch_candidates(services, doc_type).await?;
    tracing::debug!(candidates = candidates.len(), "scanning stored vectors");

    Ok(rank_chunks(
        &query_vec,
        candidates,
        services.config.retrieval.similarity_threshold,
        top_k,
    ))
}

async fn fetch_candidates(
    services: &Services,
    doc_type: Option<DocumentType>,
) -> Result<Vec<ChunkCandidate>> {
    let base = r#"
        SELECT ce.document_id, ce.chunk_index, ce.text, ce.embedding, d.title, d.doc_type
        FROM chunk_embeddings ce
        JOIN documents d ON d.id = ce.document_id
    "#;

    let rows = match doc_type {
        Some(ty) => {
            sqlx::query(&format!("{} WHERE d.doc_type = ? ORDER BY ce.id", base))
                .bind(ty.as_str())
                .fetch_all(&services.pool)
                .await?
        }
        None => {
            sqlx::query(&format!("{} ORDER BY ce.id", base))
                .fetch_all(&services.pool)
                .await?
        }
    };

    let candidates = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let doc_type: String = row.get("doc_type");
            ChunkCandidate {
                document_id: row.get("document_id"),
                title: row.get("title"),
                doc_type: DocumentType::parse(&doc_type).unwrap_or(DocumentType::Unknown),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                embedding: blob_to_vec(&blob),
            }
        })
        .collect();

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::vec_to_blob;
    use crate::testutil::{memory_pool, test_config, CannedCompletions, HashEmbeddings};
    use std::sync::Arc;

    fn candidate(id: &str, index: i64, embedding: Vec<f32>) -> ChunkCandidate {
        ChunkCandidate {
            document_id: id.to_string(),
            title: format!("{}.txt", id),
            doc_type: DocumentType::Unknown,
            chunk_index: index,
            text: format!("chunk {} of {}", index, id),
            embedding,
        }
    }

    #[test]
    fn test_never_more_than_k_results() {
        let query = vec![1.0, 0.0];
        let candidates: Vec<_> = (0..10)
            .map(|i| candidate("d", i, vec![1.0, i as f32 * 0.01]))
            .collect();
        let hits = rank_chunks(&query, candidates, 0.0, 3);
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let query = vec![1.0, 0.0];
        // Orthogonal candidate scores exactly 0.0.
        let candidates = vec![candidate("d", 0, vec![0.0, 1.0])];
        let hits = rank_chunks(&query, candidates, 0.0, 5);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_results_sorted_descending() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            candidate("low", 0, vec![0.2, 1.0]),
            candidate("high", 1, vec![1.0, 0.05]),
            candidate("mid", 2, vec![0.7, 0.7]),
        ];
        let hits = rank_chunks(&query, candidates, -1.0, 5);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document_id, "high");
        assert_eq!(hits[1].document_id, "mid");
        assert_eq!(hits[2].document_id, "low");
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn test_ties_preserve_scan_order() {
        let query = vec![1.0, 0.0];
        // Parallel vectors all score exactly 1.0.
        let candidates = vec![
            candidate("a", 0, vec![2.0, 0.0]),
            candidate("b", 1, vec![0.5, 0.0]),
            candidate("c", 2, vec![1.0, 0.0]),
        ];
        let hits = rank_chunks(&query, candidates, 0.0, 5);
        let order: Vec<&str> = hits.iter().map(|h| h.document_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_zero_query_vector_matches_nothing() {
        let query = vec![0.0, 0.0];
        let candidates = vec![candidate("d", 0, vec![1.0, 1.0])];
        let hits = rank_chunks(&query, candidates, 0.01, 5);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_mismatched_dimensions_score_zero() {
        let query = vec![1.0, 0.0, 0.0];
        let candidates = vec![candidate("d", 0, vec![1.0, 0.0])];
        let hits = rank_chunks(&query, candidates, 0.0, 5);
        assert!(hits.is_empty());
    }

    async fn seed_document(
        pool: &sqlx::SqlitePool,
        id: &str,
        doc_type: &str,
        chunks: &[(i64, &str, Vec<f32>)],
    ) {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, body, file_size, content_hash, doc_type, word_count, status, processed_chunks, created_at, updated_at)
            VALUES (?, ?, '', 0, ?, ?, 0, 'completed', ?, 0, 0)
            "#,
        )
        .bind(id)
        .bind(format!("{}.txt", id))
        .bind(format!("hash-{}", id))
        .bind(doc_type)
        .bind(chunks.len() as i64)
        .execute(pool)
        .await
        .unwrap();

        for (index, text, vec) in chunks {
            sqlx::query(
                "INSERT INTO chunk_embeddings (document_id, chunk_index, text, char_len, embedding, created_at) VALUES (?, ?, ?, ?, ?, 0)",
            )
            .bind(id)
            .bind(index)
            .bind(text)
            .bind(text.chars().count() as i64)
            .bind(vec_to_blob(vec))
            .execute(pool)
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_type_filter_restricts_scan() {
        let pool = memory_pool().await;
        let embedder = HashEmbeddings::new(4);
        let query_vec = embedder.vector_for("what was withdrawn?");

        seed_document(
            &pool,
            "bank",
            "bank_statement",
            &[(0, "a withdrawal happened", query_vec.clone())],
        )
        .await;
        seed_document(
            &pool,
            "tax",
            "tax",
            &[(0, "a 1099 arrived", query_vec.clone())],
        )
        .await;

        let services = Services::new(
            test_config(),
            pool,
            Arc::new(embedder),
            Arc::new(CannedCompletions::new("n/a")),
        );

        let hits = search_similar_chunks(
            &services,
            "what was withdrawn?",
            10,
            Some(DocumentType::BankStatement),
        )
        .await
        .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "bank");
        assert_eq!(hits[0].doc_type, DocumentType::BankStatement);
        assert!((hits[0].similarity - 1.0).abs() < 1e-5);

        let unfiltered = search_similar_chunks(&services, "what was withdrawn?", 10, None)
            .await
            .unwrap();
        assert_eq!(unfiltered.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_query_embedding_yields_empty_results() {
        let pool = memory_pool().await;
        seed_document(&pool, "doc", "unknown", &[(0, "text", vec![1.0, 0.0])]).await;

        let services = Services::new(
            test_config(),
            pool,
            Arc::new(crate::embedding::DisabledEmbeddings),
            Arc::new(CannedCompletions::new("n/a")),
        );

        let hits = search_similar_chunks(&services, "anything", 5, None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
