//! Shared fixtures for unit tests: deterministic model providers and an
//! in-memory database pool.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::completion::CompletionProvider;
use crate::config::{Config, DbConfig};
use crate::embedding::EmbeddingProvider;
use crate::migrate;

/// In-memory SQLite pool with the full schema applied. Single connection —
/// every handle must see the same memory database.
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    pool
}

/// Config with defaults suitable for tests (the db path is unused when the
/// pool is constructed separately).
pub fn test_config() -> Config {
    Config {
        db: DbConfig {
            path: "/tmp/finsight-test.sqlite".into(),
        },
        upload: Default::default(),
        chunking: Default::default(),
        retrieval: Default::default(),
        model: Default::default(),
        server: Default::default(),
    }
}

/// Deterministic embedding provider: hashes the text into a fixed-dimension
/// unit-ish vector. Identical texts embed identically.
pub struct HashEmbeddings {
    pub dims: usize,
}

impl HashEmbeddings {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dims)
            .map(|i| {
                let byte = digest[i % digest.len()];
                (byte as f32 - 127.5) / 127.5
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    fn model_name(&self) -> &str {
        "hash-test"
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Embedding provider that fails on selected call indices (0-based, in call
/// order) and otherwise behaves like [`HashEmbeddings`].
pub struct FlakyEmbeddings {
    inner: HashEmbeddings,
    fail_on: HashSet<usize>,
    calls: AtomicUsize,
}

impl FlakyEmbeddings {
    pub fn new(dims: usize, fail_on: impl IntoIterator<Item = usize>) -> Self {
        Self {
            inner: HashEmbeddings::new(dims),
            fail_on: fail_on.into_iter().collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.contains(&call) {
            anyhow::bail!("simulated embedding failure on call {}", call);
        }
        self.inner.embed(text).await
    }

    fn model_name(&self) -> &str {
        "flaky-test"
    }

    fn dims(&self) -> usize {
        self.inner.dims
    }
}

/// Completion provider returning a fixed answer, counting invocations.
pub struct CannedCompletions {
    pub answer: String,
    pub calls: AtomicUsize,
}

impl CannedCompletions {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for CannedCompletions {
    async fn complete(
        &self,
        _query: &str,
        _context: &[String],
        _instruction: &str,
        _temperature: f32,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }

    fn model_name(&self) -> &str {
        "canned-test"
    }
}

/// Completion provider that always fails.
pub struct FailingCompletions;

#[async_trait]
impl CompletionProvider for FailingCompletions {
    async fn complete(
        &self,
        _query: &str,
        _context: &[String],
        _instruction: &str,
        _temperature: f32,
    ) -> Result<String> {
        anyhow::bail!("simulated completion failure")
    }

    fn model_name(&self) -> &str {
        "failing-test"
    }
}
