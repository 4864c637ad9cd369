//! Dependency-injected service bundle.
//!
//! One [`Services`] value is constructed at process start and passed by
//! reference into every command and request handler. Providers live behind
//! trait objects so tests can substitute deterministic fakes; there is no
//! module-level shared state anywhere in the crate.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::completion::{create_completion_provider, CompletionProvider};
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedding_provider, EmbeddingProvider};

pub struct Services {
    pub config: Config,
    pub pool: SqlitePool,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub completions: Arc<dyn CompletionProvider>,
}

impl Services {
    /// Connect to the database and construct the configured providers.
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        let embeddings: Arc<dyn EmbeddingProvider> =
            Arc::from(create_embedding_provider(&config.model)?);
        let completions: Arc<dyn CompletionProvider> =
            Arc::from(create_completion_provider(&config.model)?);

        Ok(Self {
            config,
            pool,
            embeddings,
            completions,
        })
    }

    /// Assemble from parts. Used by tests to inject fakes.
    pub fn new(
        config: Config,
        pool: SqlitePool,
        embeddings: Arc<dyn EmbeddingProvider>,
        completions: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            config,
            pool,
            embeddings,
            completions,
        }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
