use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Upload size ceiling in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    /// Lowercase filename extensions accepted for ingestion.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec![
        "txt".to_string(),
        "md".to_string(),
        "pdf".to_string(),
        "docx".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Trailing characters of each closed chunk carried into the next one.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Hard cap on chunks produced per document.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            max_chunks: default_max_chunks(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}
fn default_max_chunks() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Results must score strictly above this to be returned.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.01
}
fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// `"openai"` or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff in seconds; attempt n waits n × this.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            embedding_model: default_embedding_model(),
            embedding_dims: default_embedding_dims(),
            completion_model: default_completion_model(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dims() -> usize {
    1536
}
fn default_completion_model() -> String {
    "gpt-4-turbo-preview".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    1
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7420".to_string()
}

impl ModelConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }
    if config.chunking.max_chunks == 0 {
        anyhow::bail!("chunking.max_chunks must be > 0");
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [-1.0, 1.0]");
    }

    // Validate upload
    if config.upload.max_file_size == 0 {
        anyhow::bail!("upload.max_file_size must be > 0");
    }
    if config.upload.allowed_extensions.is_empty() {
        anyhow::bail!("upload.allowed_extensions must not be empty");
    }

    // Validate model
    match config.model.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.model.is_enabled() && config.model.embedding_dims == 0 {
        anyhow::bail!(
            "model.embedding_dims must be > 0 when provider is '{}'",
            config.model.provider
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let f = write_config("[db]\npath = \"/tmp/finsight.sqlite\"\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert_eq!(cfg.chunking.overlap, 200);
        assert_eq!(cfg.chunking.max_chunks, 20);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.model.provider, "disabled");
        assert!(!cfg.model.is_enabled());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let f = write_config(
            "[db]\npath = \"/tmp/finsight.sqlite\"\n\n[chunking]\nchunk_size = 100\noverlap = 100\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let f =
            write_config("[db]\npath = \"/tmp/finsight.sqlite\"\n\n[model]\nprovider = \"acme\"\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_threshold_range_enforced() {
        let f = write_config(
            "[db]\npath = \"/tmp/finsight.sqlite\"\n\n[retrieval]\nsimilarity_threshold = 1.5\n",
        );
        assert!(load_config(f.path()).is_err());
    }
}
