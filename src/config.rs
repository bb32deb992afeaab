//! Configuration for the RAG backend
//!
//! Loaded from an optional TOML file; a handful of knobs can also be set
//! through `RAGBASE_*` environment variables so containers don't need a
//! config file at all.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Data directory and base layout
    #[serde(default)]
    pub storage: StorageConfig,
    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Ollama/LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Vector index tuning
    #[serde(default)]
    pub index: IndexConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Data directory layout. Every knowledge base lives under
/// `<data_dir>/bases/<name>/` with `documents/`, `index/`, and `base.db`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root data directory
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ragbase");
        Self { data_dir }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
    /// Batch size for embedding generation
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: 768,
            batch_size: 32,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in estimated tokens
    pub chunk_size: usize,
    /// Overlap between chunks in estimated tokens
    pub chunk_overlap: usize,
    /// Minimum chunk size in characters (smaller chunks are dropped)
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            min_chunk_size: 50,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            generate_model: "phi3".to_string(),
            temperature: 0.3,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Vector index tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// HNSW M parameter (connections per layer)
    pub hnsw_m: usize,
    /// HNSW ef_construction parameter
    pub hnsw_ef_construction: usize,
    /// HNSW ef_search parameter
    pub hnsw_ef_search: usize,
    /// Below this many vectors, search scans linearly instead of using HNSW
    pub brute_force_threshold: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hnsw_m: 32,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 100,
            brute_force_threshold: 1024,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("RAGBASE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("RAGBASE_OLLAMA_URL") {
            self.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("RAGBASE_EMBED_MODEL") {
            self.llm.embed_model = model;
        }
        if let Ok(model) = std::env::var("RAGBASE_GENERATE_MODEL") {
            self.llm.generate_model = model;
        }
        if let Ok(port) = std::env::var("RAGBASE_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
    }

    /// Root directory holding all knowledge bases
    pub fn bases_dir(&self) -> PathBuf {
        self.storage.data_dir.join("bases")
    }

    /// Directory for a single knowledge base
    pub fn base_dir(&self, base: &str) -> PathBuf {
        self.bases_dir().join(base)
    }

    /// Document folder for a knowledge base (scanned for ingestion)
    pub fn documents_dir(&self, base: &str) -> PathBuf {
        self.base_dir(base).join("documents")
    }

    /// Vector index directory for a knowledge base
    pub fn index_dir(&self, base: &str) -> PathBuf {
        self.base_dir(base).join("index")
    }

    /// SQLite database path for a knowledge base
    pub fn database_path(&self, base: &str) -> PathBuf {
        self.base_dir(base).join("base.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.embeddings.dimensions, 768);
    }

    #[test]
    fn base_paths_nest_under_data_dir() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::from("/tmp/ragbase-test");

        assert_eq!(
            config.documents_dir("default"),
            PathBuf::from("/tmp/ragbase-test/bases/default/documents")
        );
        assert_eq!(
            config.database_path("default"),
            PathBuf::from("/tmp/ragbase-test/bases/default/base.db")
        );
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 9000
            enable_cors = false
            max_upload_size = 1048576

            [chunking]
            chunk_size = 512
            chunk_overlap = 64
            min_chunk_size = 40
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.chunking.chunk_size, 512);
        // Untouched sections keep defaults
        assert_eq!(config.llm.embed_model, "nomic-embed-text");
        assert_eq!(config.index.hnsw_m, 32);
    }
}
