//! ragbase: knowledge-base RAG backend with document ingestion and cited answers
//!
//! Documents are organized into named knowledge bases. Each base owns its own
//! document folder, SQLite database, and vector index. The HTTP API covers
//! base management, ingestion (upload or folder scan), and querying in
//! `search` (retrieval only) or `qa` (retrieval + grounded LLM answer) mode.

pub mod config;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod providers;
pub mod server;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{
    document::{Chunk, ChunkSource, Document, FileType},
    query::{QueryMode, QueryRequest},
    response::{Citation, QueryResponse},
};
