//! Core types shared across the pipeline

pub mod document;
pub mod query;
pub mod response;

pub use document::{Chunk, ChunkSource, Document, FileType};
pub use query::{QueryMode, QueryRequest};
pub use response::{Citation, DocumentSummary, IngestReport, QueryResponse, SearchHit};
