//! Document ingestion: parsing, chunking, and the indexing pipeline

mod chunker;
mod parser;
mod pipeline;

pub use chunker::TextChunker;
pub use parser::{FileParser, PageContent, ParsedDocument};
pub use pipeline::{IngestOutcome, IngestPipeline, ProgressEvent, ProgressStage};
