//! Response types for queries and ingestion

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::{Chunk, FileType};

/// Citation snippets are cut near a word boundary past this length
const MAX_SNIPPET_LEN: usize = 300;

/// Citation from a source document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Chunk ID
    pub chunk_id: Uuid,
    /// Document ID
    pub document_id: Uuid,
    /// Source filename
    pub filename: String,
    /// File type
    pub file_type: FileType,
    /// Page number (if applicable)
    pub page_number: Option<u32>,
    /// Exact snippet from the source
    pub snippet: String,
    /// Snippet with highlighted query terms (`<mark>` tags)
    pub snippet_highlighted: String,
    /// Similarity score (0.0-1.0)
    pub similarity_score: f32,
}

impl Citation {
    /// Create a citation from a retrieved chunk
    pub fn from_chunk(chunk: &Chunk, similarity_score: f32) -> Self {
        Self {
            chunk_id: chunk.id,
            document_id: chunk.document_id,
            filename: chunk.source.filename.clone(),
            file_type: chunk.source.file_type.clone(),
            page_number: chunk.source.page_number,
            snippet: crate::generation::citation::truncate_snippet(&chunk.content, MAX_SNIPPET_LEN),
            snippet_highlighted: crate::generation::citation::truncate_snippet(
                &chunk.content,
                MAX_SNIPPET_LEN,
            ),
            similarity_score,
        }
    }

    /// Format citation for display in text, e.g. `[Source: report.pdf, Page 2]`
    pub fn format_inline(&self) -> String {
        match self.page_number {
            Some(page) => format!("[Source: {}, Page {}]", self.filename, page),
            None => format!("[Source: {}]", self.filename),
        }
    }

    /// Highlight query terms in the snippet
    pub fn highlight_terms(&mut self, terms: &[&str]) {
        self.snippet_highlighted =
            crate::generation::citation::highlight_snippet(&self.snippet, terms);
    }
}

/// A ranked search hit (search mode)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Chunk ID
    pub chunk_id: Uuid,
    /// Document ID
    pub document_id: Uuid,
    /// Source filename
    pub filename: String,
    /// Page number
    pub page_number: Option<u32>,
    /// Chunk text
    pub content: String,
    /// Similarity score
    pub similarity: f32,
}

/// Response from a query (both modes)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Generated answer (empty for search mode)
    pub answer: String,
    /// Citations with source snippets
    pub citations: Vec<Citation>,
    /// Ranked hits (search mode; also populated in qa mode)
    pub hits: Vec<SearchHit>,
    /// Overall confidence score (mean citation similarity)
    pub confidence: f32,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
    /// Number of chunks retrieved before filtering
    pub chunks_retrieved: usize,
    /// Raw chunks (if include_chunks was requested)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_chunks: Option<Vec<Chunk>>,
}

impl QueryResponse {
    /// Create a response with confidence derived from citations
    pub fn new(answer: String, citations: Vec<Citation>, processing_time_ms: u64) -> Self {
        let confidence = if citations.is_empty() {
            0.0
        } else {
            citations.iter().map(|c| c.similarity_score).sum::<f32>() / citations.len() as f32
        };

        Self {
            answer,
            chunks_retrieved: citations.len(),
            citations,
            hits: Vec::new(),
            confidence,
            processing_time_ms,
            raw_chunks: None,
        }
    }

    /// Response when nothing relevant was found
    pub fn not_found(processing_time_ms: u64) -> Self {
        Self {
            answer: "I couldn't find relevant information in the documents to answer this \
                     question."
                .to_string(),
            citations: Vec::new(),
            hits: Vec::new(),
            confidence: 0.0,
            processing_time_ms,
            chunks_retrieved: 0,
            raw_chunks: None,
        }
    }
}

/// Summary of an ingested document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Document ID
    pub id: Uuid,
    /// Filename
    pub filename: String,
    /// File type
    pub file_type: FileType,
    /// Number of pages
    pub total_pages: Option<u32>,
    /// Number of chunks created
    pub total_chunks: u32,
    /// Whether the file was skipped (unchanged content)
    #[serde(default)]
    pub skipped: bool,
}

/// Error for a single file during ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFileError {
    /// Filename that failed
    pub filename: String,
    /// Error message
    pub error: String,
}

/// Report from an ingestion run (upload or folder scan)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Knowledge base that was ingested into
    pub base: String,
    /// Per-document outcomes
    pub documents: Vec<DocumentSummary>,
    /// Total chunks created across all documents
    pub total_chunks_created: u32,
    /// Files skipped as unchanged
    pub files_skipped: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
    /// Per-file errors (partial success)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<IngestFileError>,
}

impl IngestReport {
    /// Empty report for a base
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            documents: Vec::new(),
            total_chunks_created: 0,
            files_skipped: 0,
            processing_time_ms: 0,
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::document::{ChunkSource, Document};

    #[test]
    fn citation_snippet_is_truncated_at_a_word_boundary() {
        let doc = Document::new(
            "long.txt".to_string(),
            "default".to_string(),
            FileType::Txt,
            "hash".to_string(),
            10,
        );
        let long_content = "word ".repeat(200);
        let chunk = Chunk::new(
            doc.id,
            long_content.clone(),
            ChunkSource::page(&doc, None),
            0,
            long_content.len(),
            0,
            260,
        );

        let citation = Citation::from_chunk(&chunk, 0.9);
        assert!(citation.snippet.len() <= MAX_SNIPPET_LEN + 3);
        assert!(citation.snippet.ends_with("..."));

        let short = Chunk::new(doc.id, "short".to_string(), ChunkSource::page(&doc, None), 0, 5, 0, 1);
        assert_eq!(Citation::from_chunk(&short, 0.9).snippet, "short");
    }
}
