//! Document and chunk types with source tracking for citations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Supported file types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
    /// CSV file
    Csv,
    /// HTML document
    Html,
    /// Unknown file type
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Markdown,
            "csv" => Self::Csv,
            "html" | "htm" => Self::Html,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from a filename
    pub fn from_filename(filename: &str) -> Self {
        filename
            .rsplit_once('.')
            .map(|(_, ext)| Self::from_extension(ext))
            .unwrap_or(Self::Unknown)
    }

    /// Check whether this type can be ingested
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Get display name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Pdf => "PDF",
            Self::Txt => "Text File",
            Self::Markdown => "Markdown",
            Self::Csv => "CSV",
            Self::Html => "HTML",
            Self::Unknown => "Unknown",
        }
    }

    /// Stable string key used in the database
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Markdown => "markdown",
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Unknown => "unknown",
        }
    }

    /// Inverse of [`FileType::as_str`]
    pub fn from_str_key(key: &str) -> Self {
        match key {
            "pdf" => Self::Pdf,
            "txt" => Self::Txt,
            "markdown" => Self::Markdown,
            "csv" => Self::Csv,
            "html" => Self::Html,
            _ => Self::Unknown,
        }
    }
}

/// A document that has been ingested into a knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Original filename
    pub filename: String,
    /// Knowledge base this document belongs to
    pub base: String,
    /// File type
    pub file_type: FileType,
    /// Content hash (sha256 hex) for deduplication
    pub content_hash: String,
    /// File size in bytes
    pub file_size: u64,
    /// Total number of pages
    pub total_pages: Option<u32>,
    /// Total number of chunks created
    pub total_chunks: u32,
    /// Ingestion timestamp
    pub indexed_at: chrono::DateTime<chrono::Utc>,
    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    /// Create a new document record (pages/chunks filled in by the pipeline)
    pub fn new(
        filename: String,
        base: String,
        file_type: FileType,
        content_hash: String,
        file_size: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename,
            base,
            file_type,
            content_hash,
            file_size,
            total_pages: None,
            total_chunks: 0,
            indexed_at: chrono::Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// Source information for a chunk, used to render citations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSource {
    /// Original filename
    pub filename: String,
    /// File type
    pub file_type: FileType,
    /// Page number (1-indexed)
    pub page_number: Option<u32>,
    /// Total pages in the document
    pub page_count: Option<u32>,
}

impl ChunkSource {
    /// Source info for a given document page
    pub fn page(doc: &Document, page_number: Option<u32>) -> Self {
        Self {
            filename: doc.filename.clone(),
            file_type: doc.file_type.clone(),
            page_number,
            page_count: doc.total_pages,
        }
    }

    /// Format source for display, e.g. `report.pdf, Page 3`
    pub fn format_citation(&self) -> String {
        match self.page_number {
            Some(page) => format!("{}, Page {}", self.filename, page),
            None => self.filename.clone(),
        }
    }
}

/// A chunk of text from a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// Text content
    pub content: String,
    /// Embedding vector (empty until embedded)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    /// Source information for citations
    pub source: ChunkSource,
    /// Character offsets into the page text
    pub char_start: usize,
    pub char_end: usize,
    /// Chunk index within the document
    pub chunk_index: u32,
    /// Estimated token count
    pub token_count: u32,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(
        document_id: Uuid,
        content: String,
        source: ChunkSource,
        char_start: usize,
        char_end: usize,
        chunk_index: u32,
        token_count: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            content,
            embedding: Vec::new(),
            source,
            char_start,
            char_end,
            chunk_index,
            token_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_detection() {
        assert_eq!(FileType::from_extension("PDF"), FileType::Pdf);
        assert_eq!(FileType::from_filename("notes.md"), FileType::Markdown);
        assert_eq!(FileType::from_filename("data.csv"), FileType::Csv);
        assert_eq!(FileType::from_filename("archive.tar.gz"), FileType::Unknown);
        assert!(!FileType::from_filename("noext").is_supported());
    }

    #[test]
    fn file_type_roundtrips_through_db_key() {
        for ft in [
            FileType::Pdf,
            FileType::Txt,
            FileType::Markdown,
            FileType::Csv,
            FileType::Html,
        ] {
            assert_eq!(FileType::from_str_key(ft.as_str()), ft);
        }
    }

    #[test]
    fn citation_format_includes_page() {
        let doc = Document::new(
            "report.pdf".into(),
            "default".into(),
            FileType::Pdf,
            "abc".into(),
            100,
        );
        let source = ChunkSource::page(&doc, Some(3));
        assert_eq!(source.format_citation(), "report.pdf, Page 3");

        let source = ChunkSource::page(&doc, None);
        assert_eq!(source.format_citation(), "report.pdf");
    }
}
