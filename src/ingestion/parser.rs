//! Multi-format file parser producing page-level text

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::types::FileType;

/// Character budget for pseudo-pages of non-paginated formats. Text files
/// have no native page structure, so they are split into fixed-size pages to
/// keep citations addressable.
const PSEUDO_PAGE_CHARS: usize = 3000;

/// Parsed document with extracted text and metadata
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// File type
    pub file_type: FileType,
    /// Full extracted text
    pub content: String,
    /// Content hash (sha256 hex) for deduplication
    pub content_hash: String,
    /// Total pages
    pub total_pages: u32,
    /// Page-level content
    pub pages: Vec<PageContent>,
}

/// Content from a single page
#[derive(Debug, Clone)]
pub struct PageContent {
    /// Page number (1-indexed)
    pub page_number: u32,
    /// Text content of the page
    pub content: String,
    /// Character offset into the full document text
    pub char_offset: usize,
}

/// Multi-format file parser
pub struct FileParser;

impl FileParser {
    /// Compute the sha256 hex digest of raw file bytes
    pub fn hash_content(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Parse a file into page-level text based on its extension
    pub fn parse(filename: &str, data: &[u8]) -> Result<ParsedDocument> {
        let file_type = FileType::from_filename(filename);

        let pages = match &file_type {
            FileType::Pdf => Self::parse_pdf(filename, data)?,
            FileType::Txt => Self::paginate(Self::decode_text(data)),
            FileType::Markdown => Self::paginate(Self::parse_markdown(data)),
            FileType::Csv => Self::paginate(Self::parse_csv(filename, data)?),
            FileType::Html => Self::paginate(Self::parse_html(data)),
            FileType::Unknown => {
                let ext = filename.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
                return Err(Error::UnsupportedFileType(ext.to_string()));
            }
        };

        let content: String = pages
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ParsedDocument {
            file_type,
            content,
            content_hash: Self::hash_content(data),
            total_pages: pages.len() as u32,
            pages,
        })
    }

    /// Extract PDF text page by page via lopdf; if per-page extraction yields
    /// nothing, fall back to whole-document extraction via pdf-extract.
    fn parse_pdf(filename: &str, data: &[u8]) -> Result<Vec<PageContent>> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::file_parse(filename, format!("invalid PDF: {}", e)))?;

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let mut pages = Vec::with_capacity(page_numbers.len());
        let mut char_offset = 0usize;
        let mut extracted_any = false;

        for page_number in &page_numbers {
            let text = match doc.extract_text(&[*page_number]) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        "Failed to extract text from page {} of {}: {}",
                        page_number,
                        filename,
                        e
                    );
                    String::new()
                }
            };
            let text = Self::normalize_whitespace(&text);
            if !text.is_empty() {
                extracted_any = true;
            }
            pages.push(PageContent {
                page_number: *page_number,
                char_offset,
                content: text,
            });
            // +1 for the newline joining pages in the full text
            char_offset += pages.last().map(|p| p.content.len()).unwrap_or(0) + 1;
        }

        if extracted_any {
            return Ok(pages);
        }

        // Per-page extraction produced nothing; retry with pdf-extract on the
        // whole document and paginate the result.
        tracing::debug!("Falling back to whole-document PDF extraction for {}", filename);
        let text = pdf_extract::extract_text_from_mem(data)
            .map_err(|e| Error::file_parse(filename, format!("PDF text extraction failed: {}", e)))?;
        let text = Self::normalize_whitespace(&text);
        if text.is_empty() {
            tracing::warn!("No text extracted from PDF: {}", filename);
        }
        Ok(Self::paginate(text))
    }

    /// Markdown is stripped to plain text so markup doesn't pollute chunks
    fn parse_markdown(data: &[u8]) -> String {
        use pulldown_cmark::{Event, Parser};

        let raw = Self::decode_text(data);
        let mut text = String::with_capacity(raw.len());
        for event in Parser::new(&raw) {
            match event {
                Event::Text(t) | Event::Code(t) => text.push_str(&t),
                Event::SoftBreak | Event::HardBreak => text.push('\n'),
                Event::End(_) => {
                    if !text.ends_with('\n') {
                        text.push('\n');
                    }
                }
                _ => {}
            }
        }
        text
    }

    /// CSV rows rendered one per line with comma-joined fields
    fn parse_csv(filename: &str, data: &[u8]) -> Result<String> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut text = String::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| Error::file_parse(filename, format!("invalid CSV: {}", e)))?;
            let line: Vec<&str> = record.iter().collect();
            text.push_str(&line.join(", "));
            text.push('\n');
        }
        Ok(text)
    }

    /// HTML reduced to its text content
    fn parse_html(data: &[u8]) -> String {
        let raw = Self::decode_text(data);
        let document = scraper::Html::parse_document(&raw);
        let mut text = String::new();
        for piece in document.root_element().text() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                text.push_str(trimmed);
                text.push('\n');
            }
        }
        text
    }

    /// Decode bytes as UTF-8, replacing invalid sequences
    fn decode_text(data: &[u8]) -> String {
        String::from_utf8_lossy(data).into_owned()
    }

    /// Collapse runs of blank lines and trailing whitespace
    fn normalize_whitespace(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut blank_run = 0;
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                blank_run += 1;
                if blank_run > 1 {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            out.push_str(line);
            out.push('\n');
        }
        out.trim().to_string()
    }

    /// Split non-paginated text into pseudo-pages at char boundaries
    fn paginate(text: String) -> Vec<PageContent> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let mut pages = Vec::new();
        let mut start = 0usize;
        let mut page_number = 1u32;

        while start < text.len() {
            let mut end = (start + PSEUDO_PAGE_CHARS).min(text.len());
            while end < text.len() && !text.is_char_boundary(end) {
                end += 1;
            }
            pages.push(PageContent {
                page_number,
                content: text[start..end].trim().to_string(),
                char_offset: start,
            });
            page_number += 1;
            start = end;
        }

        pages
    }
}
