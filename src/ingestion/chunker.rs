//! Sentence-aware text chunking with token budgets and overlap

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::types::{Chunk, ChunkSource, Document};

use super::parser::ParsedDocument;

/// A sentence with its offsets into the page text
#[derive(Debug, Clone, Copy)]
struct Sentence {
    start: usize,
    end: usize,
    tokens: u32,
}

/// Text chunker that accumulates whole sentences up to a token budget and
/// carries trailing sentences into the next chunk as overlap
pub struct TextChunker {
    /// Target chunk size in estimated tokens
    chunk_size: usize,
    /// Overlap between chunks in estimated tokens
    overlap: usize,
    /// Minimum chunk size in characters
    min_size: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            min_size: 50,
        }
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
            min_size: config.min_chunk_size,
        }
    }

    /// Estimate the token count of a text span. Roughly 1.3 tokens per word
    /// for BERT-family tokenizers; always at least 1.
    pub fn estimate_tokens(text: &str) -> u32 {
        let words = text.unicode_words().count();
        ((words as f64 * 1.3).ceil() as u32).max(1)
    }

    /// Chunk a parsed document page by page, keeping a single running chunk
    /// index across the whole document.
    pub fn chunk_document(&self, doc: &Document, parsed: &ParsedDocument) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for page in &parsed.pages {
            let page_number = if parsed.total_pages > 1 {
                Some(page.page_number)
            } else {
                None
            };
            let next_index = chunks.len() as u32;
            chunks.extend(self.chunk_page(
                &page.content,
                doc,
                page_number,
                page.char_offset,
                next_index,
            ));
        }

        chunks
    }

    /// Chunk a single page of text
    fn chunk_page(
        &self,
        text: &str,
        doc: &Document,
        page_number: Option<u32>,
        base_offset: usize,
        start_index: u32,
    ) -> Vec<Chunk> {
        let sentences = Self::split_sentences(text);
        if sentences.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut current: Vec<Sentence> = Vec::new();
        let mut current_tokens = 0u32;
        let mut chunk_index = start_index;

        for sentence in sentences {
            if !current.is_empty() && current_tokens + sentence.tokens > self.chunk_size as u32 {
                if let Some(chunk) =
                    self.finalize(text, &current, doc, page_number, base_offset, chunk_index)
                {
                    chunks.push(chunk);
                    chunk_index += 1;
                }
                let (kept, kept_tokens) = self.overlap_tail(&current);
                current = kept;
                current_tokens = kept_tokens;
            }

            current_tokens += sentence.tokens;
            current.push(sentence);
        }

        if let Some(chunk) =
            self.finalize(text, &current, doc, page_number, base_offset, chunk_index)
        {
            chunks.push(chunk);
        }

        chunks
    }

    /// Split page text into sentences with offsets and token estimates.
    /// Unpunctuated text comes back as a single sentence.
    fn split_sentences(text: &str) -> Vec<Sentence> {
        let mut sentences = Vec::new();
        for (start, sentence) in text.split_sentence_bound_indices() {
            if sentence.trim().is_empty() {
                continue;
            }
            sentences.push(Sentence {
                start,
                end: start + sentence.len(),
                tokens: Self::estimate_tokens(sentence),
            });
        }
        sentences
    }

    /// Take trailing sentences from the finished chunk until the overlap
    /// token budget is covered.
    fn overlap_tail(&self, sentences: &[Sentence]) -> (Vec<Sentence>, u32) {
        if self.overlap == 0 {
            return (Vec::new(), 0);
        }

        let mut kept = Vec::new();
        let mut tokens = 0u32;
        for sentence in sentences.iter().rev() {
            // Never carry the entire chunk forward; that would stall progress
            if kept.len() + 1 == sentences.len() {
                break;
            }
            kept.insert(0, *sentence);
            tokens += sentence.tokens;
            if tokens >= self.overlap as u32 {
                break;
            }
        }
        (kept, tokens)
    }

    /// Build a chunk from accumulated sentences; drops fragments below the
    /// minimum character size.
    fn finalize(
        &self,
        text: &str,
        sentences: &[Sentence],
        doc: &Document,
        page_number: Option<u32>,
        base_offset: usize,
        chunk_index: u32,
    ) -> Option<Chunk> {
        let first = sentences.first()?;
        let last = sentences.last()?;

        let content = text[first.start..last.end].trim();
        if content.len() < self.min_size {
            return None;
        }

        let token_count = sentences.iter().map(|s| s.tokens).sum();
        Some(Chunk::new(
            doc.id,
            content.to_string(),
            ChunkSource::page(doc, page_number),
            base_offset + first.start,
            base_offset + last.end,
            chunk_index,
            token_count,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::parser::FileParser;
    use crate::types::FileType;

    fn test_doc() -> Document {
        Document::new(
            "test.txt".into(),
            "default".into(),
            FileType::Txt,
            "hash".into(),
            0,
        )
    }

    fn parsed(text: &str) -> ParsedDocument {
        FileParser::parse("test.txt", text.as_bytes()).unwrap()
    }

    #[test]
    fn token_estimate_scales_with_words() {
        assert_eq!(TextChunker::estimate_tokens(""), 1);
        assert_eq!(TextChunker::estimate_tokens("one"), 2); // ceil(1.3)
        assert_eq!(TextChunker::estimate_tokens("one two three four"), 6); // ceil(5.2)
    }

    #[test]
    fn short_text_is_one_chunk() {
        let doc = test_doc();
        let text = "This is the first sentence. This is the second sentence.";
        let chunks = TextChunker::new(800, 100).chunk_document(&doc, &parsed(text));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert!(chunks[0].content.contains("first sentence"));
        assert!(chunks[0].content.contains("second sentence"));
    }

    #[test]
    fn long_text_splits_with_overlap() {
        let doc = test_doc();
        let sentence = "The quick brown fox jumps over the lazy dog near the river bank today. ";
        let text = sentence.repeat(40);
        let chunks = TextChunker::new(100, 25).chunk_document(&doc, &parsed(&text));

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
            assert!(chunk.token_count > 0);
        }
        // Consecutive chunks overlap: the next chunk starts before the
        // previous one ends
        for pair in chunks.windows(2) {
            assert!(pair[1].char_start < pair[0].char_end);
        }
    }

    #[test]
    fn offsets_point_into_page_text() {
        let doc = test_doc();
        let sentence = "Rust gives memory safety without garbage collection for systems work. ";
        let text = sentence.repeat(30);
        let parsed = parsed(&text);
        let chunks = TextChunker::new(120, 20).chunk_document(&doc, &parsed);

        for chunk in &chunks {
            let page = parsed
                .pages
                .iter()
                .rev()
                .find(|p| p.char_offset <= chunk.char_start)
                .unwrap();
            let local_start = chunk.char_start - page.char_offset;
            let local_end = chunk.char_end - page.char_offset;
            assert!(page.content.is_char_boundary(local_start));
            assert!(page.content.is_char_boundary(local_end.min(page.content.len())));
        }
    }

    #[test]
    fn tiny_fragments_are_dropped() {
        let doc = test_doc();
        // Below min_size (50 chars) after the shortest sentence
        let chunks = TextChunker::new(800, 100).chunk_document(&doc, &parsed("Short."));
        assert!(chunks.is_empty());
    }

    #[test]
    fn unpunctuated_text_still_chunks() {
        let doc = test_doc();
        let text = "word ".repeat(500);
        let chunks = TextChunker::new(200, 40).chunk_document(&doc, &parsed(&text));
        // One giant sentence per pseudo-page becomes one chunk per page
        assert!(!chunks.is_empty());
    }

    #[test]
    fn multi_page_documents_tag_page_numbers() {
        let doc = test_doc();
        let sentence = "Documents are split into pseudo pages of three thousand characters each. ";
        let text = sentence.repeat(100); // > 3000 chars, multiple pages
        let parsed = parsed(&text);
        assert!(parsed.total_pages > 1);

        let chunks = TextChunker::new(200, 40).chunk_document(&doc, &parsed);
        assert!(chunks.iter().all(|c| c.source.page_number.is_some()));
        let max_page = chunks
            .iter()
            .filter_map(|c| c.source.page_number)
            .max()
            .unwrap();
        assert!(max_page <= parsed.total_pages);
        assert!(max_page > 1);
    }
}
