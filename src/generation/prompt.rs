//! Prompt templates for grounded generation

use crate::storage::StoredChunk;
use crate::types::Citation;

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build the context block from retrieved chunks, scored and numbered
    pub fn build_context(chunks: &[(StoredChunk, f32)]) -> String {
        let mut context = String::new();

        for (i, (stored, _score)) in chunks.iter().enumerate() {
            let source_ref = stored.chunk.source.format_citation();
            context.push_str(&format!(
                "[{}] {}\n\nContent:\n{}\n\n---\n\n",
                i + 1,
                source_ref,
                stored.chunk.content
            ));
        }

        context
    }

    /// Build the full RAG prompt with strict grounding rules
    pub fn build_rag_prompt(question: &str, context: &str, citations: &[Citation]) -> String {
        format!(
            r#"You are a document-grounded assistant that ONLY uses information from provided documents.

CRITICAL GROUNDING RULES - YOU MUST FOLLOW THESE EXACTLY:
1. ONLY use information that is EXPLICITLY stated in the CONTEXT below
2. If the answer is not in the context: respond with "This information is not available in the provided documents."
3. NEVER use external knowledge, general knowledge, or training data
4. NEVER make inferences, assumptions, or educated guesses beyond what is explicitly stated
5. Every fact, claim, or piece of information MUST have a citation in this format: [Source: filename, Page X]
6. If you're unsure whether something is in the context, it's NOT - do not include it

RESPONSE STRUCTURE:
- Provide a clear, well-organized answer using ONLY information from the context
- Cite sources inline with each claim: [Source: filename, Page X]
- If multiple sources support a point, cite all of them

CONTEXT FROM DOCUMENTS:
{context}

AVAILABLE SOURCES:
{sources}

QUESTION: {question}

Provide a grounded answer using ONLY the document content above:"#,
            context = context,
            sources = Self::format_sources_list(citations),
            question = question
        )
    }

    /// Build the RAG prompt with recent chat turns for conversational
    /// continuity
    pub fn build_rag_prompt_with_history(
        question: &str,
        context: &str,
        citations: &[Citation],
        history: &[(String, String)],
    ) -> String {
        if history.is_empty() {
            return Self::build_rag_prompt(question, context, citations);
        }

        // Keep the prompt small; only the latest turns matter
        let turns: Vec<String> = history
            .iter()
            .take(3)
            .map(|(q, a)| format!("Q: {}\nA: {}", q, a))
            .collect();
        let recent = format!(
            "\nRECENT CONVERSATION (for context only, do not cite):\n{}\n",
            turns.join("\n\n---\n\n")
        );

        format!(
            "{}{}",
            recent,
            Self::build_rag_prompt(question, context, citations)
        )
    }

    fn format_sources_list(citations: &[Citation]) -> String {
        citations
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut source = format!("[{}] {}", i + 1, c.filename);
                if let Some(page) = c.page_number {
                    source.push_str(&format!(", Page {}", page));
                }
                source
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
