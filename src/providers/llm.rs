//! LLM provider trait for grounded answer generation

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Citation;

/// Trait for LLM-based answer generation
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate an answer grounded in the retrieved context
    async fn generate_answer(
        &self,
        question: &str,
        context: &str,
        citations: &[Citation],
    ) -> Result<String>;

    /// Generate an answer with recent chat turns prepended for continuity
    async fn generate_with_history(
        &self,
        question: &str,
        context: &str,
        citations: &[Citation],
        history: &[(String, String)],
    ) -> Result<String>;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model identifier in use
    fn model(&self) -> &str;
}
