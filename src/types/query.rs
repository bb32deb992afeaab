//! Query request types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Retrieval only: return ranked chunks without calling the LLM
    Search,
    /// Full RAG: retrieval plus a grounded LLM answer with citations
    Qa,
}

impl Default for QueryMode {
    fn default() -> Self {
        Self::Qa
    }
}

impl QueryMode {
    /// Stable string key used in the database
    pub fn as_str(&self) -> &str {
        match self {
            Self::Search => "search",
            Self::Qa => "qa",
        }
    }

    /// Inverse of [`QueryMode::as_str`]; unknown keys fall back to `qa`
    pub fn from_str_key(key: &str) -> Self {
        match key {
            "search" => Self::Search,
            _ => Self::Qa,
        }
    }
}

/// Query request against a knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question or search phrase
    pub question: String,

    /// Knowledge base to query (default: "default")
    #[serde(default = "default_base")]
    pub base: String,

    /// Query mode (default: qa)
    #[serde(default)]
    pub mode: QueryMode,

    /// Number of chunks to retrieve (default: 5)
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum similarity threshold (0.0-1.0, default: 0.25)
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,

    /// Filter by specific document IDs (optional)
    #[serde(default)]
    pub document_filter: Option<Vec<Uuid>>,

    /// Include raw chunks in the response (default: false)
    #[serde(default)]
    pub include_chunks: bool,
}

fn default_base() -> String {
    "default".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.25
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            question: String::new(),
            base: default_base(),
            mode: QueryMode::Qa,
            top_k: default_top_k(),
            similarity_threshold: default_threshold(),
            document_filter: None,
            include_chunks: false,
        }
    }
}

impl QueryRequest {
    /// Create a QA query with defaults
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    /// Target a specific knowledge base
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// Set the query mode
    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the number of results to retrieve
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_with_defaults() {
        let request: QueryRequest =
            serde_json::from_str(r#"{"question": "what is chunking?"}"#).unwrap();
        assert_eq!(request.base, "default");
        assert_eq!(request.mode, QueryMode::Qa);
        assert_eq!(request.top_k, 5);
        assert!(!request.include_chunks);
    }

    #[test]
    fn mode_uses_snake_case() {
        let request: QueryRequest =
            serde_json::from_str(r#"{"question": "chunking", "mode": "search"}"#).unwrap();
        assert_eq!(request.mode, QueryMode::Search);
    }
}
