//! Model providers for embeddings and answer generation
//!
//! The server talks to providers through the [`EmbeddingProvider`] and
//! [`LlmProvider`] traits so the Ollama backend can be swapped out in tests.

mod embedding;
mod llm;
mod ollama;

pub use embedding::EmbeddingProvider;
pub use llm::LlmProvider;
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaLlm, OllamaProvider};
