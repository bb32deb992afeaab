//! Prompt construction and citation handling for grounded answers

pub mod citation;
mod prompt;

pub use citation::{extract_and_link_citations, highlight_snippet, truncate_snippet};
pub use prompt::PromptBuilder;
