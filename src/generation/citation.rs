//! Citation extraction and linking

use regex::Regex;

use crate::types::Citation;

/// Extract `[Source: filename, Page X]` markers from the LLM answer and link
/// them back to the retrieved citations. If the model cited nothing, the top
/// citations by similarity are appended as an explicit sources list.
pub fn extract_and_link_citations(
    answer: &str,
    available_citations: &mut Vec<Citation>,
) -> (String, Vec<Citation>) {
    let citation_pattern = Regex::new(r"\[Source:\s*([^,\]]+)(?:,\s*Page\s*(\d+))?\]")
        .expect("Invalid citation regex");

    let mut linked_citations: Vec<Citation> = Vec::new();
    let mut clean_answer = answer.to_string();

    for cap in citation_pattern.captures_iter(answer) {
        let filename = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let page: Option<u32> = cap.get(2).and_then(|m| m.as_str().parse().ok());

        if let Some(citation) = find_matching_citation(available_citations, filename, page) {
            if !linked_citations.iter().any(|c| c.chunk_id == citation.chunk_id) {
                linked_citations.push(citation);
            }
        }
    }

    // No explicit citations in the answer: fall back to the strongest matches
    if linked_citations.is_empty() && !available_citations.is_empty() {
        available_citations
            .sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));

        for citation in available_citations.iter().take(3) {
            linked_citations.push(citation.clone());
        }

        clean_answer.push_str("\n\nSources used:");
        for citation in &linked_citations {
            clean_answer.push_str(&format!("\n- {}", citation.format_inline()));
        }
    }

    (clean_answer, linked_citations)
}

fn find_matching_citation(
    citations: &[Citation],
    filename: &str,
    page: Option<u32>,
) -> Option<Citation> {
    for citation in citations {
        let filename_matches = citation.filename.contains(filename)
            || filename.contains(&citation.filename)
            || filename.eq_ignore_ascii_case(&citation.filename);

        if filename_matches {
            match page {
                Some(p) if citation.page_number == Some(p) => return Some(citation.clone()),
                None => return Some(citation.clone()),
                Some(_) => continue,
            }
        }
    }

    // Page didn't line up; fall back to the filename alone
    citations
        .iter()
        .find(|c| c.filename.contains(filename) || filename.contains(&c.filename))
        .cloned()
}

/// Highlight query terms in a snippet with `<mark>` tags
pub fn highlight_snippet(snippet: &str, query_terms: &[&str]) -> String {
    let mut highlighted = snippet.to_string();

    for term in query_terms {
        // Short terms highlight too much noise
        if term.len() < 3 {
            continue;
        }

        let re = regex::RegexBuilder::new(&regex::escape(term))
            .case_insensitive(true)
            .build();

        if let Ok(re) = re {
            highlighted = re
                .replace_all(&highlighted, |caps: &regex::Captures| {
                    format!("<mark>{}</mark>", &caps[0])
                })
                .to_string();
        }
    }

    highlighted
}

/// Truncate a snippet near a word boundary
pub fn truncate_snippet(snippet: &str, max_len: usize) -> String {
    if snippet.len() <= max_len {
        return snippet.to_string();
    }

    let mut end = max_len;
    while end > 0 && !snippet.is_char_boundary(end) {
        end -= 1;
    }

    if let Some(pos) = snippet[..end].rfind(' ') {
        return format!("{}...", &snippet[..pos]);
    }

    format!("{}...", &snippet[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileType;
    use uuid::Uuid;

    fn citation(filename: &str, page: Option<u32>, score: f32) -> Citation {
        Citation {
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            filename: filename.to_string(),
            file_type: FileType::Pdf,
            page_number: page,
            snippet: "snippet".to_string(),
            snippet_highlighted: "snippet".to_string(),
            similarity_score: score,
        }
    }

    #[test]
    fn explicit_markers_are_linked() {
        let mut available = vec![
            citation("report.pdf", Some(2), 0.9),
            citation("notes.txt", None, 0.8),
        ];
        let answer = "Chunking splits text [Source: report.pdf, Page 2]. \
                      Overlap helps [Source: notes.txt].";

        let (clean, linked) = extract_and_link_citations(answer, &mut available);
        assert_eq!(clean, answer);
        assert_eq!(linked.len(), 2);
        assert_eq!(linked[0].filename, "report.pdf");
    }

    #[test]
    fn duplicate_markers_link_once() {
        let mut available = vec![citation("report.pdf", Some(2), 0.9)];
        let answer = "A [Source: report.pdf, Page 2]. B [Source: report.pdf, Page 2].";

        let (_, linked) = extract_and_link_citations(answer, &mut available);
        assert_eq!(linked.len(), 1);
    }

    #[test]
    fn uncited_answer_falls_back_to_top_matches() {
        let mut available = vec![
            citation("weak.pdf", None, 0.3),
            citation("strong.pdf", None, 0.9),
        ];
        let answer = "An answer with no citation markers.";

        let (clean, linked) = extract_and_link_citations(answer, &mut available);
        assert!(clean.contains("Sources used:"));
        assert_eq!(linked[0].filename, "strong.pdf");
    }

    #[test]
    fn wrong_page_falls_back_to_filename() {
        let mut available = vec![citation("report.pdf", Some(2), 0.9)];
        let answer = "Claim [Source: report.pdf, Page 99].";

        let (_, linked) = extract_and_link_citations(answer, &mut available);
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].filename, "report.pdf");
    }

    #[test]
    fn highlight_marks_terms_case_insensitively() {
        let highlighted =
            highlight_snippet("Climate change and CLIMATE policy.", &["climate", "of"]);
        assert!(highlighted.contains("<mark>Climate</mark>"));
        assert!(highlighted.contains("<mark>CLIMATE</mark>"));
        assert!(!highlighted.contains("<mark>of</mark>"));
    }

    #[test]
    fn truncate_prefers_word_boundary() {
        let truncated = truncate_snippet("This is a very long snippet needing a trim.", 20);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 23);
    }
}
