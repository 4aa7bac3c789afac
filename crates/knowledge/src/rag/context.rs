//! Context assembly and citation building.

use crate::rag::types::Citation;
use crate::types::Passage;
use std::collections::BTreeSet;

/// Maximum snippet length for citations, in characters.
const MAX_SNIPPET_CHARS: usize = 200;

/// Passages labelled and joined for the generation prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    /// The passages in label order; `[Fuente n]` is `passages[n - 1]`.
    pub passages: Vec<Passage>,
}

/// Label and concatenate passages, optionally truncating each to `truncate` characters.
pub fn assemble_context(passages: Vec<Passage>, truncate: Option<usize>) -> AssembledContext {
    let text = passages
        .iter()
        .enumerate()
        .map(|(i, passage)| {
            let body = match truncate {
                Some(max) => truncate_chars(&passage.text, max),
                None => passage.text.clone(),
            };
            format!(
                "[Fuente {}] Partido: {} | Documento: {} | Posición: {}\n{}",
                i + 1,
                passage.party,
                passage.doc_id,
                passage.position,
                body
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    AssembledContext { text, passages }
}

/// `[Fuente n]` labels in the answer that point at one of `count` passages.
pub fn referenced_labels(answer: &str, count: usize) -> BTreeSet<usize> {
    const MARKER: &str = "[Fuente ";

    let mut labels = BTreeSet::new();
    let mut rest = answer;
    while let Some(start) = rest.find(MARKER) {
        rest = &rest[start + MARKER.len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let closed = rest[digits.len()..].starts_with(']');
        if let (true, Ok(label)) = (closed, digits.parse::<usize>()) {
            if (1..=count).contains(&label) {
                labels.insert(label);
            }
        }
    }
    labels
}

/// One citation per context passage, in label order.
pub fn build_citations(context: &AssembledContext, answer: &str) -> Vec<Citation> {
    let referenced = referenced_labels(answer, context.passages.len());

    context
        .passages
        .iter()
        .enumerate()
        .map(|(i, passage)| Citation {
            label: i + 1,
            party: passage.party.clone(),
            doc_id: passage.doc_id.clone(),
            file_name: passage.file_name.clone(),
            position: passage.position,
            score: passage.score,
            snippet: truncate_snippet(&passage.text, MAX_SNIPPET_CHARS),
            referenced: referenced.contains(&(i + 1)),
        })
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Truncate at a word boundary, appending "..." when shortened.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let truncated = truncate_chars(text, max_chars);
    if truncated.len() == text.len() {
        return truncated;
    }

    match truncated.rfind(char::is_whitespace) {
        Some(last_space) => format!("{}...", truncated[..last_space].trim_end()),
        None => format!("{}...", truncated),
    }
}
