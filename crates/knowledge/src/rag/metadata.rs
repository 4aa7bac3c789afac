//! Answers to catalog questions (candidates, abbreviations, party listing).
//!
//! No retrieval and no generation: everything comes from the `PartyCatalog`.

use crate::catalog::PartyCatalog;
use std::collections::BTreeSet;

/// Reply when the question names nothing the catalog can answer.
pub const UNRECOGNIZED_METADATA: &str =
    "No pude identificar exactamente qué información necesitas. ¿Podrías ser más específico?";

/// Candidate name parts shorter than this are ignored when matching.
const MIN_NAME_PART_CHARS: usize = 5;

/// Answer a metadata question from the catalog.
pub fn answer_from_catalog(question: &str, catalog: &PartyCatalog) -> String {
    let lower = question.to_lowercase();
    let words: BTreeSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let asks = |keyword: &str| words.iter().any(|w| w.starts_with(keyword));

    let mut parts: Vec<String> = Vec::new();

    // Candidate named by any distinctive part of their name.
    for party in catalog.parties() {
        let named = party
            .candidate
            .to_lowercase()
            .split_whitespace()
            .filter(|part| part.chars().count() >= MIN_NAME_PART_CHARS)
            .any(|part| words.contains(part));
        if named {
            parts.push(format!(
                "{} es el candidato presidencial del partido {} ({}).",
                party.candidate, party.name, party.abbreviation
            ));
        }
    }

    // Party named by abbreviation.
    for party in catalog.parties() {
        if !words.contains(party.abbreviation.to_lowercase().as_str()) {
            continue;
        }
        if asks("candidat") {
            parts.push(format!(
                "El candidato presidencial del {} ({}) es {}.",
                party.name, party.abbreviation, party.candidate
            ));
        } else if asks("nombre") || asks("significa") {
            parts.push(format!("{} significa {}.", party.abbreviation, party.name));
        } else if asks("partido") && parts.is_empty() {
            parts.push(format!(
                "El {} ({}) tiene como candidato presidencial a {}.",
                party.name, party.abbreviation, party.candidate
            ));
        }
    }

    // Party named in full.
    if parts.is_empty() {
        for party in catalog.parties() {
            if !lower.contains(&party.name.to_lowercase()) {
                continue;
            }
            if asks("candidat") {
                parts.push(format!(
                    "El candidato presidencial del {} es {}.",
                    party.name, party.candidate
                ));
            } else if asks("sigla") || asks("abreviatura") {
                parts.push(format!("La sigla del {} es {}.", party.name, party.abbreviation));
            }
        }
    }

    if !parts.is_empty() {
        return parts.join("\n");
    }

    if words.contains("candidatos") || words.contains("partidos") {
        return party_listing(catalog);
    }

    UNRECOGNIZED_METADATA.to_string()
}

/// Every party with its candidate, as a markdown list.
pub fn party_listing(catalog: &PartyCatalog) -> String {
    let lines: Vec<String> = catalog
        .parties()
        .iter()
        .map(|p| format!("- **{}** ({}): {}", p.abbreviation, p.name, p.candidate))
        .collect();

    format!(
        "Los {} partidos inscritos para las elecciones de Costa Rica 2026 son:\n\n{}",
        catalog.len(),
        lines.join("\n")
    )
}
