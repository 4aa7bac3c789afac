//! Party catalog: the fixed registry of known parties.
//!
//! Loaded once at startup and shared read-only (`Arc<PartyCatalog>`) with the
//! classifier, extractor, strategy selector and metadata answering.

use planes_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

const BUNDLED_CATALOG: &str = include_str!("../data/parties.yml");

/// A registered political party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Party code, e.g. "PLN"
    pub abbreviation: String,
    /// Full registered name
    pub name: String,
    /// Presidential candidate
    pub candidate: String,
    /// Official registry page
    #[serde(default)]
    pub site: String,
    /// Government plan file name
    #[serde(default)]
    pub plan: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    parties: Vec<Party>,
}

/// Immutable set of known parties, in catalog order.
#[derive(Debug, Clone)]
pub struct PartyCatalog {
    parties: Vec<Party>,
    by_code: HashMap<String, usize>,
}

impl PartyCatalog {
    /// The catalog shipped with the binary.
    pub fn bundled() -> AppResult<Self> {
        Self::from_yaml_str(BUNDLED_CATALOG)
    }

    /// Load a catalog from a YAML file with a top-level `parties` list.
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Knowledge(format!("Failed to read catalog {:?}: {}", path, e))
        })?;
        let catalog = Self::from_yaml_str(&contents)?;
        tracing::info!(parties = catalog.len(), "Loaded party catalog from {:?}", path);
        Ok(catalog)
    }

    pub fn from_yaml_str(contents: &str) -> AppResult<Self> {
        let file: CatalogFile = serde_yaml::from_str(contents)
            .map_err(|e| AppError::Knowledge(format!("Failed to parse catalog: {}", e)))?;
        Self::from_parties(file.parties)
    }

    /// Build a catalog, normalizing codes to uppercase and rejecting duplicates.
    pub fn from_parties(parties: Vec<Party>) -> AppResult<Self> {
        if parties.is_empty() {
            return Err(AppError::Knowledge("Party catalog is empty".to_string()));
        }

        let mut normalized = Vec::with_capacity(parties.len());
        let mut by_code = HashMap::with_capacity(parties.len());

        for mut party in parties {
            party.abbreviation = party.abbreviation.trim().to_uppercase();
            if party.abbreviation.is_empty() {
                return Err(AppError::Knowledge(format!(
                    "Party '{}' has an empty abbreviation",
                    party.name
                )));
            }
            if by_code
                .insert(party.abbreviation.clone(), normalized.len())
                .is_some()
            {
                return Err(AppError::Knowledge(format!(
                    "Duplicate party abbreviation: {}",
                    party.abbreviation
                )));
            }
            normalized.push(party);
        }

        Ok(Self {
            parties: normalized,
            by_code,
        })
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }

    pub fn parties(&self) -> &[Party] {
        &self.parties
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.parties.iter().map(|p| p.abbreviation.as_str())
    }

    pub fn get(&self, code: &str) -> Option<&Party> {
        self.by_code.get(code).map(|&idx| &self.parties[idx])
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    /// Map a raw code (any case, padded) to the catalog's canonical code.
    pub fn normalize(&self, raw: &str) -> Option<&str> {
        let code = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '[' || c == ']')
            .trim()
            .to_uppercase();
        self.get(&code).map(|p| p.abbreviation.as_str())
    }

    /// Parties named verbatim in the text.
    ///
    /// Matches codes written in uppercase as whole words ("PLN", not "pen"),
    /// full party names and full candidate names (case-insensitive).
    pub fn mentions(&self, text: &str) -> BTreeSet<String> {
        let lower = text.to_lowercase();
        let words: BTreeSet<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        self.parties
            .iter()
            .filter(|party| {
                words.contains(party.abbreviation.as_str())
                    || lower.contains(&party.name.to_lowercase())
                    || lower.contains(&party.candidate.to_lowercase())
            })
            .map(|party| party.abbreviation.clone())
            .collect()
    }

    /// One line per party, used to ground the extraction prompt.
    pub fn prompt_listing(&self) -> String {
        self.parties
            .iter()
            .map(|p| format!("- {}: {} (candidato: {})", p.abbreviation, p.name, p.candidate))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn party(code: &str, name: &str, candidate: &str) -> Party {
        Party {
            abbreviation: code.to_string(),
            name: name.to_string(),
            candidate: candidate.to_string(),
            site: String::new(),
            plan: format!("{}.pdf", code),
        }
    }

    #[test]
    fn test_bundled_catalog() {
        let catalog = PartyCatalog::bundled().unwrap();
        assert_eq!(catalog.len(), 20);
        assert!(catalog.contains("PLN"));
        assert!(catalog.contains("CR1"));

        let pusc = catalog.get("PUSC").unwrap();
        assert_eq!(pusc.name, "Partido Unidad Social Cristiana");
        assert_eq!(pusc.plan, "PUSC.pdf");
        assert!(pusc.site.ends_with("p-PUSC"));
    }

    #[test]
    fn test_normalize() {
        let catalog = PartyCatalog::bundled().unwrap();
        assert_eq!(catalog.normalize(" pln "), Some("PLN"));
        assert_eq!(catalog.normalize("\"Pusc\""), Some("PUSC"));
        assert_eq!(catalog.normalize("XYZ"), None);
        assert_eq!(catalog.normalize(""), None);
    }

    #[test]
    fn test_mentions() {
        let catalog = PartyCatalog::bundled().unwrap();

        let found = catalog.mentions("Compara las propuestas de PLN y PUSC");
        assert_eq!(found, BTreeSet::from(["PLN".to_string(), "PUSC".to_string()]));

        let found = catalog.mentions("¿Qué dice Frente Amplio y Fabricio Alvarado Muñoz?");
        assert_eq!(found, BTreeSet::from(["FA".to_string(), "PNR".to_string()]));

        // Lowercase words that collide with codes are not mentions.
        assert!(catalog.mentions("¿qué pen-samiento tiene el pa?").is_empty());
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        let result = PartyCatalog::from_parties(vec![
            party("PLN", "Uno", "A"),
            party("pln", "Dos", "B"),
        ]);
        assert!(result.is_err());
        assert!(PartyCatalog::from_parties(Vec::new()).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "parties:\n  - abbreviation: abc\n    name: Partido ABC\n    candidate: Ana Pérez\n",
        )
        .unwrap();

        let catalog = PartyCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.codes().collect::<Vec<_>>(), vec!["ABC"]);
        assert!(catalog.prompt_listing().contains("- ABC: Partido ABC (candidato: Ana Pérez)"));
    }
}
