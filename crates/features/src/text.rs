//! Text normalization applied symmetrically to both sides of a comparison.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Lowercase, strip punctuation and collapse whitespace.
pub fn clean_paragraph(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split cleaned text into word tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    clean_paragraph(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Supplies synonyms for a single lowercase word.
pub trait SynonymSource: Send + Sync {
    fn synonyms(&self, word: &str) -> &[String];
}

/// Expands nothing; expanded text equals cleaned text.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSynonyms;

impl SynonymSource for NoSynonyms {
    fn synonyms(&self, _word: &str) -> &[String] {
        &[]
    }
}

/// Word → synonyms lookup, loadable from a JSON object.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SynonymTable {
    entries: HashMap<String, Vec<String>>,
}

impl SynonymTable {
    pub fn insert(&mut self, word: impl Into<String>, synonyms: Vec<String>) {
        let synonyms = synonyms.iter().map(|s| clean_paragraph(s)).collect();
        self.entries.insert(clean_paragraph(&word.into()), synonyms);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SynonymSource for SynonymTable {
    fn synonyms(&self, word: &str) -> &[String] {
        self.entries.get(word).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Clean `text`, then append synonyms of each token not already present.
pub fn expand_synonyms(text: &str, source: &dyn SynonymSource) -> String {
    let cleaned = clean_paragraph(text);
    let mut seen: HashSet<&str> = cleaned.split_whitespace().collect();
    let mut extra = Vec::new();

    for token in cleaned.split_whitespace() {
        for synonym in source.synonyms(token) {
            if seen.insert(synonym.as_str()) {
                extra.push(synonym.as_str());
            }
        }
    }

    if extra.is_empty() {
        return cleaned;
    }
    format!("{} {}", cleaned, extra.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_paragraph() {
        assert_eq!(clean_paragraph("  Joe's Car-Repair,  Inc. "), "joes carrepair inc");
        assert_eq!(clean_paragraph("Main St Vet"), "main st vet");
        assert_eq!(clean_paragraph("!!!"), "");
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("We treat animals."), vec!["we", "treat", "animals"]);
    }

    #[test]
    fn test_expand_without_source_is_cleaned_text() {
        assert_eq!(expand_synonyms("Pet Clinic!", &NoSynonyms), "pet clinic");
    }

    #[test]
    fn test_expand_appends_new_synonyms_once() {
        let mut table = SynonymTable::default();
        table.insert("vet", vec!["veterinarian".into(), "animal".into()]);
        table.insert("animals", vec!["animal".into(), "pets".into()]);

        let expanded = expand_synonyms("Vet for animals", &table);
        assert_eq!(expanded, "vet for animals veterinarian animal pets");
    }

    #[test]
    fn test_synonym_table_from_json() {
        let table: SynonymTable = serde_json::from_str(r#"{"diner": ["restaurant"]}"#).unwrap();
        assert_eq!(table.synonyms("diner"), &["restaurant".to_string()]);
        assert!(table.synonyms("bank").is_empty());
    }
}
