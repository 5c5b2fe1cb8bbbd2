use std::cmp::Reverse;

use crate::models::NULL_FIELD;

use super::Taxonomy;

/// Maps free-form stance phrases onto canonical labels
///
/// Lookup is by substring containment, trying the longest phrase first so a
/// compound like "前向きに検討" wins over the "前向き" it contains.
#[derive(Debug, Clone)]
pub struct StanceCanonicalizer {
    /// (phrase, label), longest phrase first
    entries: Vec<(String, String)>,
    fallback: String,
}

impl StanceCanonicalizer {
    pub fn new<I, P, L>(entries: I, fallback: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (P, L)>,
        P: Into<String>,
        L: Into<String>,
    {
        let mut entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(phrase, label)| (phrase.into(), label.into()))
            .filter(|(phrase, _)| !phrase.is_empty())
            .collect();
        // ties broken lexically so lookup never depends on table order
        entries.sort_by(|a, b| {
            (Reverse(a.0.chars().count()), &a.0).cmp(&(Reverse(b.0.chars().count()), &b.0))
        });
        entries.dedup_by(|a, b| a.0 == b.0);

        Self {
            entries,
            fallback: fallback.into(),
        }
    }

    pub fn from_taxonomy(taxonomy: &Taxonomy) -> Self {
        let entries = taxonomy
            .stance
            .synonyms
            .iter()
            .flat_map(|(label, phrases)| phrases.iter().map(move |p| (p.clone(), label.clone())));
        Self::new(entries, taxonomy.stance.fallback.clone())
    }

    /// Canonical label for `raw`, or `raw` trimmed if no phrase matches
    ///
    /// Only an empty value or a bare `NULL` (any case) maps to the fallback.
    pub fn normalize(&self, raw: &str) -> String {
        if raw.is_empty() || raw.eq_ignore_ascii_case(NULL_FIELD) {
            return self.fallback.clone();
        }

        self.entries
            .iter()
            .find(|(phrase, _)| raw.contains(phrase.as_str()))
            .map(|(_, label)| label.clone())
            .unwrap_or_else(|| raw.trim().to_string())
    }
}
