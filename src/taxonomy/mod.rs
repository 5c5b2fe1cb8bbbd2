pub mod stance;

pub use stance::*;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};

/// Built-in taxonomy asset (11 stance labels, 10 categories)
pub const DEFAULT_TAXONOMY_TOML: &str = include_str!("../../assets/taxonomy_v11.toml");

/// A versioned category/stance enumeration shared by prompt construction and
/// stance canonicalization
#[derive(Debug, Clone, Deserialize)]
pub struct Taxonomy {
    pub version: String,
    pub categories: Vec<String>,
    pub stance: StanceTaxonomy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StanceTaxonomy {
    /// Canonical labels, in the order they are offered to the model
    pub labels: Vec<String>,
    /// Label used when the model gives no stance at all
    pub fallback: String,
    /// Canonical label -> raw phrases that map to it
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,
}

impl Taxonomy {
    /// The taxonomy shipped with the crate
    pub fn builtin() -> PipelineResult<Self> {
        Self::from_toml_str(DEFAULT_TAXONOMY_TOML)
    }

    pub fn from_toml_str(raw: &str) -> PipelineResult<Self> {
        let taxonomy: Taxonomy = toml::from_str(raw)?;
        taxonomy.validate()?;
        Ok(taxonomy)
    }

    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
            .map_err(|e| PipelineError::Config(format!("taxonomy {}: {}", path.display(), e)))
    }

    /// Load from `path` if given, otherwise use the built-in taxonomy
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    /// Check that every label referenced by the table is a declared label and
    /// that no phrase is claimed by two labels
    pub fn validate(&self) -> PipelineResult<()> {
        let stance = &self.stance;
        if stance.labels.is_empty() {
            return Err(PipelineError::Config(format!(
                "taxonomy {} declares no stance labels",
                self.version
            )));
        }
        if !stance.labels.contains(&stance.fallback) {
            return Err(PipelineError::Config(format!(
                "fallback stance {:?} is not a declared label",
                stance.fallback
            )));
        }

        let mut owners: HashMap<&str, &str> = HashMap::new();
        for (label, phrases) in &stance.synonyms {
            if !stance.labels.contains(label) {
                return Err(PipelineError::Config(format!(
                    "synonym target {:?} is not a declared label",
                    label
                )));
            }
            for phrase in phrases {
                if phrase.is_empty() {
                    return Err(PipelineError::Config(format!(
                        "empty synonym phrase for label {:?}",
                        label
                    )));
                }
                if let Some(other) = owners.insert(phrase.as_str(), label.as_str()) {
                    if other != label {
                        return Err(PipelineError::Config(format!(
                            "phrase {:?} maps to both {:?} and {:?}",
                            phrase, other, label
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Categories formatted for the prompt (`A / B / C`)
    pub fn categories_prompt_list(&self) -> String {
        self.categories.join(" / ")
    }

    /// Stance labels formatted for the prompt, one per line
    pub fn stances_prompt_list(&self) -> String {
        self.stance
            .labels
            .iter()
            .map(|label| format!(" {}", label))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn canonicalizer(&self) -> StanceCanonicalizer {
        StanceCanonicalizer::from_taxonomy(self)
    }
}
