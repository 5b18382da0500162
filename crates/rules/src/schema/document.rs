//! Rule set documents and stored rule set revisions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RuleDefinition;

/// Free-form metadata carried alongside a rule set.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A rule set document as authored.
///
/// Accepted input shapes are a bare list of rules or a mapping with a
/// required `rules` key. Serialization always produces the mapping form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSetDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    pub rules: Vec<RuleDefinition>,
}

impl RuleSetDocument {
    /// Canonical YAML form. Parsing it again yields an equal document.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn rule(&self, id: &str) -> Option<&RuleDefinition> {
        self.rules.iter().find(|r| r.id == id)
    }
}

/// An immutable, stored revision of a rule set.
///
/// Saving new content never mutates a `RuleSet`; it appends a new one with
/// the next `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub id: String,
    pub name: String,
    /// Monotonic revision within its slot, starting at 1.
    pub version: u32,
    /// The document's own `version` label, if it declared one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// YAML exactly as submitted.
    pub source_text: String,
    pub rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl RuleSet {
    /// Build a revision from a parsed document. `fallback_name` is used when
    /// the document does not name itself.
    pub fn from_document(
        id: impl Into<String>,
        version: u32,
        fallback_name: &str,
        source_text: impl Into<String>,
        document: RuleSetDocument,
    ) -> Self {
        Self {
            id: id.into(),
            name: document.name.unwrap_or_else(|| fallback_name.to_string()),
            version,
            label: document.version,
            source_text: source_text.into(),
            rules: document.rules,
            metadata: document.metadata,
            created_at: Utc::now(),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn enabled_rule_count(&self) -> usize {
        self.rules.iter().filter(|r| r.is_enabled()).count()
    }
}
