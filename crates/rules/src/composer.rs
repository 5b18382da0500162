//! Baseline + override composition into the effective rule set.
//!
//! Composition is keyed by rule id: an override rule with a baseline id
//! replaces that rule entirely (no field-level merge) and keeps its
//! baseline position; override-only rules are appended in override order.
//! The result is a pure function of its inputs, down to the serialized
//! source text and its digest, so a recorded version label can always be
//! replayed into the exact same rule set.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::schema::{Metadata, RuleDefinition, RuleSet, RuleSetDocument};

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("failed to serialize effective rule set: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

// ── Version label ───────────────────────────────────────────────────

/// Identifies one composition: `baseline@3` or `baseline@3+override@2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectiveVersion {
    pub baseline: u32,
    pub override_version: Option<u32>,
}

impl fmt::Display for EffectiveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "baseline@{}", self.baseline)?;
        if let Some(o) = self.override_version {
            write!(f, "+override@{o}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ruleset version '{0}': expected baseline@N or baseline@N+override@M")]
pub struct InvalidVersionLabel(pub String);

impl FromStr for EffectiveVersion {
    type Err = InvalidVersionLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVersionLabel(s.to_string());
        let revision = |part: &str, prefix: &str| -> Result<u32, InvalidVersionLabel> {
            part.strip_prefix(prefix)
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .ok_or_else(invalid)
        };

        let (base, over) = match s.trim().split_once('+') {
            Some((b, o)) => (b, Some(o)),
            None => (s.trim(), None),
        };
        Ok(Self {
            baseline: revision(base, "baseline@")?,
            override_version: over.map(|o| revision(o, "override@")).transpose()?,
        })
    }
}

impl Serialize for EffectiveVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EffectiveVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Effective rule set ──────────────────────────────────────────────

/// The composed rule set that is actually evaluated. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveRuleSet {
    pub name: String,
    pub rules: Vec<RuleDefinition>,
    pub metadata: Metadata,
    /// Canonical YAML of the composed document.
    pub source_text: String,
    pub baseline_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_version: Option<u32>,
    /// Hex SHA-256 of `source_text`.
    pub digest: String,
}

impl EffectiveRuleSet {
    pub fn version(&self) -> EffectiveVersion {
        EffectiveVersion {
            baseline: self.baseline_version,
            override_version: self.override_version,
        }
    }

    pub fn rule_ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn enabled_rule_count(&self) -> usize {
        self.rules.iter().filter(|r| r.is_enabled()).count()
    }
}

/// Compose `baseline` with an optional organization override.
///
/// An override with zero rules is the explicit "no override" state and
/// yields exactly the baseline composition, including its version label.
pub fn compose(baseline: &RuleSet, override_set: Option<&RuleSet>) -> Result<EffectiveRuleSet, ComposeError> {
    let override_set = override_set.filter(|o| !o.rules.is_empty());

    let mut by_id: IndexMap<&str, &RuleDefinition> = baseline
        .rules
        .iter()
        .map(|r| (r.id.as_str(), r))
        .collect();
    let mut metadata = baseline.metadata.clone();
    let mut name = baseline.name.clone();

    if let Some(over) = override_set {
        for rule in &over.rules {
            // IndexMap::insert keeps the slot of an existing key.
            by_id.insert(rule.id.as_str(), rule);
        }
        metadata.extend(over.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        name = over.name.clone();
    }

    let version = EffectiveVersion {
        baseline: baseline.version,
        override_version: override_set.map(|o| o.version),
    };
    let rules: Vec<RuleDefinition> = by_id.into_values().cloned().collect();

    let document = RuleSetDocument {
        name: Some(name.clone()),
        version: Some(version.to_string()),
        metadata: metadata.clone(),
        rules,
    };
    let source_text = document.to_yaml()?;
    let digest = format!("{:x}", Sha256::digest(source_text.as_bytes()));

    tracing::debug!(
        version = %version,
        rules = document.rules.len(),
        digest = %digest,
        "composed effective rule set"
    );

    Ok(EffectiveRuleSet {
        name,
        rules: document.rules,
        metadata,
        source_text,
        baseline_version: version.baseline,
        override_version: version.override_version,
        digest,
    })
}
