//! Rule definition, scope, severity and consequence types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Condition;

/// What a rule iterates over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Evaluated once per invoice.
    #[default]
    Invoice,
    /// Evaluated once per invoice line item.
    Item,
}

impl Scope {
    pub const ALL: &'static [&'static str] = &["invoice", "item"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Invoice => "invoice",
            Scope::Item => "item",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "invoice" => Ok(Scope::Invoice),
            "item" => Ok(Scope::Item),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

/// Finding severity. Ordered from least to most severe.
///
/// Portuguese labels (`baixo`, `medio`, `alto`, `critico`) are accepted
/// on input; output always uses the English form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "baixo")]
    Low,
    #[serde(alias = "medio", alias = "médio")]
    Medium,
    #[serde(alias = "alto")]
    High,
    #[serde(alias = "critico", alias = "crítico")]
    Critical,
}

impl Severity {
    /// Every accepted spelling, used for suggestions.
    pub const ACCEPTED: &'static [&'static str] = &[
        "low", "medium", "high", "critical", "baixo", "medio", "alto", "critico",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "baixo" => Ok(Severity::Low),
            "medium" | "medio" | "médio" => Ok(Severity::Medium),
            "high" | "alto" => Ok(Severity::High),
            "critical" | "critico" | "crítico" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// The `then` block: what a firing rule reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Consequence {
    pub inconsistency_code: String,
    pub severity: Severity,
    /// Message template rendered against the invoice/item context.
    #[serde(alias = "message_pt")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_code: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

/// One audit rule as authored in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub scope: Scope,
    /// Disabled rules stay in the effective set but never fire.
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    /// Absent condition always holds.
    #[serde(rename = "when", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(rename = "then")]
    pub consequence: Consequence,
}

impl RuleDefinition {
    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}
