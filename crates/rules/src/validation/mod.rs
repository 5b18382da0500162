//! Rule set parsing with exhaustive validation.
//!
//! Parsing happens in two passes. The YAML text is first read into a loose
//! [`serde_yaml::Value`] tree and every structural problem is collected
//! (unknown keys, bad operators, missing consequences, duplicate ids, ...)
//! instead of stopping at the first one. Only when that pass is clean are the
//! rules deserialized into typed [`RuleDefinition`]s.
//!
//! Errors block a save; warnings (unknown field names, template syntax) are
//! advisory. Field names are never resolved against data here: that is the
//! evaluator's job.

mod condition_checks;
mod rule_checks;

pub mod fuzzy;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::schema::{Metadata, RuleDefinition, RuleSetDocument};

/// Deepest `all`/`any`/`not` nesting accepted in a `when` tree.
pub const MAX_CONDITION_DEPTH: usize = 16;

const DOCUMENT_KEYS: &[&str] = &["name", "version", "metadata", "rules"];

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// One problem found in a rule set document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Zero-based index of the offending rule in the `rules` list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Path-like location, e.g. `"rules[2].when.all[0].op"`.
    pub path: String,
    pub message: String,
    /// Optional "did you mean ...?" hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = &self.rule_id {
            write!(f, "[{id}] ")?;
        }
        if self.path.is_empty() {
            write!(f, "{}", self.message)?;
        } else {
            write!(f, "{}: {}", self.path, self.message)?;
        }
        if let Some(s) = &self.suggestion {
            write!(f, " ({s})")?;
        }
        Ok(())
    }
}

/// A rule set that failed validation, with every issue found.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid rule set ({} issue(s)): {}", .issues.len(), first_issue(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn first_issue(issues: &[ValidationIssue]) -> String {
    issues.first().map(|i| i.to_string()).unwrap_or_default()
}

/// A successfully parsed rule set together with its advisory warnings.
#[derive(Debug, Clone)]
pub struct ParsedRuleSet {
    pub document: RuleSetDocument,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub(crate) fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push_error(None, None, path.into(), message.into(), None);
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: Option<String>,
    ) {
        self.push_error(None, None, path.into(), message.into(), suggestion);
    }

    fn push_error(
        &mut self,
        position: Option<usize>,
        rule_id: Option<String>,
        path: String,
        message: String,
        suggestion: Option<String>,
    ) {
        self.valid = false;
        self.errors.push(ValidationIssue {
            position,
            rule_id,
            path,
            message,
            suggestion,
        });
    }

    fn push_warning(
        &mut self,
        position: Option<usize>,
        rule_id: Option<String>,
        path: String,
        message: String,
        suggestion: Option<String>,
    ) {
        self.warnings.push(ValidationIssue {
            position,
            rule_id,
            path,
            message,
            suggestion,
        });
    }

    /// Reporter that tags every issue with the rule it belongs to.
    pub(crate) fn for_rule(&mut self, position: usize, rule_id: Option<String>) -> RuleReporter<'_> {
        RuleReporter {
            report: self,
            position,
            rule_id,
        }
    }
}

/// Issue sink bound to one rule of the document.
pub(crate) struct RuleReporter<'a> {
    report: &'a mut ValidationReport,
    position: usize,
    rule_id: Option<String>,
}

impl RuleReporter<'_> {
    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.report
            .push_error(Some(self.position), self.rule_id.clone(), path.into(), message.into(), None);
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: Option<String>,
    ) {
        self.report.push_error(
            Some(self.position),
            self.rule_id.clone(),
            path.into(),
            message.into(),
            suggestion,
        );
    }

    pub(crate) fn warn(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: Option<String>,
    ) {
        self.report.push_warning(
            Some(self.position),
            self.rule_id.clone(),
            path.into(),
            message.into(),
            suggestion,
        );
    }

    pub(crate) fn error_count(&self) -> usize {
        self.report.errors.len()
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Parse and validate a rule set document.
///
/// Accepts either a bare list of rules or a mapping with `rules` (required),
/// `name`, `version` and `metadata`. An empty list is valid. On failure the
/// error lists every offending rule, not only the first.
pub fn parse_ruleset(source: &str) -> Result<ParsedRuleSet, ValidationError> {
    let (report, document) = analyze(source);
    match document {
        Some(document) if report.valid => Ok(ParsedRuleSet {
            document,
            warnings: report.warnings,
        }),
        _ => Err(ValidationError {
            issues: report.errors,
        }),
    }
}

/// Validate without keeping the parsed document.
pub fn validate_source(source: &str) -> ValidationReport {
    analyze(source).0
}

fn analyze(source: &str) -> (ValidationReport, Option<RuleSetDocument>) {
    let mut report = ValidationReport::new();

    let root: Value = match serde_yaml::from_str(source) {
        Ok(v) => v,
        Err(e) => {
            report.error("", format!("YAML parse error: {e}"));
            return (report, None);
        }
    };

    let mut header = RuleSetDocument::default();
    let raw_rules: &[Value] = match &root {
        Value::Sequence(items) => items.as_slice(),
        Value::Mapping(map) => {
            for (key, _) in map {
                match key.as_str() {
                    Some(k) if DOCUMENT_KEYS.contains(&k) => {}
                    Some(k) => report.error_with_suggestion(
                        k,
                        format!("unknown top-level key '{k}'"),
                        fuzzy::did_you_mean(k, DOCUMENT_KEYS),
                    ),
                    None => report.error("", "top-level keys must be strings"),
                }
            }
            header.name = header_text(map.get("name"), "name", &mut report);
            header.version = header_text(map.get("version"), "version", &mut report);
            header.metadata = header_metadata(map.get("metadata"), &mut report);
            match map.get("rules") {
                Some(Value::Sequence(items)) => items.as_slice(),
                Some(_) => {
                    report.error("rules", "'rules' must be a list");
                    &[]
                }
                None => {
                    report.error("rules", "missing required key 'rules'");
                    &[]
                }
            }
        }
        Value::Null => {
            report.error("", "document is empty: expected a list of rules or a mapping with 'rules'");
            &[]
        }
        _ => {
            report.error("", "document must be a list of rules or a mapping with 'rules'");
            &[]
        }
    };

    let mut seen_ids: HashMap<String, usize> = HashMap::new();
    let mut rules = Vec::with_capacity(raw_rules.len());
    for (position, raw) in raw_rules.iter().enumerate() {
        if let Some(rule) = rule_checks::check_rule(position, raw, &mut seen_ids, &mut report) {
            rules.push(rule);
        }
    }

    if !report.valid {
        return (report, None);
    }
    header.rules = rules;
    (report, Some(header))
}

fn header_text(value: Option<&Value>, key: &str, report: &mut ValidationReport) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => {
            report.error(key, format!("'{key}' must be a string"));
            None
        }
    }
}

fn header_metadata(value: Option<&Value>, report: &mut ValidationReport) -> Metadata {
    match value {
        None | Some(Value::Null) => Metadata::new(),
        Some(v @ Value::Mapping(_)) => match serde_yaml::from_value::<Metadata>(v.clone()) {
            Ok(m) => m,
            Err(e) => {
                report.error("metadata", format!("invalid metadata: {e}"));
                Metadata::new()
            }
        },
        Some(_) => {
            report.error("metadata", "'metadata' must be a mapping");
            Metadata::new()
        }
    }
}

/// Render a YAML scalar for messages.
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{s}'"),
        Value::Sequence(_) => "a list".to_string(),
        Value::Mapping(_) => "a mapping".to_string(),
        Value::Tagged(t) => format!("tagged value {}", t.tag),
    }
}

#[cfg(test)]
mod tests;
