//! Per-invoice rule evaluation.
//!
//! A rule with `scope: invoice` is evaluated once per invoice; a rule with
//! `scope: item` once per line item, in item order. Evaluation is pure:
//! the same rule and invoice always yield the same matches in the same
//! order.
//!
//! Problems that only show up against real data (an unknown field, an item
//! field in an invoice-scoped rule, a numeric comparison on text) do not
//! abort anything. The rule simply does not fire for that invoice or item
//! and an [`EvaluationDiagnostic`] is recorded instead.

mod predicate;
pub mod template;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use oraculo_core::{Invoice, InvoiceItem};

use crate::schema::{Operator, RuleDefinition, Scope, Severity};

use predicate::{eval_condition, EvalContext};
use template::MessageRenderer;

// ── Errors and outputs ──────────────────────────────────────────────

/// Why a condition could not be evaluated against a given invoice or item.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown field '{field}'")]
    UnknownField { field: String },

    #[error("'{field}' is an item field but the rule has invoice scope")]
    ItemFieldOutsideItemScope { field: String },

    #[error("operator '{op}' cannot be applied to '{field}' holding {found}")]
    TypeMismatch {
        field: String,
        op: Operator,
        found: String,
    },
}

impl EvalError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EvalError::UnknownField { .. } => "unknown_field",
            EvalError::ItemFieldOutsideItemScope { .. } => "scope_mismatch",
            EvalError::TypeMismatch { .. } => "type_mismatch",
        }
    }
}

/// A recorded evaluation problem, attributed to rule, invoice and item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDiagnostic {
    pub rule_id: String,
    pub invoice_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_seq: Option<u32>,
    pub code: String,
    pub message: String,
}

/// A rule that fired, before it is stamped with a finding id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    pub rule_id: String,
    pub inconsistency_code: String,
    pub severity: Severity,
    /// Rendered message.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_code: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_seq: Option<u32>,
    /// Field values the condition read, keyed by field path.
    #[serde(default)]
    pub evidence: BTreeMap<String, serde_json::Value>,
}

/// Everything produced by evaluating rules against one invoice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    pub matches: Vec<RuleMatch>,
    pub diagnostics: Vec<EvaluationDiagnostic>,
}

impl RuleOutcome {
    fn extend(&mut self, other: RuleOutcome) {
        self.matches.extend(other.matches);
        self.diagnostics.extend(other.diagnostics);
    }
}

// ── Rule evaluator ──────────────────────────────────────────────────

/// Evaluates rules against invoices. Cheap to share across threads.
#[derive(Debug, Default)]
pub struct RuleEvaluator {
    renderer: MessageRenderer,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self {
            renderer: MessageRenderer::new(),
        }
    }

    /// Evaluate one rule against one invoice. Disabled rules never fire.
    pub fn evaluate(&self, rule: &RuleDefinition, invoice: &Invoice) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        if rule.disabled {
            return outcome;
        }

        match rule.scope {
            Scope::Invoice => self.evaluate_target(rule, invoice, None, &mut outcome),
            Scope::Item => {
                for item in &invoice.items {
                    self.evaluate_target(rule, invoice, Some(item), &mut outcome);
                }
            }
        }
        outcome
    }

    /// Evaluate an ordered rule list against one invoice. Matches come out
    /// grouped by rule, in rule order.
    pub fn evaluate_all(&self, rules: &[RuleDefinition], invoice: &Invoice) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        for rule in rules {
            outcome.extend(self.evaluate(rule, invoice));
        }
        outcome
    }

    fn evaluate_target(
        &self,
        rule: &RuleDefinition,
        invoice: &Invoice,
        item: Option<&InvoiceItem>,
        outcome: &mut RuleOutcome,
    ) {
        let mut ctx = EvalContext::new(invoice, item);
        let fired = match &rule.condition {
            None => Ok(true),
            Some(condition) => eval_condition(condition, &mut ctx),
        };

        match fired {
            Ok(true) => outcome.matches.push(self.build_match(rule, invoice, item, ctx.evidence)),
            Ok(false) => {}
            Err(e) => {
                tracing::debug!(rule = %rule.id, invoice = %invoice.id, error = %e, "rule evaluation diagnostic");
                outcome.diagnostics.push(EvaluationDiagnostic {
                    rule_id: rule.id.clone(),
                    invoice_id: invoice.id.clone(),
                    item_seq: item.map(|i| i.seq),
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    fn build_match(
        &self,
        rule: &RuleDefinition,
        invoice: &Invoice,
        item: Option<&InvoiceItem>,
        evidence: BTreeMap<String, serde_json::Value>,
    ) -> RuleMatch {
        let mut ctx = serde_json::json!({
            "invoice": invoice.to_context(),
            "rule": { "id": rule.id, "name": rule.name },
        });
        if let (Some(item), Some(obj)) = (item, ctx.as_object_mut()) {
            obj.insert("item".to_string(), item.to_context());
        }

        let then = &rule.consequence;
        RuleMatch {
            rule_id: rule.id.clone(),
            inconsistency_code: then.inconsistency_code.clone(),
            severity: then.severity,
            message: self.renderer.render(&then.message, &ctx),
            suggestion_code: then.suggestion_code.clone(),
            references: then.references.clone(),
            item_seq: item.map(|i| i.seq),
            evidence,
        }
    }
}
