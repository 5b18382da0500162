//! Summary aggregation over a run's findings.
//!
//! Every statistic is a commutative reduction, so the summary does not
//! depend on the order findings were produced in.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use oraculo_rules::{Metadata, Severity};

use crate::model::AuditFinding;

/// Default number of entries in [`AuditSummary::top_rules`].
pub const DEFAULT_TOP_RULES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub processed_invoices: u64,
    pub total_findings: u64,
    pub invoices_with_findings: u64,
    /// Only severities that occur; absent ones are omitted, not zero-filled.
    pub severity_breakdown: BTreeMap<Severity, u64>,
    /// Ordered by count descending, then rule id ascending.
    pub top_rules: Vec<TopRule>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopRule {
    pub rule_id: String,
    pub inconsistency_code: String,
    pub severity: Severity,
    /// Representative message: the lexicographically smallest one.
    pub message: String,
    pub count: u64,
}

/// Reduce findings into a summary. `processed_invoices` counts every invoice
/// considered, with or without findings.
pub fn summarize(
    findings: &[AuditFinding],
    processed_invoices: usize,
    top_n: usize,
    metadata: Metadata,
) -> AuditSummary {
    let mut severity_breakdown: BTreeMap<Severity, u64> = BTreeMap::new();
    let mut invoices: BTreeSet<&str> = BTreeSet::new();
    let mut by_rule: HashMap<&str, TopRule> = HashMap::new();

    for f in findings {
        *severity_breakdown.entry(f.severity).or_insert(0) += 1;
        invoices.insert(f.invoice_id.as_str());

        by_rule
            .entry(f.rule_id.as_str())
            .and_modify(|t| {
                t.count += 1;
                t.severity = t.severity.max(f.severity);
                if f.inconsistency_code < t.inconsistency_code {
                    t.inconsistency_code = f.inconsistency_code.clone();
                }
                if f.message < t.message {
                    t.message = f.message.clone();
                }
            })
            .or_insert_with(|| TopRule {
                rule_id: f.rule_id.clone(),
                inconsistency_code: f.inconsistency_code.clone(),
                severity: f.severity,
                message: f.message.clone(),
                count: 1,
            });
    }

    let mut top_rules: Vec<TopRule> = by_rule.into_values().collect();
    top_rules.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.rule_id.cmp(&b.rule_id)));
    top_rules.truncate(top_n);

    AuditSummary {
        processed_invoices: processed_invoices as u64,
        total_findings: findings.len() as u64,
        invoices_with_findings: invoices.len() as u64,
        severity_breakdown,
        top_rules,
        metadata,
    }
}
