//! Audit run and finding records.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use oraculo_core::DateRange;
use oraculo_rules::{EvaluationDiagnostic, RuleMatch, Severity};

use crate::error::AuditError;
use crate::summary::AuditSummary;

/// Longest accepted organization id.
pub const MAX_ORG_ID_LEN: usize = 64;

/// Organization ids name files on disk: ASCII letters, digits, `-` and `_` only.
pub fn check_org_id(org_id: &str) -> Result<(), AuditError> {
    let ok = !org_id.is_empty()
        && org_id.len() <= MAX_ORG_ID_LEN
        && org_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(AuditError::InvalidRequest(format!(
            "invalid organization id '{org_id}': use 1-{MAX_ORG_ID_LEN} letters, digits, '-' or '_'"
        )))
    }
}

/// Run lifecycle: `queued → processing → {done, failed}`. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl RunStatus {
    /// Queued or processing: holds the organization's run lock.
    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Processing => "processing",
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete rule violation on one invoice (or invoice item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFinding {
    /// Sequential within the run, starting at 1.
    pub id: u64,
    pub invoice_id: String,
    pub rule_id: String,
    pub inconsistency_code: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_seq: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default)]
    pub evidence: BTreeMap<String, serde_json::Value>,
}

impl AuditFinding {
    pub fn from_match(id: u64, invoice_id: &str, m: RuleMatch) -> Self {
        Self {
            id,
            invoice_id: invoice_id.to_string(),
            rule_id: m.rule_id,
            inconsistency_code: m.inconsistency_code,
            severity: m.severity,
            message: m.message,
            suggestion_code: m.suggestion_code,
            item_seq: m.item_seq,
            references: m.references,
            evidence: m.evidence,
        }
    }
}

/// One execution of the engine over a date range of invoices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRun {
    pub id: String,
    pub org_id: String,
    pub status: RunStatus,
    pub date_range: DateRange,
    /// Effective rule set label, e.g. `baseline@3+override@1`.
    pub ruleset_version_used: String,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub findings: Vec<AuditFinding>,
    #[serde(default)]
    pub summary: Option<AuditSummary>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub diagnostics: Vec<EvaluationDiagnostic>,
}

impl AuditRun {
    pub fn queued(org_id: &str, date_range: DateRange, ruleset_version_used: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            status: RunStatus::Queued,
            date_range,
            ruleset_version_used,
            requested_at: Utc::now(),
            started_at: None,
            finished_at: None,
            findings: Vec::new(),
            summary: None,
            error: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn mark_processing(&mut self) {
        self.status = RunStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_done(
        &mut self,
        findings: Vec<AuditFinding>,
        diagnostics: Vec<EvaluationDiagnostic>,
        summary: AuditSummary,
    ) {
        self.status = RunStatus::Done;
        self.findings = findings;
        self.diagnostics = diagnostics;
        self.summary = Some(summary);
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    /// Failed runs keep no findings and no summary.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.findings.clear();
        self.diagnostics.clear();
        self.summary = None;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn overview(&self) -> AuditRunOverview {
        AuditRunOverview {
            id: self.id.clone(),
            org_id: self.org_id.clone(),
            status: self.status,
            date_range: self.date_range,
            ruleset_version_used: self.ruleset_version_used.clone(),
            requested_at: self.requested_at,
            finished_at: self.finished_at,
            finding_count: self.findings.len(),
            summary: self.summary.clone(),
            error: self.error.clone(),
        }
    }
}

/// List entry for an organization's runs (no findings payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRunOverview {
    pub id: String,
    pub org_id: String,
    pub status: RunStatus,
    pub date_range: DateRange,
    pub ruleset_version_used: String,
    pub requested_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub finding_count: usize,
    pub summary: Option<AuditSummary>,
    pub error: Option<String>,
}
