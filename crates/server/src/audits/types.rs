//! Request/response types for the audit API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use oraculo_audit::BaselineSummary;

/// Body of `POST orgs/{orgId}/audits/run`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunAuditRequest {
    /// First issue date included.
    pub date_start: NaiveDate,
    /// Last issue date included.
    pub date_end: NaiveDate,
    /// `baseline@N[+override@M]` to replay; omitted means current rules.
    #[serde(default)]
    pub ruleset_version: Option<String>,
}

/// `available: false` means no audit has finished yet, which is not the
/// same as a summary with zero findings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineSummaryResponse {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<BaselineSummary>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UnpinResponse {
    pub unpinned: bool,
}
