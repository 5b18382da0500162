//! Request/response types for the rule set API.

use serde::{Deserialize, Serialize};

use oraculo_audit::OrgRuleSetView;
use oraculo_rules::catalog::{LoadResult, LoadStatus};
use oraculo_rules::{RuleSet, ValidationIssue};

/// Body of `PUT rules/baseline` and `PUT rules/org/{orgId}`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveRuleSetRequest {
    /// YAML rule set document.
    pub source_text: String,
    /// Display name; falls back to the document's `name`.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub source_text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedBaselineResponse {
    pub ruleset: RuleSet,
    pub warnings: Vec<ValidationIssue>,
}

/// The organization view plus advisory warnings from the save.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedOrgRuleSetResponse {
    #[serde(flatten)]
    pub view: OrgRuleSetView,
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackLoadEntry {
    pub path: String,
    /// `loaded`, `skipped` or `failed`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<LoadResult> for PackLoadEntry {
    fn from(r: LoadResult) -> Self {
        let path = r.path.display().to_string();
        match r.status {
            LoadStatus::Loaded { slug } => Self { path, status: "loaded", slug: Some(slug), detail: None },
            LoadStatus::Skipped { reason } => Self { path, status: "skipped", slug: None, detail: Some(reason) },
            LoadStatus::Failed { error } => Self { path, status: "failed", slug: None, detail: Some(error) },
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    /// Packs available after the reload, embedded pack included.
    pub packs: usize,
    pub files: Vec<PackLoadEntry>,
}
