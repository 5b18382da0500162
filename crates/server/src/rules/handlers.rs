//! Axum handlers for rule sets and rule packs.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use tracing::info;

use oraculo_audit::OrgRuleSetView;
use oraculo_rules::catalog::RulePack;
use oraculo_rules::{validate_source, RuleSet, ValidationReport};

use crate::api::ApiError;
use crate::state::AppState;

use super::types::{
    PackLoadEntry, ReloadResponse, SaveRuleSetRequest, SavedBaselineResponse, SavedOrgRuleSetResponse,
    ValidateRequest,
};

// ── Baseline ────────────────────────────────────────────────────────

/// Current global baseline rule set.
#[utoipa::path(
    get,
    path = "/rules/baseline",
    tag = "Rules",
    responses(
        (status = 200, description = "Latest baseline revision", body = Object),
        (status = 404, description = "No baseline saved", body = crate::api::error::ErrorBody)
    )
)]
pub(crate) async fn get_baseline(State(state): State<Arc<AppState>>) -> Result<Json<RuleSet>, ApiError> {
    Ok(Json(state.rulesets.baseline()?))
}

/// Replace the global baseline with a new revision.
#[utoipa::path(
    put,
    path = "/rules/baseline",
    tag = "Rules",
    request_body = SaveRuleSetRequest,
    responses(
        (status = 200, description = "Stored revision and warnings", body = Object),
        (status = 422, description = "Source text failed validation", body = crate::api::error::ErrorBody)
    )
)]
pub(crate) async fn put_baseline(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveRuleSetRequest>,
) -> Result<Json<SavedBaselineResponse>, ApiError> {
    let saved = state.rulesets.save_baseline(&req.source_text, req.name.as_deref())?;
    info!(version = saved.ruleset.version, rules = saved.ruleset.rule_count(), "baseline replaced");
    Ok(Json(SavedBaselineResponse {
        ruleset: saved.ruleset,
        warnings: saved.warnings,
    }))
}

// ── Organization override ───────────────────────────────────────────

/// Baseline, override and the composed effective rule set of an organization.
#[utoipa::path(
    get,
    path = "/rules/org/{org_id}",
    tag = "Rules",
    params(("org_id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Organization rule view", body = Object),
        (status = 404, description = "No baseline saved", body = crate::api::error::ErrorBody),
        (status = 422, description = "Malformed organization ID", body = crate::api::error::ErrorBody)
    )
)]
pub(crate) async fn get_org_rules(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
) -> Result<Json<OrgRuleSetView>, ApiError> {
    Ok(Json(state.rulesets.org_view(&org_id)?))
}

/// Store a new override revision and return the recomposed view.
#[utoipa::path(
    put,
    path = "/rules/org/{org_id}",
    tag = "Rules",
    params(("org_id" = String, Path, description = "Organization ID")),
    request_body = SaveRuleSetRequest,
    responses(
        (status = 200, description = "Recomposed organization rule view", body = Object),
        (status = 422, description = "Source text failed validation", body = crate::api::error::ErrorBody)
    )
)]
pub(crate) async fn put_org_rules(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    Json(req): Json<SaveRuleSetRequest>,
) -> Result<Json<SavedOrgRuleSetResponse>, ApiError> {
    let saved = state
        .rulesets
        .save_override(&org_id, &req.source_text, req.name.as_deref())?;
    info!(org_id = %org_id, version = saved.ruleset.version, "organization override saved");
    let view = state.rulesets.org_view(&org_id)?;
    Ok(Json(SavedOrgRuleSetResponse {
        view,
        warnings: saved.warnings,
    }))
}

/// Validate source text without storing it. Always 200; see `valid`.
#[utoipa::path(
    post,
    path = "/rules/validate",
    tag = "Rules",
    request_body = ValidateRequest,
    responses(
        (status = 200, description = "Every error and warning found", body = Object)
    )
)]
pub(crate) async fn validate_rules(Json(req): Json<ValidateRequest>) -> Json<ValidationReport> {
    Json(validate_source(&req.source_text))
}

// ── Catalog ─────────────────────────────────────────────────────────

/// Reusable rule packs, ordered by slug.
#[utoipa::path(
    get,
    path = "/rules/catalog",
    tag = "Rules",
    responses(
        (status = 200, description = "Rule packs", body = Object)
    )
)]
pub(crate) async fn list_catalog(State(state): State<Arc<AppState>>) -> Json<Vec<RulePack>> {
    Json(state.catalog.list())
}

#[utoipa::path(
    get,
    path = "/rules/catalog/{slug}",
    tag = "Rules",
    params(("slug" = String, Path, description = "Pack slug")),
    responses(
        (status = 200, description = "Rule pack", body = Object),
        (status = 404, description = "Unknown pack", body = crate::api::error::ErrorBody)
    )
)]
pub(crate) async fn get_catalog_pack(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<RulePack>, ApiError> {
    Ok(Json(state.catalog.get(&slug)?))
}

/// Rescan the rule pack directory.
#[utoipa::path(
    post,
    path = "/rules/catalog/reload",
    tag = "Rules",
    responses(
        (status = 200, description = "Per-file load results", body = ReloadResponse)
    )
)]
pub(crate) async fn reload_catalog(State(state): State<Arc<AppState>>) -> Result<Json<ReloadResponse>, ApiError> {
    let results = state.catalog.reload()?;
    Ok(Json(ReloadResponse {
        packs: state.catalog.list().len(),
        files: results.into_iter().map(PackLoadEntry::from).collect(),
    }))
}
