//! Axum handlers for audit runs.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use oraculo_audit::{AuditError, AuditFinding, AuditRun, AuditRunOverview, BaselineSummary, ReportFormat};
use oraculo_core::DateRange;

use crate::api::ApiError;
use crate::state::AppState;

use super::types::{BaselineSummaryResponse, RunAuditRequest, UnpinResponse};

// ── Runs ────────────────────────────────────────────────────────────

/// Queue an audit run. Evaluation continues in the background.
#[utoipa::path(
    post,
    path = "/orgs/{org_id}/audits/run",
    tag = "Audits",
    params(("org_id" = String, Path, description = "Organization ID")),
    request_body = RunAuditRequest,
    responses(
        (status = 202, description = "Run queued", body = Object),
        (status = 404, description = "Unknown rule set version or no baseline", body = crate::api::error::ErrorBody),
        (status = 409, description = "Another run is queued or processing", body = crate::api::error::ErrorBody),
        (status = 422, description = "Invalid date range or version label", body = crate::api::error::ErrorBody)
    )
)]
pub(crate) async fn run_audit(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    Json(req): Json<RunAuditRequest>,
) -> Result<(StatusCode, Json<AuditRun>), ApiError> {
    let range = DateRange::new(req.date_start, req.date_end).map_err(AuditError::from)?;
    let (run, _handle) = state
        .orchestrator
        .request_run(&org_id, range, req.ruleset_version.as_deref())?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// Runs of an organization, newest first, without findings.
#[utoipa::path(
    get,
    path = "/orgs/{org_id}/audits",
    tag = "Audits",
    params(("org_id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Run overviews", body = Object)
    )
)]
pub(crate) async fn list_audits(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
) -> Result<Json<Vec<AuditRunOverview>>, ApiError> {
    Ok(Json(state.orchestrator.list_runs(&org_id)?))
}

/// One run with findings, summary and diagnostics.
#[utoipa::path(
    get,
    path = "/orgs/{org_id}/audits/{id}",
    tag = "Audits",
    params(
        ("org_id" = String, Path, description = "Organization ID"),
        ("id" = String, Path, description = "Run ID")
    ),
    responses(
        (status = 200, description = "Audit run", body = Object),
        (status = 404, description = "Run not found", body = crate::api::error::ErrorBody)
    )
)]
pub(crate) async fn get_audit(
    State(state): State<Arc<AppState>>,
    Path((org_id, id)): Path<(String, String)>,
) -> Result<Json<AuditRun>, ApiError> {
    Ok(Json(state.orchestrator.get_run(&org_id, &id)?))
}

#[utoipa::path(
    get,
    path = "/orgs/{org_id}/audits/{id}/findings",
    tag = "Audits",
    params(
        ("org_id" = String, Path, description = "Organization ID"),
        ("id" = String, Path, description = "Run ID")
    ),
    responses(
        (status = 200, description = "Findings in id order", body = Object),
        (status = 404, description = "Run not found", body = crate::api::error::ErrorBody)
    )
)]
pub(crate) async fn get_findings(
    State(state): State<Arc<AppState>>,
    Path((org_id, id)): Path<(String, String)>,
) -> Result<Json<Vec<AuditFinding>>, ApiError> {
    Ok(Json(state.orchestrator.findings(&org_id, &id)?))
}

// ── Baseline summary ────────────────────────────────────────────────

/// Summary of the pinned run, or of the latest done run.
#[utoipa::path(
    get,
    path = "/orgs/{org_id}/audits/baseline/summary",
    tag = "Audits",
    params(("org_id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Baseline summary, or available=false", body = Object)
    )
)]
pub(crate) async fn baseline_summary(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
) -> Result<Json<BaselineSummaryResponse>, ApiError> {
    let baseline = state.orchestrator.baseline_summary(&org_id)?;
    Ok(Json(BaselineSummaryResponse {
        available: baseline.is_some(),
        baseline,
    }))
}

/// Pin a done run as the organization's baseline.
#[utoipa::path(
    put,
    path = "/orgs/{org_id}/audits/{id}/baseline",
    tag = "Audits",
    params(
        ("org_id" = String, Path, description = "Organization ID"),
        ("id" = String, Path, description = "Run ID")
    ),
    responses(
        (status = 200, description = "Pinned baseline", body = Object),
        (status = 404, description = "Run not found", body = crate::api::error::ErrorBody),
        (status = 409, description = "Run is not done", body = crate::api::error::ErrorBody)
    )
)]
pub(crate) async fn pin_baseline(
    State(state): State<Arc<AppState>>,
    Path((org_id, id)): Path<(String, String)>,
) -> Result<Json<BaselineSummary>, ApiError> {
    Ok(Json(state.orchestrator.pin_baseline(&org_id, &id)?))
}

/// Remove the pin; the latest done run becomes the baseline again.
#[utoipa::path(
    delete,
    path = "/orgs/{org_id}/audits/baseline",
    tag = "Audits",
    params(("org_id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Whether a pin existed", body = UnpinResponse)
    )
)]
pub(crate) async fn unpin_baseline(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
) -> Result<Json<UnpinResponse>, ApiError> {
    let unpinned = state.orchestrator.unpin_baseline(&org_id)?;
    Ok(Json(UnpinResponse { unpinned }))
}

// ── Reports ─────────────────────────────────────────────────────────

/// Render a done run through the report collaborator.
#[utoipa::path(
    get,
    path = "/orgs/{org_id}/audits/{id}/reports/{format}",
    tag = "Audits",
    params(
        ("org_id" = String, Path, description = "Organization ID"),
        ("id" = String, Path, description = "Run ID"),
        ("format" = String, Path, description = "`pdf` or `xlsx`")
    ),
    responses(
        (status = 200, description = "Report bytes"),
        (status = 404, description = "Run not found", body = crate::api::error::ErrorBody),
        (status = 409, description = "Run is not done", body = crate::api::error::ErrorBody),
        (status = 422, description = "Unsupported format", body = crate::api::error::ErrorBody),
        (status = 503, description = "No report renderer configured", body = crate::api::error::ErrorBody)
    )
)]
pub(crate) async fn get_report(
    State(state): State<Arc<AppState>>,
    Path((org_id, id, format)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let format: ReportFormat = format.parse().map_err(ApiError::BadRequest)?;
    let bytes = state.orchestrator.report(&org_id, &id, format).await?;
    let disposition = format!("attachment; filename=\"audit-{id}.{format}\"");
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}
