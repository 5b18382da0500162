//! OpenAPI documentation aggregator, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "oraculo API",
        version = "0.1.0",
        description = "Tax-audit rule composition and evaluation engine.",
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Rules", description = "Baseline and organization rule sets, validation and the rule pack catalog"),
        (name = "Audits", description = "Audit runs, findings, baseline summaries and reports"),
    ),
    paths(
        // Health
        crate::api::health::health,
        // Rules
        crate::rules::get_baseline,
        crate::rules::put_baseline,
        crate::rules::get_org_rules,
        crate::rules::put_org_rules,
        crate::rules::validate_rules,
        crate::rules::list_catalog,
        crate::rules::get_catalog_pack,
        crate::rules::reload_catalog,
        // Audits
        crate::audits::run_audit,
        crate::audits::list_audits,
        crate::audits::get_audit,
        crate::audits::get_findings,
        crate::audits::baseline_summary,
        crate::audits::pin_baseline,
        crate::audits::unpin_baseline,
        crate::audits::get_report,
    ),
    components(schemas(
        crate::api::error::ErrorBody,
        crate::api::error::ErrorDetail,
        crate::api::health::HealthResponse,
        crate::rules::SaveRuleSetRequest,
        crate::rules::ValidateRequest,
        crate::rules::ReloadResponse,
        crate::rules::PackLoadEntry,
        crate::audits::RunAuditRequest,
        crate::audits::UnpinResponse,
    ))
)]
pub struct ApiDoc;
