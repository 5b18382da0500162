//! API error type.
//!
//! Every failure leaves the server as `{"error": {code, message, details?}}`.
//! Validation failures carry the full issue list in `details.issues`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use oraculo_audit::{AuditError, ReportError};
use oraculo_rules::catalog::CatalogError;
use oraculo_rules::ValidationError;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable code, e.g. `VALIDATION_ERROR`, `CONFLICT`.
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Rule set source failed validation (422).
    #[error("{0}")]
    Validation(ValidationError),

    /// Semantically invalid request parameters (422).
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A collaborator is not configured (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Logged, never returned verbatim (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "BAD_REQUEST"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation(e) => Some(serde_json::json!({ "issues": e.issues })),
            _ => None,
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(e: AuditError) -> Self {
        match e {
            AuditError::Validation(v) => Self::Validation(v),
            AuditError::InvalidRequest(m) => Self::BadRequest(m),
            AuditError::Conflict(m) => Self::Conflict(m),
            AuditError::NotFound(m) => Self::NotFound(m),
            AuditError::Report(ReportError::NotConfigured) => {
                Self::ServiceUnavailable(ReportError::NotConfigured.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(slug) => Self::NotFound(format!("rule pack '{slug}' not found")),
            CatalogError::Invalid(v) => Self::Validation(v),
            CatalogError::Io(io) => Self::Internal(io.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            _ => tracing::debug!(error = %self, status = status.as_u16(), "request rejected"),
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_audit_errors_to_statuses() {
        let cases = [
            (AuditError::Conflict("busy".into()), StatusCode::CONFLICT),
            (AuditError::NotFound("run".into()), StatusCode::NOT_FOUND),
            (AuditError::InvalidRequest("range".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AuditError::Report(ReportError::NotConfigured), StatusCode::SERVICE_UNAVAILABLE),
            (
                AuditError::Report(ReportError::Failed("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn validation_details_list_every_issue() {
        let err = oraculo_rules::parse_ruleset("- id: a\n- id: a\n").unwrap_err();
        let count = err.issues.len();
        let api = ApiError::from(err);
        let details = api.details().unwrap();
        assert_eq!(details["issues"].as_array().unwrap().len(), count);
    }
}
