//! Error taxonomy for rule set storage and audit runs.

use oraculo_core::CoreError;
use oraculo_rules::{ComposeError, InvalidVersionLabel, ValidationError};

use crate::report::ReportError;

/// Persistence failures (rule set and run files).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned synchronously to callers of the audit engine.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Rule set source text failed validation. Nothing was stored.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Request parameters are malformed (date range, version label, org id, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Another run for the organization is still queued or processing.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("failed to start evaluation pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl From<CoreError> for AuditError {
    fn from(e: CoreError) -> Self {
        AuditError::InvalidRequest(e.to_string())
    }
}

impl From<InvalidVersionLabel> for AuditError {
    fn from(e: InvalidVersionLabel) -> Self {
        AuditError::InvalidRequest(e.to_string())
    }
}
