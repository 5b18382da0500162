//! Report rendering seam.
//!
//! PDF/XLSX generation happens outside the engine. The orchestrator hands a
//! finished run to a [`ReportRenderer`]; without one configured, requests
//! fail with [`ReportError::NotConfigured`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::AuditRun;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Xlsx,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(ReportFormat::Pdf),
            "xlsx" => Ok(ReportFormat::Xlsx),
            other => Err(format!("unsupported report format '{other}', expected 'pdf' or 'xlsx'")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report renderer is not configured")]
    NotConfigured,

    #[error("report rendering failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, format: ReportFormat, run: &AuditRun) -> Result<Vec<u8>, ReportError>;
}

/// Placeholder used when no renderer is wired in.
pub struct UnconfiguredRenderer;

#[async_trait]
impl ReportRenderer for UnconfiguredRenderer {
    async fn render(&self, _format: ReportFormat, _run: &AuditRun) -> Result<Vec<u8>, ReportError> {
        Err(ReportError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("PDF".parse::<ReportFormat>().unwrap(), ReportFormat::Pdf);
        assert!("xlsx".parse::<ReportFormat>().unwrap().content_type().contains("spreadsheetml"));
        assert!("csv".parse::<ReportFormat>().is_err());
    }
}
