//! Invoice sourcing.
//!
//! The engine only reads invoices that some other component has already
//! materialized. [`InvoiceSource`] is the seam; the server wires a
//! [`FileInvoiceSource`] and tests use [`MemoryInvoiceSource`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use oraculo_core::{DateRange, Invoice};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed invoice data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invoice source unavailable: {0}")]
    Unavailable(String),
}

/// Provides the invoices of one organization within a date range.
#[async_trait]
pub trait InvoiceSource: Send + Sync {
    async fn fetch(&self, org_id: &str, range: &DateRange) -> Result<Vec<Invoice>, SourceError>;
}

/// In-memory invoices keyed by organization.
#[derive(Default)]
pub struct MemoryInvoiceSource {
    invoices: RwLock<HashMap<String, Vec<Invoice>>>,
}

impl MemoryInvoiceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, invoice: Invoice) {
        let mut invoices = self.invoices.write().expect("invoice lock poisoned");
        invoices.entry(invoice.org_id.clone()).or_default().push(invoice);
    }
}

#[async_trait]
impl InvoiceSource for MemoryInvoiceSource {
    async fn fetch(&self, org_id: &str, range: &DateRange) -> Result<Vec<Invoice>, SourceError> {
        let invoices = self.invoices.read().expect("invoice lock poisoned");
        Ok(invoices
            .get(org_id)
            .map(|list| {
                list.iter()
                    .filter(|inv| range.contains(inv.issue_date))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Reads `{dir}/{org_id}.json`, a JSON array of invoices.
///
/// A missing directory means the source is not mounted (unavailable); a
/// missing file means the organization has no invoices yet.
pub struct FileInvoiceSource {
    dir: PathBuf,
}

impl FileInvoiceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl InvoiceSource for FileInvoiceSource {
    async fn fetch(&self, org_id: &str, range: &DateRange) -> Result<Vec<Invoice>, SourceError> {
        if !tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Err(SourceError::Unavailable(format!(
                "invoice directory {} does not exist",
                self.dir.display()
            )));
        }

        let path = self.dir.join(format!("{org_id}.json"));
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let all: Vec<Invoice> = serde_json::from_str(&content)?;
        let total = all.len();
        let selected: Vec<Invoice> = all
            .into_iter()
            .filter(|inv| inv.org_id == org_id && range.contains(inv.issue_date))
            .collect();
        debug!(org_id, total, selected = selected.len(), %range, "invoices loaded");
        Ok(selected)
    }
}
