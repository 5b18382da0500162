//! Audit runs: versioned rule sets, run orchestration and summaries.
//!
//! This crate provides:
//! - A versioned rule set repository (global baseline + per-organization overrides)
//! - The audit run store with the one-active-run-per-organization lock
//! - Collaborator traits for invoice sourcing and report rendering
//! - The run orchestrator (fetch, parallel evaluation, summary, persistence)
//! - The summary aggregator and the baseline summary cache

pub mod baseline;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod ruleset_store;
pub mod run_store;
pub mod source;
pub mod summary;

mod persist;

pub use baseline::{BaselineSummary, BaselineSummaryCache};
pub use error::{AuditError, StoreError};
pub use model::*;
pub use orchestrator::{AuditOrchestrator, OrchestratorConfig};
pub use report::{ReportError, ReportFormat, ReportRenderer, UnconfiguredRenderer};
pub use ruleset_store::{OrgRuleSetView, RuleSetRepository, SavedRuleSet, Slot};
pub use run_store::RunStore;
pub use source::{FileInvoiceSource, InvoiceSource, MemoryInvoiceSource, SourceError};
pub use summary::{summarize, AuditSummary, TopRule};
