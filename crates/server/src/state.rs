//! Shared application state.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use oraculo_audit::{
    AuditOrchestrator, BaselineSummaryCache, FileInvoiceSource, InvoiceSource, OrchestratorConfig,
    RuleSetRepository, RunStore, UnconfiguredRenderer,
};
use oraculo_core::Config;
use oraculo_rules::catalog::{LoadStatus, RulePackCatalog, DEFAULT_PACK_SOURCE};

pub struct AppState {
    pub config: Config,
    pub rulesets: Arc<RuleSetRepository>,
    pub catalog: RulePackCatalog,
    pub orchestrator: Arc<AuditOrchestrator>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Open the file-backed stores under `config.storage` and seed the
    /// baseline from the default pack on first start.
    pub fn open(config: Config) -> anyhow::Result<Self> {
        let data_dir = &config.storage.data_dir;
        let rulesets = Arc::new(
            RuleSetRepository::open(data_dir)
                .with_context(|| format!("opening rule sets under {}", data_dir.display()))?,
        );
        let runs = Arc::new(
            RunStore::open(data_dir).with_context(|| format!("opening audit runs under {}", data_dir.display()))?,
        );
        let cache = Arc::new(BaselineSummaryCache::open(runs.clone(), data_dir)?);
        let source: Arc<dyn InvoiceSource> = Arc::new(FileInvoiceSource::new(&config.storage.invoices_dir));

        Self::assemble(config, rulesets, runs, cache, source)
    }

    pub fn assemble(
        config: Config,
        rulesets: Arc<RuleSetRepository>,
        runs: Arc<RunStore>,
        cache: Arc<BaselineSummaryCache>,
        source: Arc<dyn InvoiceSource>,
    ) -> anyhow::Result<Self> {
        rulesets.ensure_baseline(DEFAULT_PACK_SOURCE)?;

        let catalog = RulePackCatalog::new(Some(config.storage.rule_packs_dir.clone()));
        for result in catalog.reload()? {
            match result.status {
                LoadStatus::Loaded { slug } => info!(slug, path = %result.path.display(), "rule pack loaded"),
                LoadStatus::Skipped { reason } => info!(path = %result.path.display(), reason, "rule pack skipped"),
                LoadStatus::Failed { error } => warn!(path = %result.path.display(), error, "rule pack failed"),
            }
        }

        let orchestrator = Arc::new(AuditOrchestrator::new(
            rulesets.clone(),
            runs,
            cache,
            source,
            Arc::new(UnconfiguredRenderer),
            OrchestratorConfig::from(&config.audit),
        )?);

        Ok(Self {
            config,
            rulesets,
            catalog,
            orchestrator,
            started_at: Utc::now(),
        })
    }
}
