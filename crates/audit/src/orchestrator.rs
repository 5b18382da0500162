//! Audit run orchestration.
//!
//! `request_run` snapshots the effective rule set, atomically registers a
//! queued run (one active run per organization) and hands execution to a
//! background task. The task fetches invoices with retry, evaluates them on
//! a dedicated rayon pool under a whole-run deadline, and records the run
//! as `done` (findings + summary) or `failed` (error only).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use oraculo_core::{AuditConfig, DateRange, Invoice};
use oraculo_rules::{EffectiveRuleSet, EffectiveVersion, EvaluationDiagnostic, Metadata, RuleEvaluator, RuleOutcome};

use crate::baseline::{BaselineSummary, BaselineSummaryCache};
use crate::error::{AuditError, StoreError};
use crate::model::{check_org_id, AuditFinding, AuditRun, AuditRunOverview, RunStatus};
use crate::report::{ReportFormat, ReportRenderer};
use crate::ruleset_store::RuleSetRepository;
use crate::run_store::RunStore;
use crate::source::{InvoiceSource, SourceError};
use crate::summary::{summarize, DEFAULT_TOP_RULES};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Evaluation pool threads.
    pub workers: usize,
    /// Deadline for fetch plus evaluation.
    pub run_timeout: Duration,
    /// Extra fetch attempts after the first failure.
    pub fetch_retries: u32,
    /// First retry delay; doubles on every further attempt.
    pub retry_base_delay: Duration,
    pub top_rules: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&AuditConfig::default())
    }
}

impl From<&AuditConfig> for OrchestratorConfig {
    fn from(cfg: &AuditConfig) -> Self {
        Self {
            workers: cfg.resolved_workers(),
            run_timeout: cfg.run_timeout(),
            fetch_retries: cfg.fetch_retries,
            retry_base_delay: Duration::from_millis(500),
            top_rules: if cfg.top_rules == 0 {
                DEFAULT_TOP_RULES
            } else {
                cfg.top_rules as usize
            },
        }
    }
}

/// Systemic failures that end a run as `failed`.
#[derive(Debug, thiserror::Error)]
enum RunFailure {
    #[error("invoice source unavailable after {attempts} attempt(s): {source}")]
    SourceUnavailable { attempts: u32, source: SourceError },

    #[error("timeout: run exceeded {0:?}")]
    Timeout(Duration),

    #[error("evaluation aborted: {0}")]
    Evaluation(String),

    #[error("storage error: {0}")]
    Storage(StoreError),
}

/// Result of a completed evaluation pass.
struct Evaluated {
    processed: usize,
    findings: Vec<AuditFinding>,
    diagnostics: Vec<EvaluationDiagnostic>,
}

pub struct AuditOrchestrator {
    rulesets: Arc<RuleSetRepository>,
    runs: Arc<RunStore>,
    cache: Arc<BaselineSummaryCache>,
    source: Arc<dyn InvoiceSource>,
    renderer: Arc<dyn ReportRenderer>,
    evaluator: Arc<RuleEvaluator>,
    pool: Arc<rayon::ThreadPool>,
    config: OrchestratorConfig,
}

impl AuditOrchestrator {
    pub fn new(
        rulesets: Arc<RuleSetRepository>,
        runs: Arc<RunStore>,
        cache: Arc<BaselineSummaryCache>,
        source: Arc<dyn InvoiceSource>,
        renderer: Arc<dyn ReportRenderer>,
        config: OrchestratorConfig,
    ) -> Result<Self, AuditError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(|i| format!("audit-eval-{i}"))
            .build()?;
        info!(workers = config.workers.max(1), timeout = ?config.run_timeout, "audit orchestrator ready");

        Ok(Self {
            rulesets,
            runs,
            cache,
            source,
            renderer,
            evaluator: Arc::new(RuleEvaluator::new()),
            pool: Arc::new(pool),
            config,
        })
    }

    pub fn rulesets(&self) -> &Arc<RuleSetRepository> {
        &self.rulesets
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Register a queued run and start it in the background.
    ///
    /// With `ruleset_version` (`baseline@N[+override@M]`) that exact
    /// composition is replayed; otherwise the current baseline and override
    /// are composed now. Either way the snapshot is fixed before the run is
    /// created, so later edits never reach it.
    pub fn request_run(
        self: &Arc<Self>,
        org_id: &str,
        date_range: DateRange,
        ruleset_version: Option<&str>,
    ) -> Result<(AuditRun, JoinHandle<()>), AuditError> {
        check_org_id(org_id)?;

        let effective = match ruleset_version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(label) => {
                let version: EffectiveVersion = label.parse()?;
                self.rulesets.effective_at(org_id, version)?
            }
            None => self.rulesets.effective(org_id)?,
        };

        let run = self.runs.try_create(AuditRun::queued(
            org_id,
            date_range,
            effective.version().to_string(),
        ))?;
        info!(
            run_id = %run.id,
            org_id = %org_id,
            ruleset = %run.ruleset_version_used,
            range = %date_range,
            "audit run queued"
        );

        let this = Arc::clone(self);
        let queued = run.clone();
        let handle = tokio::spawn(async move {
            this.execute(queued, Arc::new(effective)).await;
        });
        Ok((run, handle))
    }

    async fn execute(self: Arc<Self>, run: AuditRun, effective: Arc<EffectiveRuleSet>) {
        let org_id = run.org_id.clone();
        let run_id = run.id.clone();
        let start = Instant::now();

        if let Err(e) = self.runs.update(&org_id, &run_id, |r| r.mark_processing()) {
            self.fail_run(&org_id, &run_id, RunFailure::Storage(e).to_string());
            return;
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let outcome = match tokio::time::timeout(
            self.config.run_timeout,
            self.process(&run, effective.clone(), cancel.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                Err(RunFailure::Timeout(self.config.run_timeout))
            }
        };

        let evaluated = match outcome {
            Ok(evaluated) => evaluated,
            Err(failure) => {
                self.fail_run(&org_id, &run_id, failure.to_string());
                return;
            }
        };

        let metadata = summary_metadata(&run, &effective, &evaluated.diagnostics);
        let summary = summarize(&evaluated.findings, evaluated.processed, self.config.top_rules, metadata);
        let finding_count = evaluated.findings.len();
        let diagnostic_count = evaluated.diagnostics.len();
        match self.runs.update(&org_id, &run_id, |r| {
            r.mark_done(evaluated.findings, evaluated.diagnostics, summary)
        }) {
            Ok(Some(done)) => {
                self.cache.record(&done);
                info!(
                    run_id = %run_id,
                    org_id = %org_id,
                    invoices = evaluated.processed,
                    findings = finding_count,
                    diagnostics = diagnostic_count,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "audit run done"
                );
            }
            Ok(None) => warn!(run_id = %run_id, org_id = %org_id, "audit run vanished before completion"),
            Err(e) => self.fail_run(&org_id, &run_id, RunFailure::Storage(e).to_string()),
        }
    }

    /// Record a run as failed. When even that cannot be written, the run is
    /// failed in memory so the organization is not locked.
    fn fail_run(&self, org_id: &str, run_id: &str, message: String) {
        error!(run_id = %run_id, org_id = %org_id, error = %message, "audit run failed");
        if let Err(e) = self.runs.update(org_id, run_id, |r| r.mark_failed(message.clone())) {
            warn!(run_id = %run_id, error = %e, "failed to persist failed audit run");
            self.runs.fail_unpersisted(org_id, run_id, &message);
        }
    }

    async fn process(
        &self,
        run: &AuditRun,
        effective: Arc<EffectiveRuleSet>,
        cancel: Arc<AtomicBool>,
    ) -> Result<Evaluated, RunFailure> {
        let mut invoices = self.fetch_with_retry(&run.org_id, &run.date_range, &run.id).await?;
        invoices.retain(|inv| inv.org_id == run.org_id && run.date_range.contains(inv.issue_date));
        invoices.sort_by(|a, b| a.id.cmp(&b.id));
        let processed = invoices.len();

        let evaluator = self.evaluator.clone();
        let pool = self.pool.clone();
        // One slot per invoice, in invoice-id order.
        let arena: Vec<Option<(String, RuleOutcome)>> = tokio::task::spawn_blocking(move || {
            pool.install(|| {
                invoices
                    .par_iter()
                    .map(|invoice| {
                        if cancel.load(Ordering::Relaxed) {
                            return None;
                        }
                        Some((invoice.id.clone(), evaluator.evaluate_all(&effective.rules, invoice)))
                    })
                    .collect()
            })
        })
        .await
        .map_err(|e| RunFailure::Evaluation(e.to_string()))?;

        let mut findings = Vec::new();
        let mut diagnostics = Vec::new();
        for slot in arena {
            let Some((invoice_id, outcome)) = slot else {
                return Err(RunFailure::Evaluation("evaluation cancelled".to_string()));
            };
            for m in outcome.matches {
                let id = findings.len() as u64 + 1;
                findings.push(AuditFinding::from_match(id, &invoice_id, m));
            }
            diagnostics.extend(outcome.diagnostics);
        }

        Ok(Evaluated {
            processed,
            findings,
            diagnostics,
        })
    }

    async fn fetch_with_retry(
        &self,
        org_id: &str,
        range: &DateRange,
        run_id: &str,
    ) -> Result<Vec<Invoice>, RunFailure> {
        let attempts = self.config.fetch_retries + 1;
        let mut delay = self.config.retry_base_delay;
        let mut attempt = 1;
        loop {
            match self.source.fetch(org_id, range).await {
                Ok(invoices) => return Ok(invoices),
                Err(e) if attempt < attempts => {
                    warn!(
                        run_id = %run_id,
                        org_id = %org_id,
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "invoice fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(source) => return Err(RunFailure::SourceUnavailable { attempts, source }),
            }
        }
    }

    pub fn get_run(&self, org_id: &str, run_id: &str) -> Result<AuditRun, AuditError> {
        check_org_id(org_id)?;
        self.runs
            .get(org_id, run_id)
            .ok_or_else(|| AuditError::NotFound(format!("audit run {run_id} not found for organization {org_id}")))
    }

    /// Runs of an organization, newest first, without findings.
    pub fn list_runs(&self, org_id: &str) -> Result<Vec<AuditRunOverview>, AuditError> {
        check_org_id(org_id)?;
        Ok(self.runs.list(org_id).iter().map(AuditRun::overview).collect())
    }

    pub fn findings(&self, org_id: &str, run_id: &str) -> Result<Vec<AuditFinding>, AuditError> {
        Ok(self.get_run(org_id, run_id)?.findings)
    }

    /// `None` means no successful run exists yet (as opposed to zero findings).
    pub fn baseline_summary(&self, org_id: &str) -> Result<Option<BaselineSummary>, AuditError> {
        check_org_id(org_id)?;
        Ok(self.cache.get(org_id))
    }

    pub fn pin_baseline(&self, org_id: &str, run_id: &str) -> Result<BaselineSummary, AuditError> {
        check_org_id(org_id)?;
        self.cache.pin(org_id, run_id)
    }

    pub fn unpin_baseline(&self, org_id: &str) -> Result<bool, AuditError> {
        check_org_id(org_id)?;
        self.cache.unpin(org_id)
    }

    /// Delegate a finished run to the report renderer.
    pub async fn report(&self, org_id: &str, run_id: &str, format: ReportFormat) -> Result<Vec<u8>, AuditError> {
        let run = self.get_run(org_id, run_id)?;
        if run.status != RunStatus::Done {
            return Err(AuditError::Conflict(format!(
                "run {run_id} is {}; reports need a done run",
                run.status
            )));
        }
        Ok(self.renderer.render(format, &run).await?)
    }
}

fn summary_metadata(run: &AuditRun, effective: &EffectiveRuleSet, diagnostics: &[EvaluationDiagnostic]) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("diagnostics".into(), serde_json::json!(diagnostics.len()));
    metadata.insert("ruleCount".into(), serde_json::json!(effective.rules.len()));
    metadata.insert("rulesetDigest".into(), serde_json::json!(effective.digest));
    metadata.insert("rulesetVersion".into(), serde_json::json!(run.ruleset_version_used));
    metadata.insert(
        "dateRange".into(),
        serde_json::json!({ "start": run.date_range.start, "end": run.date_range.end }),
    );
    metadata
}
