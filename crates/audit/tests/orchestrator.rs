//! Audit runs end to end: rule sets, background execution, run lock,
//! retries, deadlines and the baseline cache.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Semaphore;

use oraculo_audit::{
    AuditError, AuditOrchestrator, BaselineSummaryCache, InvoiceSource, MemoryInvoiceSource,
    OrchestratorConfig, ReportFormat, RuleSetRepository, RunStatus, RunStore, SourceError,
    UnconfiguredRenderer,
};
use oraculo_core::{DateRange, Invoice};
use oraculo_rules::Severity;

const BASELINE: &str = "
- id: R1
  name: CFOP interestadual
  scope: item
  when: {field: item.cfop, op: starts_with, value: ['6']}
  then: {inconsistency_code: CFOP_MISMATCH, severity: high, message: 'Item {{ item.seq }} CFOP {{ item.cfop }}'}
";

const OVERRIDE: &str = "
rules:
  - id: R2
    name: UF divergente
    when: {field: invoice.uf, op: ne, value: AM}
    then: {inconsistency_code: UF_DIVERGENT, severity: medium, message: 'UF {{ invoice.uf }}'}
";

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn january() -> DateRange {
    DateRange::new(date("2024-01-01"), date("2024-01-31")).unwrap()
}

fn invoice(id: &str, uf: &str, day: &str, cfop: &str) -> Invoice {
    serde_json::from_value(serde_json::json!({
        "id": id, "org_id": "org-1", "access_key": format!("KEY-{id}"),
        "issuer_tax_id": "11111111000111", "recipient_tax_id": "22222222000122",
        "uf": uf, "issue_date": day, "total_value": 10.0,
        "items": [{"seq": 1, "product_code": "P1", "cfop": cfop,
                   "quantity": 1.0, "unit_value": 10.0, "total_value": 10.0}]
    }))
    .unwrap()
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        workers: 2,
        run_timeout: Duration::from_secs(5),
        fetch_retries: 2,
        retry_base_delay: Duration::from_millis(1),
        top_rules: 5,
    }
}

struct Harness {
    orchestrator: Arc<AuditOrchestrator>,
    rulesets: Arc<RuleSetRepository>,
}

fn harness_with(source: Arc<dyn InvoiceSource>, config: OrchestratorConfig) -> Harness {
    let rulesets = Arc::new(RuleSetRepository::in_memory());
    rulesets.save_baseline(BASELINE, None).unwrap();
    let runs = Arc::new(RunStore::in_memory());
    let cache = Arc::new(BaselineSummaryCache::new(runs.clone()));
    let orchestrator = AuditOrchestrator::new(
        rulesets.clone(),
        runs,
        cache,
        source,
        Arc::new(UnconfiguredRenderer),
        config,
    )
    .unwrap();
    Harness {
        orchestrator: Arc::new(orchestrator),
        rulesets,
    }
}

fn memory_source(invoices: Vec<Invoice>) -> Arc<MemoryInvoiceSource> {
    let source = MemoryInvoiceSource::new();
    for inv in invoices {
        source.insert(inv);
    }
    Arc::new(source)
}

/// Blocks every fetch until a permit is released.
struct GatedSource {
    gate: Semaphore,
    invoices: Vec<Invoice>,
}

#[async_trait]
impl InvoiceSource for GatedSource {
    async fn fetch(&self, _org_id: &str, _range: &DateRange) -> Result<Vec<Invoice>, SourceError> {
        let _permit = self.gate.acquire().await.unwrap();
        Ok(self.invoices.clone())
    }
}

/// Fails the first `failures` fetches.
struct FlakySource {
    failures: AtomicU32,
    calls: AtomicU32,
    invoices: Vec<Invoice>,
}

#[async_trait]
impl InvoiceSource for FlakySource {
    async fn fetch(&self, _org_id: &str, _range: &DateRange) -> Result<Vec<Invoice>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(SourceError::Unavailable("connection refused".into()));
        }
        Ok(self.invoices.clone())
    }
}

struct SlowSource;

#[async_trait]
impl InvoiceSource for SlowSource {
    async fn fetch(&self, _org_id: &str, _range: &DateRange) -> Result<Vec<Invoice>, SourceError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn baseline_plus_override_scenario() {
    let h = harness_with(
        memory_source(vec![invoice("NF-1", "SP", "2024-01-15", "6102")]),
        config(),
    );
    h.rulesets.save_override("org-1", OVERRIDE, None).unwrap();

    let (queued, handle) = h.orchestrator.request_run("org-1", january(), None).unwrap();
    assert_eq!(queued.status, RunStatus::Queued);
    assert_eq!(queued.ruleset_version_used, "baseline@1+override@1");
    handle.await.unwrap();

    let run = h.orchestrator.get_run("org-1", &queued.id).unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert!(run.started_at.is_some() && run.finished_at.is_some());
    assert_eq!(run.findings.len(), 2);
    assert_eq!(run.findings[0].id, 1);
    assert_eq!(run.findings[0].item_seq, Some(1));
    assert_eq!(run.findings[0].message, "Item 1 CFOP 6102");
    assert_eq!(run.findings[1].message, "UF SP");

    let summary = run.summary.unwrap();
    assert_eq!(summary.total_findings, 2);
    assert_eq!(summary.invoices_with_findings, 1);
    assert_eq!(summary.processed_invoices, 1);
    assert_eq!(summary.severity_breakdown.len(), 2);
    assert_eq!(summary.severity_breakdown[&Severity::High], 1);
    assert_eq!(summary.severity_breakdown[&Severity::Medium], 1);
    assert_eq!(summary.metadata["ruleCount"], 2);
    assert_eq!(summary.metadata["diagnostics"], 0);

    let baseline = h.orchestrator.baseline_summary("org-1").unwrap().unwrap();
    assert_eq!(baseline.run_id, queued.id);
}

#[tokio::test]
async fn zero_invoices_is_done_with_empty_summary() {
    let h = harness_with(
        memory_source(vec![invoice("NF-9", "SP", "2023-06-01", "6102")]),
        config(),
    );
    assert!(h.orchestrator.baseline_summary("org-1").unwrap().is_none());

    let (run, handle) = h.orchestrator.request_run("org-1", january(), None).unwrap();
    handle.await.unwrap();

    let run = h.orchestrator.get_run("org-1", &run.id).unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert!(run.error.is_none());
    let summary = run.summary.unwrap();
    assert_eq!(summary.processed_invoices, 0);
    assert_eq!(summary.total_findings, 0);
    assert!(summary.top_rules.is_empty());
    assert!(summary.severity_breakdown.is_empty());

    // "no audits yet" and "zero findings" are distinguishable
    let baseline = h.orchestrator.baseline_summary("org-1").unwrap().unwrap();
    assert_eq!(baseline.summary.total_findings, 0);
}

#[tokio::test]
async fn second_request_conflicts_while_first_is_active() {
    let source = Arc::new(GatedSource {
        gate: Semaphore::new(0),
        invoices: vec![invoice("NF-1", "AM", "2024-01-10", "6102")],
    });
    let h = harness_with(source.clone(), config());

    let (first, handle) = h.orchestrator.request_run("org-1", january(), None).unwrap();
    let before = h.orchestrator.get_run("org-1", &first.id).unwrap();

    let err = h.orchestrator.request_run("org-1", january(), None).unwrap_err();
    assert!(matches!(err, AuditError::Conflict(_)));
    assert_eq!(h.orchestrator.list_runs("org-1").unwrap().len(), 1);
    let after = h.orchestrator.get_run("org-1", &first.id).unwrap();
    assert!(after.status.is_active());
    assert_eq!(before.requested_at, after.requested_at);
    assert_eq!(before.ruleset_version_used, after.ruleset_version_used);

    source.gate.add_permits(1);
    handle.await.unwrap();
    assert_eq!(h.orchestrator.get_run("org-1", &first.id).unwrap().status, RunStatus::Done);

    // once terminal, re-running creates a new record
    source.gate.add_permits(1);
    let (second, handle) = h.orchestrator.request_run("org-1", january(), None).unwrap();
    handle.await.unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(h.orchestrator.list_runs("org-1").unwrap().len(), 2);
}

#[tokio::test]
async fn fetch_is_retried_with_backoff() {
    let source = Arc::new(FlakySource {
        failures: AtomicU32::new(2),
        calls: AtomicU32::new(0),
        invoices: vec![invoice("NF-1", "AM", "2024-01-10", "5102")],
    });
    let h = harness_with(source.clone(), config());

    let (run, handle) = h.orchestrator.request_run("org-1", january(), None).unwrap();
    handle.await.unwrap();
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    let run = h.orchestrator.get_run("org-1", &run.id).unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.summary.unwrap().processed_invoices, 1);
}

#[tokio::test]
async fn exhausted_retries_fail_the_run() {
    let source = Arc::new(FlakySource {
        failures: AtomicU32::new(10),
        calls: AtomicU32::new(0),
        invoices: Vec::new(),
    });
    let h = harness_with(source.clone(), config());

    let (run, handle) = h.orchestrator.request_run("org-1", january(), None).unwrap();
    handle.await.unwrap();
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);

    let run = h.orchestrator.get_run("org-1", &run.id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.summary.is_none());
    assert!(run.findings.is_empty());
    assert!(run.error.unwrap().contains("invoice source unavailable"));
    assert!(h.orchestrator.baseline_summary("org-1").unwrap().is_none());
}

#[tokio::test]
async fn deadline_fails_the_run() {
    let h = harness_with(
        Arc::new(SlowSource),
        OrchestratorConfig {
            run_timeout: Duration::from_millis(50),
            ..config()
        },
    );
    let (run, handle) = h.orchestrator.request_run("org-1", january(), None).unwrap();
    handle.await.unwrap();

    let run = h.orchestrator.get_run("org-1", &run.id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.unwrap().starts_with("timeout"));
}

#[tokio::test]
async fn explicit_version_replays_older_composition() {
    let h = harness_with(
        memory_source(vec![invoice("NF-1", "SP", "2024-01-15", "5102")]),
        config(),
    );
    h.rulesets.save_override("org-1", OVERRIDE, None).unwrap();
    h.rulesets.save_override("org-1", "rules: []", None).unwrap();

    let (current, handle) = h.orchestrator.request_run("org-1", january(), None).unwrap();
    handle.await.unwrap();
    assert_eq!(current.ruleset_version_used, "baseline@1");
    let current = h.orchestrator.get_run("org-1", &current.id).unwrap();
    assert!(current.findings.is_empty());

    let (replay, handle) = h
        .orchestrator
        .request_run("org-1", january(), Some("baseline@1+override@1"))
        .unwrap();
    handle.await.unwrap();
    let replay = h.orchestrator.get_run("org-1", &replay.id).unwrap();
    assert_eq!(replay.ruleset_version_used, "baseline@1+override@1");
    assert_eq!(replay.findings.len(), 1);
    assert_eq!(replay.findings[0].inconsistency_code, "UF_DIVERGENT");

    assert!(matches!(
        h.orchestrator.request_run("org-1", january(), Some("v2")),
        Err(AuditError::InvalidRequest(_))
    ));
    assert!(matches!(
        h.orchestrator.request_run("org-1", january(), Some("baseline@7")),
        Err(AuditError::NotFound(_))
    ));
}

#[tokio::test]
async fn repeated_runs_yield_identical_findings() {
    let invoices = (1..=40)
        .map(|i| {
            let uf = if i % 3 == 0 { "SP" } else { "AM" };
            let cfop = if i % 2 == 0 { "6102" } else { "5102" };
            invoice(&format!("NF-{i:03}"), uf, "2024-01-20", cfop)
        })
        .collect();
    let h = harness_with(memory_source(invoices), config());
    h.rulesets.save_override("org-1", OVERRIDE, None).unwrap();

    let mut results = Vec::new();
    for _ in 0..2 {
        let (run, handle) = h.orchestrator.request_run("org-1", january(), None).unwrap();
        handle.await.unwrap();
        results.push(h.orchestrator.findings("org-1", &run.id).unwrap());
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].len(), 20 + 13);
    let ids: Vec<u64> = results[0].iter().map(|f| f.id).collect();
    assert_eq!(ids, (1..=33).collect::<Vec<u64>>());
}

#[tokio::test]
async fn baseline_pin_and_reports() {
    let h = harness_with(
        memory_source(vec![invoice("NF-1", "AM", "2024-01-15", "6102")]),
        config(),
    );
    let (first, handle) = h.orchestrator.request_run("org-1", january(), None).unwrap();
    handle.await.unwrap();
    let (second, handle) = h.orchestrator.request_run("org-1", january(), None).unwrap();
    handle.await.unwrap();

    assert_eq!(h.orchestrator.baseline_summary("org-1").unwrap().unwrap().run_id, second.id);
    h.orchestrator.pin_baseline("org-1", &first.id).unwrap();
    let pinned = h.orchestrator.baseline_summary("org-1").unwrap().unwrap();
    assert_eq!(pinned.run_id, first.id);
    assert!(pinned.pinned);

    let report = h.orchestrator.report("org-1", &first.id, ReportFormat::Pdf).await;
    assert!(matches!(report, Err(AuditError::Report(_))));
    assert!(matches!(
        h.orchestrator.report("org-1", "missing", ReportFormat::Xlsx).await,
        Err(AuditError::NotFound(_))
    ));
}

#[tokio::test]
async fn missing_baseline_and_bad_org_are_rejected() {
    let runs = Arc::new(RunStore::in_memory());
    let orchestrator = Arc::new(
        AuditOrchestrator::new(
            Arc::new(RuleSetRepository::in_memory()),
            runs.clone(),
            Arc::new(BaselineSummaryCache::new(runs)),
            memory_source(Vec::new()),
            Arc::new(UnconfiguredRenderer),
            config(),
        )
        .unwrap(),
    );
    assert!(matches!(
        orchestrator.request_run("org-1", january(), None),
        Err(AuditError::NotFound(_))
    ));
    assert!(matches!(
        orchestrator.request_run("org/1", january(), None),
        Err(AuditError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn runs_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let build = |dir: &std::path::Path| {
        let rulesets = Arc::new(RuleSetRepository::open(dir).unwrap());
        rulesets.ensure_baseline(BASELINE).unwrap();
        let runs = Arc::new(RunStore::open(dir).unwrap());
        let cache = Arc::new(BaselineSummaryCache::open(runs.clone(), dir).unwrap());
        Arc::new(
            AuditOrchestrator::new(
                rulesets,
                runs,
                cache,
                memory_source(vec![invoice("NF-1", "AM", "2024-01-15", "6102")]),
                Arc::new(UnconfiguredRenderer),
                config(),
            )
            .unwrap(),
        )
    };

    let run_id = {
        let orchestrator = build(dir.path());
        let (run, handle) = orchestrator.request_run("org-1", january(), None).unwrap();
        handle.await.unwrap();
        run.id
    };

    let orchestrator = build(dir.path());
    let run = orchestrator.get_run("org-1", &run_id).unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.findings.len(), 1);
    assert_eq!(
        orchestrator.baseline_summary("org-1").unwrap().unwrap().run_id,
        run_id
    );
}

#[tokio::test]
async fn unwritable_run_file_fails_the_run_instead_of_reporting_done() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(GatedSource {
        gate: Semaphore::new(0),
        invoices: vec![invoice("NF-1", "SP", "2024-01-10", "6102")],
    });
    let rulesets = Arc::new(RuleSetRepository::in_memory());
    rulesets.save_baseline(BASELINE, None).unwrap();
    let runs = Arc::new(RunStore::open(dir.path()).unwrap());
    let cache = Arc::new(BaselineSummaryCache::new(runs.clone()));
    let orchestrator = Arc::new(
        AuditOrchestrator::new(rulesets, runs, cache, source.clone(), Arc::new(UnconfiguredRenderer), config())
            .unwrap(),
    );

    let (run, handle) = orchestrator.request_run("org-1", january(), None).unwrap();
    // every later write of this run goes through the same temp path
    let tmp = dir.path().join("runs").join("org-1").join(format!("{}.json.tmp", run.id));
    std::fs::create_dir_all(&tmp).unwrap();
    source.gate.add_permits(1);
    handle.await.unwrap();

    let failed = orchestrator.get_run("org-1", &run.id).unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("storage error"));
    assert!(failed.summary.is_none());
    assert!(orchestrator.baseline_summary("org-1").unwrap().is_none());

    // the organization is not left locked
    std::fs::remove_dir(&tmp).unwrap();
    source.gate.add_permits(1);
    let (retry, handle) = orchestrator.request_run("org-1", january(), None).unwrap();
    handle.await.unwrap();
    assert_eq!(orchestrator.get_run("org-1", &retry.id).unwrap().status, RunStatus::Done);

    // disk never claimed the first run was done
    let reopened = RunStore::open(dir.path()).unwrap();
    assert_eq!(reopened.get("org-1", &run.id).unwrap().status, RunStatus::Failed);
}
