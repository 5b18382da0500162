//! Offline subcommands: validate, compose and audit rule sets from files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use tracing::info;

use oraculo_audit::{
    AuditOrchestrator, BaselineSummaryCache, MemoryInvoiceSource, OrchestratorConfig, RuleSetRepository,
    RunStatus, RunStore, UnconfiguredRenderer,
};
use oraculo_core::{Config, DateRange, Invoice};
use oraculo_rules::catalog::DEFAULT_PACK_SOURCE;
use oraculo_rules::{compose, parse_ruleset, validate_source, RuleSet};

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Print every issue. Returns whether the file is valid.
pub fn validate(path: &Path) -> anyhow::Result<bool> {
    let report = validate_source(&read(path)?);
    for issue in &report.errors {
        println!("error: {issue}");
    }
    for issue in &report.warnings {
        println!("warning: {issue}");
    }
    if report.valid {
        println!("{}: valid ({} warning(s))", path.display(), report.warnings.len());
    } else {
        println!("{}: {} error(s)", path.display(), report.errors.len());
    }
    Ok(report.valid)
}

fn load_ruleset(path: &Path, fallback_name: &str) -> anyhow::Result<RuleSet> {
    let source = read(path)?;
    let parsed = parse_ruleset(&source).with_context(|| format!("validating {}", path.display()))?;
    Ok(RuleSet::from_document(
        path.display().to_string(),
        1,
        fallback_name,
        source,
        parsed.document,
    ))
}

/// Print the effective YAML of `baseline` + `override`.
pub fn compose_files(baseline: &Path, override_path: Option<&Path>) -> anyhow::Result<()> {
    let baseline = load_ruleset(baseline, "baseline")?;
    let override_set = override_path.map(|p| load_ruleset(p, "override")).transpose()?;
    let effective = compose(&baseline, override_set.as_ref())?;
    info!(
        version = %effective.version(),
        rules = effective.rules.len(),
        digest = %effective.digest,
        "composed"
    );
    print!("{}", effective.source_text);
    Ok(())
}

#[derive(Debug)]
pub struct AuditArgs {
    pub baseline: Option<PathBuf>,
    pub override_path: Option<PathBuf>,
    pub invoices: PathBuf,
    pub org: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub json: bool,
}

/// Run one audit in memory over a JSON invoice file.
pub async fn audit(config: &Config, args: AuditArgs) -> anyhow::Result<()> {
    let rulesets = Arc::new(RuleSetRepository::in_memory());
    match &args.baseline {
        Some(path) => rulesets.save_baseline(&read(path)?, None)?,
        None => rulesets.save_baseline(DEFAULT_PACK_SOURCE, None)?,
    };
    if let Some(path) = &args.override_path {
        rulesets.save_override(&args.org, &read(path)?, None)?;
    }

    let mut invoices: Vec<Invoice> = serde_json::from_str(&read(&args.invoices)?)
        .with_context(|| format!("parsing invoices in {}", args.invoices.display()))?;
    let today = Utc::now().date_naive();
    let start = args
        .from
        .or_else(|| invoices.iter().map(|i| i.issue_date).min())
        .unwrap_or(today);
    let end = args
        .to
        .or_else(|| invoices.iter().map(|i| i.issue_date).max())
        .unwrap_or(today);
    let range = DateRange::new(start, end)?;

    let source = MemoryInvoiceSource::new();
    for mut invoice in invoices.drain(..) {
        invoice.org_id = args.org.clone();
        source.insert(invoice);
    }

    let runs = Arc::new(RunStore::in_memory());
    let orchestrator = Arc::new(AuditOrchestrator::new(
        rulesets,
        runs.clone(),
        Arc::new(BaselineSummaryCache::new(runs)),
        Arc::new(source),
        Arc::new(UnconfiguredRenderer),
        OrchestratorConfig::from(&config.audit),
    )?);

    let (queued, handle) = orchestrator.request_run(&args.org, range, None)?;
    handle.await?;
    let run = orchestrator.get_run(&args.org, &queued.id)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        for f in &run.findings {
            let item = f.item_seq.map(|s| format!("#{s}")).unwrap_or_default();
            println!(
                "{:>4}  {:<12} {:<4} {:<8} {:<24} {}",
                f.id, f.invoice_id, item, f.severity, f.inconsistency_code, f.message
            );
        }
        if let Some(summary) = &run.summary {
            println!(
                "{} invoice(s), {} finding(s) on {} invoice(s), rules {}",
                summary.processed_invoices,
                summary.total_findings,
                summary.invoices_with_findings,
                run.ruleset_version_used
            );
        }
    }

    if run.status != RunStatus::Done {
        bail!("audit run {} failed: {}", run.id, run.error.unwrap_or_default());
    }
    Ok(())
}
