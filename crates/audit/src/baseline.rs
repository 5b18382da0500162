//! Baseline summary cache.
//!
//! Keeps the summary of each organization's reference run so dashboards can
//! read it without loading findings. By default the reference is the latest
//! successful run; an operator can pin a specific done run instead. Pins are
//! persisted to `{data_dir}/baseline_pins.json` when a data directory is set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use oraculo_core::DateRange;

use crate::error::{AuditError, StoreError};
use crate::model::{AuditRun, RunStatus};
use crate::persist::{read_json, write_json};
use crate::run_store::RunStore;
use crate::summary::AuditSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineSummary {
    pub run_id: String,
    pub date_range: DateRange,
    pub ruleset_version_used: String,
    pub finished_at: Option<DateTime<Utc>>,
    /// True when an operator pinned this run as the reference.
    pub pinned: bool,
    pub summary: AuditSummary,
}

impl BaselineSummary {
    fn from_run(run: &AuditRun, pinned: bool) -> Option<Self> {
        let summary = run.summary.clone()?;
        Some(Self {
            run_id: run.id.clone(),
            date_range: run.date_range,
            ruleset_version_used: run.ruleset_version_used.clone(),
            finished_at: run.finished_at,
            pinned,
            summary,
        })
    }
}

pub struct BaselineSummaryCache {
    runs: Arc<RunStore>,
    latest: RwLock<HashMap<String, BaselineSummary>>,
    /// org_id → pinned run id
    pinned: RwLock<HashMap<String, String>>,
    pins_path: Option<PathBuf>,
}

impl BaselineSummaryCache {
    pub fn new(runs: Arc<RunStore>) -> Self {
        Self {
            runs,
            latest: RwLock::new(HashMap::new()),
            pinned: RwLock::new(HashMap::new()),
            pins_path: None,
        }
    }

    /// Cache whose pins survive restarts.
    pub fn open(runs: Arc<RunStore>, data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join("baseline_pins.json");
        let pins: HashMap<String, String> = read_json(&path)?.unwrap_or_default();
        info!(pins = pins.len(), "baseline pins loaded");
        Ok(Self {
            runs,
            latest: RwLock::new(HashMap::new()),
            pinned: RwLock::new(pins),
            pins_path: Some(path),
        })
    }

    /// Record a finished run as the organization's latest baseline.
    pub fn record(&self, run: &AuditRun) {
        if run.status != RunStatus::Done {
            return;
        }
        if let Some(entry) = BaselineSummary::from_run(run, false) {
            let mut latest = self.latest.write().expect("baseline cache lock poisoned");
            latest.insert(run.org_id.clone(), entry);
        }
    }

    /// Current baseline: the pinned run if any, otherwise the latest done run.
    pub fn get(&self, org_id: &str) -> Option<BaselineSummary> {
        let pinned_id = {
            let pinned = self.pinned.read().expect("baseline cache lock poisoned");
            pinned.get(org_id).cloned()
        };
        if let Some(run_id) = pinned_id {
            match self.runs.get(org_id, &run_id) {
                Some(run) => return BaselineSummary::from_run(&run, true),
                None => warn!(org_id, run_id, "pinned baseline run no longer exists"),
            }
        }

        {
            let latest = self.latest.read().expect("baseline cache lock poisoned");
            if let Some(entry) = latest.get(org_id) {
                return Some(entry.clone());
            }
        }

        // Cold cache (e.g. after restart): rebuild from the run store.
        let run = self.runs.latest_done(org_id)?;
        let entry = BaselineSummary::from_run(&run, false)?;
        let mut latest = self.latest.write().expect("baseline cache lock poisoned");
        latest.insert(org_id.to_string(), entry.clone());
        Some(entry)
    }

    /// Pin a done run as the organization's baseline.
    pub fn pin(&self, org_id: &str, run_id: &str) -> Result<BaselineSummary, AuditError> {
        let run = self
            .runs
            .get(org_id, run_id)
            .ok_or_else(|| AuditError::NotFound(format!("audit run {run_id} not found")))?;
        if run.status != RunStatus::Done {
            return Err(AuditError::Conflict(format!(
                "run {run_id} is {}; only done runs can be pinned as baseline",
                run.status
            )));
        }
        let entry = BaselineSummary::from_run(&run, true)
            .ok_or_else(|| AuditError::Conflict(format!("run {run_id} has no summary")))?;

        let mut pinned = self.pinned.write().expect("baseline cache lock poisoned");
        let previous = pinned.insert(org_id.to_string(), run_id.to_string());
        if let Err(e) = self.persist_pins(&pinned) {
            match previous {
                Some(prev) => pinned.insert(org_id.to_string(), prev),
                None => pinned.remove(org_id),
            };
            return Err(e.into());
        }
        info!(org_id, run_id, "baseline pinned");
        Ok(entry)
    }

    /// Drop the pin; the latest done run becomes the baseline again.
    pub fn unpin(&self, org_id: &str) -> Result<bool, AuditError> {
        let mut pinned = self.pinned.write().expect("baseline cache lock poisoned");
        let Some(previous) = pinned.remove(org_id) else {
            return Ok(false);
        };
        if let Err(e) = self.persist_pins(&pinned) {
            pinned.insert(org_id.to_string(), previous);
            return Err(e.into());
        }
        info!(org_id, "baseline unpinned");
        Ok(true)
    }

    fn persist_pins(&self, pins: &HashMap<String, String>) -> Result<(), StoreError> {
        match &self.pins_path {
            Some(path) => write_json(path, pins),
            None => Ok(()),
        }
    }
}
