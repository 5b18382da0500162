//! Audit run store.
//!
//! Holds every run per organization and enforces the run lock: at most one
//! queued or processing run per organization. With a data directory each
//! run is mirrored to `{data_dir}/runs/{org_id}/{run_id}.json`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::error::{AuditError, StoreError};
use crate::model::{AuditRun, RunStatus};
use crate::persist::{read_json, write_json};

/// Error recorded on runs found active when the store is reopened.
pub const INTERRUPTED_ERROR: &str = "interrupted: the service stopped before the run finished";

pub struct RunStore {
    data_dir: Option<PathBuf>,
    runs: Mutex<HashMap<String, Vec<AuditRun>>>,
}

impl RunStore {
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Open the store under `data_dir/runs`. Runs left queued or processing
    /// by a previous process are marked failed so their organization is
    /// not locked forever.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let dir = data_dir.join("runs");
        fs::create_dir_all(&dir)?;

        let mut runs: HashMap<String, Vec<AuditRun>> = HashMap::new();
        let mut recovered = 0usize;
        for org_entry in fs::read_dir(&dir)? {
            let org_dir = org_entry?.path();
            if !org_dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&org_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let mut run: AuditRun = match read_json(&path) {
                    Ok(Some(run)) => run,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable run file");
                        continue;
                    }
                };
                if run.status.is_active() {
                    run.mark_failed(INTERRUPTED_ERROR);
                    write_json(&path, &run)?;
                    recovered += 1;
                }
                runs.entry(run.org_id.clone()).or_default().push(run);
            }
        }
        for list in runs.values_mut() {
            list.sort_by_key(|r| r.requested_at);
        }

        let total: usize = runs.values().map(Vec::len).sum();
        info!(runs = total, recovered, path = %dir.display(), "run store loaded");
        Ok(Self {
            data_dir: Some(dir),
            runs: Mutex::new(runs),
        })
    }

    fn run_path(&self, run: &AuditRun) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(&run.org_id).join(format!("{}.json", run.id)))
    }

    /// Insert a queued run unless the organization already has an active one.
    pub fn try_create(&self, run: AuditRun) -> Result<AuditRun, AuditError> {
        let mut runs = self.runs.lock().expect("run store lock poisoned");
        let list = runs.entry(run.org_id.clone()).or_default();
        if let Some(active) = list.iter().find(|r| r.status.is_active()) {
            return Err(AuditError::Conflict(format!(
                "organization {} already has run {} in status {}",
                run.org_id, active.id, active.status
            )));
        }
        if let Some(path) = self.run_path(&run) {
            write_json(&path, &run)?;
        }
        list.push(run.clone());
        Ok(run)
    }

    /// Apply `f` to a stored run and persist it. The change only takes
    /// effect once written; `Ok(None)` means the run does not exist.
    pub fn update<F>(&self, org_id: &str, run_id: &str, f: F) -> Result<Option<AuditRun>, StoreError>
    where
        F: FnOnce(&mut AuditRun),
    {
        let mut runs = self.runs.lock().expect("run store lock poisoned");
        let Some(run) = runs
            .get_mut(org_id)
            .and_then(|list| list.iter_mut().find(|r| r.id == run_id))
        else {
            return Ok(None);
        };

        let mut next = run.clone();
        f(&mut next);
        if let Some(path) = self.run_path(&next) {
            write_json(&path, &next)?;
        }
        *run = next.clone();
        Ok(Some(next))
    }

    /// Mark a run failed in memory only, for when the store cannot be
    /// written at all. Releases the organization's run lock; the stale file
    /// on disk is still active and becomes failed on the next `open`.
    pub fn fail_unpersisted(&self, org_id: &str, run_id: &str, error: &str) -> Option<AuditRun> {
        let mut runs = self.runs.lock().expect("run store lock poisoned");
        let run = runs
            .get_mut(org_id)?
            .iter_mut()
            .find(|r| r.id == run_id)?;
        run.mark_failed(error);
        warn!(run_id, org_id, "run failed without being persisted");
        Some(run.clone())
    }

    pub fn get(&self, org_id: &str, run_id: &str) -> Option<AuditRun> {
        let runs = self.runs.lock().expect("run store lock poisoned");
        runs.get(org_id)
            .and_then(|list| list.iter().find(|r| r.id == run_id).cloned())
    }

    /// All runs of an organization, newest first.
    pub fn list(&self, org_id: &str) -> Vec<AuditRun> {
        let runs = self.runs.lock().expect("run store lock poisoned");
        let mut list = runs.get(org_id).cloned().unwrap_or_default();
        list.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        list
    }

    /// Most recently finished successful run.
    pub fn latest_done(&self, org_id: &str) -> Option<AuditRun> {
        let runs = self.runs.lock().expect("run store lock poisoned");
        runs.get(org_id)?
            .iter()
            .filter(|r| r.status == RunStatus::Done)
            .max_by_key(|r| r.finished_at)
            .cloned()
    }

    pub fn active(&self, org_id: &str) -> Option<AuditRun> {
        let runs = self.runs.lock().expect("run store lock poisoned");
        runs.get(org_id)?
            .iter()
            .find(|r| r.status.is_active())
            .cloned()
    }
}
