//! Versioned rule set repository.
//!
//! Rule sets live in slots: one global baseline slot and one override slot
//! per organization. Saving appends an immutable [`RuleSet`] with the next
//! revision number for its slot; the latest revision is the slot's current
//! content. Older revisions stay addressable so a recorded
//! [`EffectiveVersion`] can be replayed exactly.
//!
//! With a data directory, each slot persists to
//! `{data_dir}/rulesets/{slot}.json` on every save.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use oraculo_rules::{
    compose, parse_ruleset, EffectiveRuleSet, EffectiveVersion, Metadata, RuleDefinition, RuleSet,
    ValidationIssue,
};

use crate::error::{AuditError, StoreError};
use crate::model::check_org_id;
use crate::persist::{read_json, write_json};

const BASELINE_FILE: &str = "baseline";
const OVERRIDE_PREFIX: &str = "override-";

/// Where a rule set revision lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Baseline,
    Override(String),
}

impl Slot {
    fn file_stem(&self) -> String {
        match self {
            Slot::Baseline => BASELINE_FILE.to_string(),
            Slot::Override(org) => format!("{OVERRIDE_PREFIX}{org}"),
        }
    }

    fn default_name(&self) -> String {
        match self {
            Slot::Baseline => "Baseline Global".to_string(),
            Slot::Override(org) => format!("Override {org}"),
        }
    }
}

/// A stored revision plus the advisory warnings from validating it.
#[derive(Debug, Clone)]
pub struct SavedRuleSet {
    pub ruleset: RuleSet,
    pub warnings: Vec<ValidationIssue>,
}

/// Everything a client needs to display an organization's rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgRuleSetView {
    pub baseline: RuleSet,
    #[serde(rename = "override")]
    pub override_: Option<RuleSet>,
    pub effective_source_text: String,
    pub effective_rules: Vec<RuleDefinition>,
    pub effective_version: String,
    pub effective_digest: String,
    pub metadata: Metadata,
}

pub struct RuleSetRepository {
    data_dir: Option<PathBuf>,
    slots: RwLock<HashMap<Slot, Vec<RuleSet>>>,
}

impl RuleSetRepository {
    /// Repository without persistence.
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Open (and load) the repository under `data_dir/rulesets`.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let dir = data_dir.join("rulesets");
        fs::create_dir_all(&dir)?;

        let mut slots = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let slot = if stem == BASELINE_FILE {
                Slot::Baseline
            } else if let Some(org) = stem.strip_prefix(OVERRIDE_PREFIX) {
                Slot::Override(org.to_string())
            } else {
                warn!(path = %path.display(), "ignoring unexpected file in rulesets directory");
                continue;
            };
            let mut revisions: Vec<RuleSet> = read_json(&path)?.unwrap_or_default();
            revisions.sort_by_key(|r| r.version);
            slots.insert(slot, revisions);
        }

        info!(slots = slots.len(), path = %dir.display(), "rule set repository loaded");
        Ok(Self {
            data_dir: Some(dir),
            slots: RwLock::new(slots),
        })
    }

    /// Install `source` as baseline revision 1 if no baseline was ever saved.
    pub fn ensure_baseline(&self, source: &str) -> Result<Option<RuleSet>, AuditError> {
        if self.current(&Slot::Baseline).is_some() {
            return Ok(None);
        }
        let saved = self.save(Slot::Baseline, source, None)?;
        info!(version = saved.ruleset.version, "seeded baseline from default rule pack");
        Ok(Some(saved.ruleset))
    }

    pub fn save_baseline(&self, source: &str, name: Option<&str>) -> Result<SavedRuleSet, AuditError> {
        self.save(Slot::Baseline, source, name)
    }

    pub fn save_override(&self, org_id: &str, source: &str, name: Option<&str>) -> Result<SavedRuleSet, AuditError> {
        check_org_id(org_id)?;
        self.save(Slot::Override(org_id.to_string()), source, name)
    }

    /// Validate and append a new revision. Invalid source leaves the slot untouched.
    fn save(&self, slot: Slot, source: &str, name: Option<&str>) -> Result<SavedRuleSet, AuditError> {
        let parsed = parse_ruleset(source)?;

        let mut slots = self.slots.write().expect("ruleset lock poisoned");
        let revisions = slots.entry(slot.clone()).or_default();
        let version = revisions.last().map(|r| r.version + 1).unwrap_or(1);

        let mut ruleset = RuleSet::from_document(
            Uuid::new_v4().to_string(),
            version,
            &slot.default_name(),
            source,
            parsed.document,
        );
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            ruleset.name = name.to_string();
        }

        revisions.push(ruleset.clone());
        if let Some(dir) = &self.data_dir {
            let path = dir.join(format!("{}.json", slot.file_stem()));
            if let Err(e) = write_json(&path, revisions) {
                revisions.pop();
                return Err(e.into());
            }
        }

        info!(slot = %slot.file_stem(), version, rules = ruleset.rules.len(), "rule set saved");
        Ok(SavedRuleSet {
            ruleset,
            warnings: parsed.warnings,
        })
    }

    /// Latest revision of a slot.
    pub fn current(&self, slot: &Slot) -> Option<RuleSet> {
        let slots = self.slots.read().expect("ruleset lock poisoned");
        slots.get(slot).and_then(|r| r.last().cloned())
    }

    pub fn revision(&self, slot: &Slot, version: u32) -> Option<RuleSet> {
        let slots = self.slots.read().expect("ruleset lock poisoned");
        slots
            .get(slot)
            .and_then(|r| r.iter().find(|rs| rs.version == version).cloned())
    }

    pub fn baseline(&self) -> Result<RuleSet, AuditError> {
        self.current(&Slot::Baseline)
            .ok_or_else(|| AuditError::NotFound("no baseline rule set has been saved".to_string()))
    }

    pub fn override_for(&self, org_id: &str) -> Option<RuleSet> {
        self.current(&Slot::Override(org_id.to_string()))
    }

    /// Compose the organization's current baseline and override.
    pub fn effective(&self, org_id: &str) -> Result<EffectiveRuleSet, AuditError> {
        let baseline = self.baseline()?;
        let override_set = self.override_for(org_id);
        Ok(compose(&baseline, override_set.as_ref())?)
    }

    /// Replay a recorded composition.
    pub fn effective_at(&self, org_id: &str, version: EffectiveVersion) -> Result<EffectiveRuleSet, AuditError> {
        let baseline = self.revision(&Slot::Baseline, version.baseline).ok_or_else(|| {
            AuditError::NotFound(format!("baseline revision {} does not exist", version.baseline))
        })?;
        let override_set = match version.override_version {
            None => None,
            Some(v) => Some(
                self.revision(&Slot::Override(org_id.to_string()), v)
                    .ok_or_else(|| {
                        AuditError::NotFound(format!(
                            "override revision {v} does not exist for organization {org_id}"
                        ))
                    })?,
            ),
        };
        Ok(compose(&baseline, override_set.as_ref())?)
    }

    pub fn org_view(&self, org_id: &str) -> Result<OrgRuleSetView, AuditError> {
        check_org_id(org_id)?;
        let baseline = self.baseline()?;
        let override_set = self.override_for(org_id);
        let effective = compose(&baseline, override_set.as_ref())?;
        Ok(OrgRuleSetView {
            baseline,
            override_: override_set,
            effective_version: effective.version().to_string(),
            effective_digest: effective.digest,
            effective_source_text: effective.source_text,
            effective_rules: effective.rules,
            metadata: effective.metadata,
        })
    }
}
