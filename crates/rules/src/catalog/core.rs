//! [`RulePackCatalog`]: filesystem-backed pack listing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::validation::parse_ruleset;

use super::error::{CatalogError, LoadResult, LoadStatus, Result};

/// Slug of the pack compiled into the binary.
pub const DEFAULT_PACK_SLUG: &str = "zfm_baseline";

/// Source of the pack compiled into the binary. Also used to seed the
/// baseline when none has been saved yet.
pub const DEFAULT_PACK_SOURCE: &str = include_str!("../../packs/zfm_baseline.yaml");

/// A reusable, named rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePack {
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub source_text: String,
}

impl RulePack {
    /// Validate `source_text` and derive display fields from its header.
    /// `description` comes from `metadata.description` when present.
    pub fn from_source(slug: &str, source_text: String) -> Result<Self> {
        let parsed = parse_ruleset(&source_text)?;
        let doc = parsed.document;
        Ok(Self {
            slug: slug.to_string(),
            name: doc.name.unwrap_or_else(|| slug.to_string()),
            description: doc
                .metadata
                .get("description")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            version: doc.version,
            source_text,
        })
    }
}

/// Pack listing rebuilt on [`RulePackCatalog::reload`].
pub struct RulePackCatalog {
    packs_dir: Option<PathBuf>,
    packs: RwLock<Vec<RulePack>>,
}

impl RulePackCatalog {
    /// Catalog over `packs_dir`. Nothing is read until [`reload`](Self::reload).
    pub fn new(packs_dir: Option<PathBuf>) -> Self {
        Self {
            packs_dir,
            packs: RwLock::new(Vec::new()),
        }
    }

    /// Catalog holding only the embedded pack.
    pub fn embedded() -> Result<Self> {
        let catalog = Self::new(None);
        catalog.reload()?;
        Ok(catalog)
    }

    /// Rescan the pack directory. Invalid files are reported per file but
    /// do not abort the scan; a missing directory yields only the embedded pack.
    pub fn reload(&self) -> Result<Vec<LoadResult>> {
        let mut packs = vec![RulePack::from_source(DEFAULT_PACK_SLUG, DEFAULT_PACK_SOURCE.to_string())?];
        let mut results = Vec::new();

        if let Some(dir) = &self.packs_dir {
            if dir.is_dir() {
                scan_dir(dir, &mut packs, &mut results)?;
            } else {
                info!(path = %dir.display(), "rule pack directory not found, using embedded pack only");
            }
        }

        packs.sort_by(|a, b| a.slug.cmp(&b.slug));
        info!(count = packs.len(), "rule pack catalog loaded");
        *self.packs.write().expect("packs lock poisoned") = packs;
        Ok(results)
    }

    /// All packs, ordered by slug.
    pub fn list(&self) -> Vec<RulePack> {
        self.packs.read().expect("packs lock poisoned").clone()
    }

    pub fn get(&self, slug: &str) -> Result<RulePack> {
        self.packs
            .read()
            .expect("packs lock poisoned")
            .iter()
            .find(|p| p.slug == slug)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(slug.to_string()))
    }
}

fn scan_dir(dir: &Path, packs: &mut Vec<RulePack>, results: &mut Vec<LoadResult>) -> Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            if path.is_file() {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "dotfile".to_string(),
                    },
                });
            }
            continue;
        }
        if path.is_dir() {
            continue;
        }

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "yml" || e == "yaml")
            .unwrap_or(false);
        if !is_yaml {
            results.push(LoadResult {
                path,
                status: LoadStatus::Skipped {
                    reason: "not a YAML file".to_string(),
                },
            });
            continue;
        }

        let slug = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&name)
            .to_string();

        let loaded = fs::read_to_string(&path)
            .map_err(CatalogError::from)
            .and_then(|text| RulePack::from_source(&slug, text));
        match loaded {
            Ok(pack) => {
                info!(slug = %slug, path = %path.display(), "loaded rule pack");
                packs.retain(|p| p.slug != slug);
                packs.push(pack);
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Loaded { slug },
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load rule pack");
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Failed {
                        error: e.to_string(),
                    },
                });
            }
        }
    }
    Ok(())
}
