//! Error types and load result structures for the pack catalog.

use std::path::PathBuf;

use crate::validation::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid rule pack: {0}")]
    Invalid(#[from] ValidationError),

    #[error("rule pack '{0}' not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Outcome of loading a single pack file.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub status: LoadStatus,
}

#[derive(Debug)]
pub enum LoadStatus {
    Loaded { slug: String },
    /// Dotfile, non-YAML file, etc.
    Skipped { reason: String },
    Failed { error: String },
}
