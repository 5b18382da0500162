//! Rule pack catalog: reusable, named rule sets offered as seed content.
//!
//! Packs are YAML rule set documents. The catalog always carries the
//! embedded default pack and adds every valid `*.yml` / `*.yaml` file found
//! under the pack directory. A file whose stem matches an embedded slug
//! replaces the embedded pack.

mod core;
mod error;

#[cfg(test)]
mod tests;

pub use self::core::{RulePack, RulePackCatalog, DEFAULT_PACK_SLUG, DEFAULT_PACK_SOURCE};
pub use self::error::{CatalogError, LoadResult, LoadStatus, Result};
