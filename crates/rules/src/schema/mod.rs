//! YAML DSL schema types with serde (de)serialization.
//!
//! Defines the type hierarchy for rule documents:
//! - `RuleSetDocument`: the authored document (`name`, `version`, `metadata`, `rules`)
//! - `RuleDefinition`: one rule with its scope, `when` tree and `then` consequence
//! - `Condition` / `Predicate`: the boolean condition tree
//! - `RuleSet`: a stored, immutable revision of a document

mod condition;
mod document;
mod rule;

pub use condition::*;
pub use document::*;
pub use rule::*;
