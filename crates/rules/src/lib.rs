//! Tax-audit rule DSL: parsing, validation, composition and evaluation.
//!
//! This crate provides:
//! - YAML rule documents with serde (de)serialization
//! - Exhaustive validation with "did you mean" suggestions
//! - Baseline + organization override composition into an effective set
//! - Per-invoice rule evaluation with AND/OR/NOT condition trees
//! - A rule pack catalog scanned from disk plus an embedded default pack

pub mod catalog;
pub mod composer;
pub mod evaluator;
pub mod schema;
pub mod validation;

pub use composer::{compose, ComposeError, EffectiveRuleSet, EffectiveVersion, InvalidVersionLabel};
pub use evaluator::{EvalError, EvaluationDiagnostic, RuleEvaluator, RuleMatch, RuleOutcome};
pub use schema::*;
pub use validation::{
    parse_ruleset, validate_source, ParsedRuleSet, ValidationError, ValidationIssue, ValidationReport,
};
