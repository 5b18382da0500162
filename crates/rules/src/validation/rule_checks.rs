//! Per-rule structural checks: identity, scope, flags and the `then` block.

use std::collections::HashMap;

use serde_yaml::{Mapping, Value};

use super::condition_checks::check_condition;
use super::fuzzy::did_you_mean;
use super::{describe, RuleReporter, ValidationReport};
use crate::evaluator::template::template_syntax_error;
use crate::schema::{RuleDefinition, Scope, Severity};

const RULE_KEYS: &[&str] = &["id", "name", "description", "scope", "disabled", "when", "then"];

const THEN_KEYS: &[&str] = &[
    "inconsistency_code",
    "severity",
    "message",
    "message_pt",
    "suggestion_code",
    "references",
];

/// Check one raw rule. Returns the typed rule when it produced no errors.
pub(super) fn check_rule(
    position: usize,
    raw: &Value,
    seen_ids: &mut HashMap<String, usize>,
    report: &mut ValidationReport,
) -> Option<RuleDefinition> {
    let base = format!("rules[{position}]");

    let Value::Mapping(map) = raw else {
        report
            .for_rule(position, None)
            .error(base, format!("rule must be a mapping, got {}", describe(raw)));
        return None;
    };

    let rule_id = map
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let mut out = report.for_rule(position, rule_id.clone());
    let errors_before = out.error_count();

    for (key, _) in map {
        match key.as_str() {
            Some(k) if RULE_KEYS.contains(&k) => {}
            Some(k) => out.error_with_suggestion(
                format!("{base}.{k}"),
                format!("unknown rule key '{k}'"),
                did_you_mean(k, RULE_KEYS),
            ),
            None => out.error(&base, format!("rule keys must be strings, got {}", describe(key))),
        }
    }

    // id
    match (map.get("id"), &rule_id) {
        (None, _) => out.error(format!("{base}.id"), "missing required key 'id'"),
        (Some(Value::String(_)), None) => out.error(format!("{base}.id"), "id must not be empty"),
        (Some(Value::String(_)), Some(id)) => {
            if let Some(first) = seen_ids.get(id) {
                out.error(
                    format!("{base}.id"),
                    format!("duplicate rule id '{id}' (first defined at rules[{first}])"),
                );
            } else {
                seen_ids.insert(id.clone(), position);
            }
        }
        (Some(other), _) => out.error_with_suggestion(
            format!("{base}.id"),
            format!("id must be a string, got {}", describe(other)),
            Some("quote the id so it is read as text".to_string()),
        ),
    }

    check_required_text(map, "name", &base, &mut out);
    check_optional_text(map, "description", &base, &mut out);

    let scope = match map.get("scope") {
        None | Some(Value::Null) => Scope::Invoice,
        Some(Value::String(s)) => match s.as_str() {
            "invoice" => Scope::Invoice,
            "item" => Scope::Item,
            other => {
                out.error_with_suggestion(
                    format!("{base}.scope"),
                    format!("unknown scope '{other}', expected one of: invoice, item"),
                    did_you_mean(other, Scope::ALL),
                );
                Scope::Invoice
            }
        },
        Some(other) => {
            out.error(format!("{base}.scope"), format!("scope must be a string, got {}", describe(other)));
            Scope::Invoice
        }
    };

    match map.get("disabled") {
        None | Some(Value::Null) | Some(Value::Bool(_)) => {}
        Some(other) => out.error(
            format!("{base}.disabled"),
            format!("disabled must be true or false, got {}", describe(other)),
        ),
    }

    match map.get("when") {
        None | Some(Value::Null) => {}
        Some(node) => check_condition(node, &format!("{base}.when"), 1, scope, &mut out),
    }

    match map.get("then") {
        None => out.error(format!("{base}.then"), "missing required key 'then'"),
        Some(Value::Mapping(then)) => check_consequence(then, &format!("{base}.then"), &mut out),
        Some(other) => out.error(
            format!("{base}.then"),
            format!("then must be a mapping, got {}", describe(other)),
        ),
    }

    if out.error_count() != errors_before {
        return None;
    }

    match serde_yaml::from_value::<RuleDefinition>(raw.clone()) {
        Ok(mut rule) => {
            rule.id = rule.id.trim().to_string();
            Some(rule)
        }
        Err(e) => {
            out.error(&base, format!("invalid rule: {e}"));
            None
        }
    }
}

fn check_consequence(then: &Mapping, base: &str, out: &mut RuleReporter<'_>) {
    for (key, _) in then {
        match key.as_str() {
            Some(k) if THEN_KEYS.contains(&k) => {}
            Some(k) => out.error_with_suggestion(
                format!("{base}.{k}"),
                format!("unknown consequence key '{k}'"),
                did_you_mean(k, THEN_KEYS),
            ),
            None => out.error(base, "consequence keys must be strings"),
        }
    }

    check_required_text(then, "inconsistency_code", base, out);

    match then.get("severity") {
        None => out.error(format!("{base}.severity"), "missing required key 'severity'"),
        Some(Value::String(s)) => {
            if s.parse::<Severity>().is_err() || s.trim() != s || s.to_lowercase() != *s {
                out.error_with_suggestion(
                    format!("{base}.severity"),
                    format!("unknown severity '{s}', expected one of: low, medium, high, critical"),
                    did_you_mean(s, Severity::ACCEPTED),
                );
            }
        }
        Some(other) => out.error(
            format!("{base}.severity"),
            format!("severity must be a string, got {}", describe(other)),
        ),
    }

    let message_key = match (then.get("message"), then.get("message_pt")) {
        (Some(_), Some(_)) => {
            out.error(
                format!("{base}.message_pt"),
                "use either 'message' or 'message_pt', not both",
            );
            None
        }
        (Some(_), None) => Some("message"),
        (None, Some(_)) => Some("message_pt"),
        (None, None) => {
            out.error(format!("{base}.message"), "missing required key 'message'");
            None
        }
    };
    if let Some(key) = message_key {
        if check_required_text(then, key, base, out) {
            if let Some(template) = then.get(key).and_then(Value::as_str) {
                if let Some(problem) = template_syntax_error(template) {
                    out.warn(
                        format!("{base}.{key}"),
                        format!("message template will render verbatim: {problem}"),
                        None,
                    );
                }
            }
        }
    }

    check_optional_text(then, "suggestion_code", base, out);

    match then.get("references") {
        None | Some(Value::Null) => {}
        Some(Value::Sequence(items)) => {
            for (i, item) in items.iter().enumerate() {
                if !matches!(item, Value::String(_)) {
                    out.error(
                        format!("{base}.references[{i}]"),
                        format!("reference must be a string, got {}", describe(item)),
                    );
                }
            }
        }
        Some(other) => out.error(
            format!("{base}.references"),
            format!("references must be a list of strings, got {}", describe(other)),
        ),
    }
}

/// Require a non-empty string under `key`. Returns true when it is one.
fn check_required_text(map: &Mapping, key: &str, base: &str, out: &mut RuleReporter<'_>) -> bool {
    let path = format!("{base}.{key}");
    match map.get(key) {
        None => {
            out.error(path, format!("missing required key '{key}'"));
            false
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            out.error(path, format!("'{key}' must not be empty"));
            false
        }
        Some(Value::String(_)) => true,
        Some(other) => {
            out.error(path, format!("'{key}' must be a string, got {}", describe(other)));
            false
        }
    }
}

fn check_optional_text(map: &Mapping, key: &str, base: &str, out: &mut RuleReporter<'_>) {
    match map.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(other) => out.error(
            format!("{base}.{key}"),
            format!("'{key}' must be a string, got {}", describe(other)),
        ),
    }
}
