//! `when` tree checks: group shape, predicate keys, operators and operand shapes.

use serde_yaml::{Mapping, Value};

use oraculo_core::{INVOICE_FIELDS, ITEM_FIELDS};

use super::fuzzy::did_you_mean;
use super::{describe, RuleReporter, MAX_CONDITION_DEPTH};
use crate::schema::{Operator, Scope};

const GROUP_KEYS: &[&str] = &["all", "any", "not"];
const PREDICATE_KEYS: &[&str] = &["field", "op", "value", "default"];

pub(super) fn check_condition(
    node: &Value,
    path: &str,
    depth: usize,
    scope: Scope,
    out: &mut RuleReporter<'_>,
) {
    if depth > MAX_CONDITION_DEPTH {
        out.error(
            path,
            format!("conditions nest deeper than {MAX_CONDITION_DEPTH} levels"),
        );
        return;
    }

    let Value::Mapping(map) = node else {
        out.error(path, format!("condition must be a mapping, got {}", describe(node)));
        return;
    };

    let groups: Vec<&str> = GROUP_KEYS
        .iter()
        .copied()
        .filter(|k| map.contains_key(*k))
        .collect();

    match groups.as_slice() {
        [] => check_predicate(map, path, scope, out),
        [group] if map.len() == 1 => {
            let child_path = format!("{path}.{group}");
            let child = map.get(*group).unwrap_or(&Value::Null);
            if *group == "not" {
                check_condition(child, &child_path, depth + 1, scope, out);
            } else if let Value::Sequence(children) = child {
                for (i, c) in children.iter().enumerate() {
                    check_condition(c, &format!("{child_path}[{i}]"), depth + 1, scope, out);
                }
            } else {
                out.error(
                    child_path,
                    format!("'{group}' must be a list of conditions, got {}", describe(child)),
                );
            }
        }
        _ => out.error(
            path,
            "a group must contain exactly one of 'all', 'any' or 'not' and nothing else",
        ),
    }
}

fn check_predicate(map: &Mapping, path: &str, scope: Scope, out: &mut RuleReporter<'_>) {
    for (key, _) in map {
        match key.as_str() {
            Some(k) if PREDICATE_KEYS.contains(&k) => {}
            Some(k) => {
                let candidates: Vec<&str> = PREDICATE_KEYS.iter().chain(GROUP_KEYS).copied().collect();
                out.error_with_suggestion(
                    format!("{path}.{k}"),
                    format!("unknown condition key '{k}'"),
                    did_you_mean(k, &candidates),
                );
            }
            None => out.error(path, "condition keys must be strings"),
        }
    }

    match map.get("field") {
        None => out.error(format!("{path}.field"), "missing required key 'field'"),
        Some(Value::String(f)) if f.trim().is_empty() => {
            out.error(format!("{path}.field"), "'field' must not be empty")
        }
        Some(Value::String(f)) => check_field_name(f, &format!("{path}.field"), scope, out),
        Some(other) => out.error(
            format!("{path}.field"),
            format!("'field' must be a string, got {}", describe(other)),
        ),
    }

    let op = match map.get("op") {
        None => {
            out.error(format!("{path}.op"), "missing required key 'op'");
            None
        }
        Some(Value::String(s)) => {
            let parsed = Operator::parse(s);
            if parsed.is_none() {
                out.error_with_suggestion(
                    format!("{path}.op"),
                    format!("unknown operator '{s}'"),
                    did_you_mean(s, Operator::ALL),
                );
            }
            parsed
        }
        Some(other) => {
            out.error(
                format!("{path}.op"),
                format!("'op' must be a string, got {}", describe(other)),
            );
            None
        }
    };

    if let Some(op) = op {
        check_operand(op, map.get("value"), &format!("{path}.value"), out);
    }

    match map.get("default") {
        None => {}
        Some(v) if is_scalar(v) => {}
        Some(other) => out.error(
            format!("{path}.default"),
            format!("'default' must be a scalar, got {}", describe(other)),
        ),
    }
}

fn check_operand(op: Operator, value: Option<&Value>, path: &str, out: &mut RuleReporter<'_>) {
    let value = value.filter(|v| !v.is_null());

    if op.is_unary() {
        if value.is_some() {
            out.error(path, format!("operator '{op}' takes no value"));
        }
        return;
    }

    let Some(value) = value else {
        out.error(path, format!("operator '{op}' requires a value"));
        return;
    };

    if op.is_numeric() {
        if !value.is_number() {
            out.error(
                path,
                format!("operator '{op}' requires a number, got {}", describe(value)),
            );
        }
    } else if op.takes_list() {
        match value {
            Value::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !is_scalar(item) {
                        out.error(
                            format!("{path}[{i}]"),
                            format!("list entries must be scalars, got {}", describe(item)),
                        );
                    }
                }
            }
            v if is_scalar(v) => {}
            other => out.error(
                path,
                format!("operator '{op}' requires a list or scalar, got {}", describe(other)),
            ),
        }
    } else if !is_scalar(value) {
        out.error(
            path,
            format!("operator '{op}' requires a scalar, got {}", describe(value)),
        );
    }
}

/// Unknown names and cross-scope references only warn: the rule still
/// saves and the evaluator reports a diagnostic when it runs.
fn check_field_name(field: &str, path: &str, scope: Scope, out: &mut RuleReporter<'_>) {
    let known = match field.split_once('.') {
        Some(("invoice", name)) => INVOICE_FIELDS.contains(&name),
        Some(("item", name)) => {
            if scope == Scope::Invoice && ITEM_FIELDS.contains(&name) {
                out.warn(
                    path,
                    format!("'{field}' is an item field but the rule has invoice scope"),
                    Some("set 'scope: item'".to_string()),
                );
                return;
            }
            ITEM_FIELDS.contains(&name)
        }
        _ => false,
    };
    if !known {
        let candidates = field_vocabulary();
        let refs: Vec<&str> = candidates.iter().map(String::as_str).collect();
        out.warn(path, format!("unknown field '{field}'"), did_you_mean(field, &refs));
    }
}

fn field_vocabulary() -> Vec<String> {
    INVOICE_FIELDS
        .iter()
        .map(|f| format!("invoice.{f}"))
        .chain(ITEM_FIELDS.iter().map(|f| format!("item.{f}")))
        .collect()
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}
