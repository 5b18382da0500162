//! Boolean condition trees over invoice and item fields.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A condition node: a nested `all` / `any` / `not` group or a field predicate.
///
/// An empty `all` holds; an empty `any` does not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Condition {
    All { all: Vec<Condition> },
    Any { any: Vec<Condition> },
    Not { not: Box<Condition> },
    Predicate(Predicate),
}

impl Condition {
    /// Visit every predicate in the tree, depth first.
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect_predicates(&mut out);
        out
    }

    fn collect_predicates<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            Condition::All { all } => all.iter().for_each(|c| c.collect_predicates(out)),
            Condition::Any { any } => any.iter().for_each(|c| c.collect_predicates(out)),
            Condition::Not { not } => not.collect_predicates(out),
            Condition::Predicate(p) => out.push(p),
        }
    }
}

/// A comparison of one field against a literal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Predicate {
    /// Dotted path: `invoice.<field>` or `item.<field>`.
    pub field: String,
    pub op: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Operand>,
    /// Substituted when the field resolves to an empty value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Operand>,
}

/// Predicate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    In,
    NotIn,
    StartsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    Present,
    Absent,
}

impl Operator {
    pub const ALL: &'static [&'static str] = &[
        "eq", "ne", "in", "not_in", "starts_with", "gt", "gte", "lt", "lte", "present", "absent",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::StartsWith => "starts_with",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Present => "present",
            Operator::Absent => "absent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let op = match s {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "starts_with" => Operator::StartsWith,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "present" => Operator::Present,
            "absent" => Operator::Absent,
            _ => return None,
        };
        Some(op)
    }

    /// Ordering comparisons that need numeric operands.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte)
    }

    /// Operators whose `value` is a list (a bare scalar is accepted as a one-element list).
    pub fn takes_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn | Operator::StartsWith)
    }

    /// Operators that take no `value` at all.
    pub fn is_unary(&self) -> bool {
        matches!(self, Operator::Present | Operator::Absent)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A literal on the right-hand side of a predicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Operand {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Operand>),
}

impl Operand {
    /// Flatten to scalars: a list yields its elements, a scalar yields itself.
    pub fn scalars(&self) -> Vec<&Operand> {
        match self {
            Operand::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// Text form used for prefix and mixed text/number comparison.
    /// Integral numbers print without a fractional part (`6102`, not `6102.0`).
    pub fn as_text(&self) -> Option<String> {
        match self {
            Operand::Text(s) => Some(s.clone()),
            Operand::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Operand::Number(n) => Some(n.to_string()),
            Operand::Bool(_) | Operand::List(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Operand::Bool(b) => serde_json::Value::Bool(*b),
            Operand::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Operand::Text(s) => serde_json::Value::String(s.clone()),
            Operand::List(items) => serde_json::Value::Array(items.iter().map(Operand::to_json).collect()),
        }
    }
}
