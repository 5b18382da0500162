//! Condition tree evaluation against one invoice (and optionally one item).

use std::collections::BTreeMap;

use oraculo_core::{FieldValue, Invoice, InvoiceItem, ITEM_FIELDS, MONEY_EPSILON};

use super::EvalError;
use crate::schema::{Condition, Operand, Operator, Predicate};

/// Data a condition is evaluated against, plus the field values it read.
pub(crate) struct EvalContext<'a> {
    pub invoice: &'a Invoice,
    pub item: Option<&'a InvoiceItem>,
    pub evidence: BTreeMap<String, serde_json::Value>,
}

impl<'a> EvalContext<'a> {
    pub fn new(invoice: &'a Invoice, item: Option<&'a InvoiceItem>) -> Self {
        Self {
            invoice,
            item,
            evidence: BTreeMap::new(),
        }
    }

    fn resolve(&self, field: &str) -> Result<FieldValue, EvalError> {
        let unknown = || EvalError::UnknownField {
            field: field.to_string(),
        };
        match field.split_once('.') {
            Some(("invoice", name)) => self.invoice.field(name).ok_or_else(unknown),
            Some(("item", name)) => {
                if !ITEM_FIELDS.contains(&name) {
                    return Err(unknown());
                }
                match self.item {
                    Some(item) => item.field(name).ok_or_else(unknown),
                    None => Err(EvalError::ItemFieldOutsideItemScope {
                        field: field.to_string(),
                    }),
                }
            }
            _ => Err(unknown()),
        }
    }
}

/// Recursively evaluate a condition node. `all` and `any` short-circuit
/// left to right.
pub(crate) fn eval_condition(condition: &Condition, ctx: &mut EvalContext<'_>) -> Result<bool, EvalError> {
    match condition {
        Condition::All { all } => {
            for c in all {
                if !eval_condition(c, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Any { any } => {
            for c in any {
                if eval_condition(c, ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Not { not } => Ok(!eval_condition(not, ctx)?),
        Condition::Predicate(p) => eval_predicate(p, ctx),
    }
}

fn eval_predicate(p: &Predicate, ctx: &mut EvalContext<'_>) -> Result<bool, EvalError> {
    let resolved = ctx.resolve(&p.field)?;
    ctx.evidence.insert(p.field.clone(), resolved.to_json());

    let value = match (&resolved, &p.default) {
        (FieldValue::Null, Some(default)) => operand_value(default),
        _ => resolved,
    };
    let operand = p.value.as_ref();

    let hit = match p.op {
        Operator::Present => !value.is_null(),
        Operator::Absent => value.is_null(),
        Operator::Eq => operand.is_some_and(|o| scalar_eq(&value, o)),
        Operator::Ne => !operand.is_some_and(|o| scalar_eq(&value, o)),
        Operator::In => operand.is_some_and(|o| o.scalars().into_iter().any(|s| scalar_eq(&value, s))),
        Operator::NotIn => !operand.is_some_and(|o| o.scalars().into_iter().any(|s| scalar_eq(&value, s))),
        Operator::StartsWith => {
            let text = match &value {
                FieldValue::Null => return Ok(false),
                FieldValue::Text(s) => s.clone(),
                FieldValue::Number(n) => Operand::Number(*n).as_text().unwrap_or_default(),
                FieldValue::Boolean(_) => return Err(mismatch(p, &value)),
            };
            operand.is_some_and(|o| {
                o.scalars()
                    .into_iter()
                    .filter_map(Operand::as_text)
                    .any(|prefix| text.starts_with(&prefix))
            })
        }
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            let lhs = match &value {
                FieldValue::Null => return Ok(false),
                FieldValue::Number(n) => *n,
                FieldValue::Text(s) => s.trim().parse::<f64>().map_err(|_| mismatch(p, &value))?,
                FieldValue::Boolean(_) => return Err(mismatch(p, &value)),
            };
            let Some(Operand::Number(rhs)) = operand else {
                return Err(mismatch(p, &value));
            };
            match p.op {
                Operator::Gt => lhs - rhs > MONEY_EPSILON,
                Operator::Gte => lhs - rhs > -MONEY_EPSILON,
                Operator::Lt => rhs - lhs > MONEY_EPSILON,
                _ => rhs - lhs > -MONEY_EPSILON,
            }
        }
    };
    Ok(hit)
}

fn operand_value(operand: &Operand) -> FieldValue {
    match operand {
        Operand::Bool(b) => FieldValue::Boolean(*b),
        Operand::Number(n) => FieldValue::Number(*n),
        Operand::Text(s) => FieldValue::Text(s.clone()),
        Operand::List(_) => FieldValue::Null,
    }
}

/// Equality with number/text coercion: `"6102"` equals `6102`.
fn scalar_eq(value: &FieldValue, operand: &Operand) -> bool {
    match (value, operand) {
        (FieldValue::Boolean(a), Operand::Bool(b)) => a == b,
        (FieldValue::Number(a), Operand::Number(b)) => (a - b).abs() < MONEY_EPSILON,
        (FieldValue::Text(a), Operand::Text(b)) => a == b,
        (FieldValue::Text(a), Operand::Number(b)) => a.trim().parse::<f64>().is_ok_and(|a| (a - b).abs() < MONEY_EPSILON),
        (FieldValue::Number(a), Operand::Text(b)) => b.trim().parse::<f64>().is_ok_and(|b| (a - b).abs() < MONEY_EPSILON),
        _ => false,
    }
}

fn mismatch(p: &Predicate, value: &FieldValue) -> EvalError {
    let found = match value {
        FieldValue::Boolean(b) => format!("boolean {b}"),
        FieldValue::Number(n) => format!("number {n}"),
        FieldValue::Text(s) => format!("text '{s}'"),
        FieldValue::Null => "nothing".to_string(),
    };
    EvalError::TypeMismatch {
        field: p.field.clone(),
        op: p.op,
        found,
    }
}
