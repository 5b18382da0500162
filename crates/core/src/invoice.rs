//! Invoice data model consumed by the audit engine.
//!
//! Invoices are materialized by the ingestion side; the engine only reads them.
//! Rules address invoice data through dotted field names (`invoice.uf`,
//! `item.cfop`) resolved by [`Invoice::field`] and [`InvoiceItem::field`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Tolerance used when comparing monetary sums.
pub const MONEY_EPSILON: f64 = 1e-9;

/// Field names resolvable on `invoice.*`, including derived values.
pub const INVOICE_FIELDS: &[&str] = &[
    "id",
    "access_key",
    "issuer_tax_id",
    "recipient_tax_id",
    "uf",
    "issue_date",
    "total_value",
    "freight_value",
    "has_st",
    "item_count",
    "items_total",
    "total_divergence",
];

/// Field names resolvable on `item.*`.
pub const ITEM_FIELDS: &[&str] = &[
    "seq",
    "product_code",
    "description",
    "ncm",
    "cest",
    "cfop",
    "cst",
    "quantity",
    "unit_value",
    "total_value",
    "discount",
    "icms_value",
    "icms_st_value",
];

/// Typed field values exposed to rule conditions and message templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Number(f64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Extract as string, returning None for non-text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    fn from_opt_str(value: &Option<String>) -> Self {
        match value.as_deref() {
            Some(s) if !s.trim().is_empty() => FieldValue::Text(s.to_string()),
            _ => FieldValue::Null,
        }
    }

    fn from_opt_f64(value: Option<f64>) -> Self {
        value.map(FieldValue::Number).unwrap_or(FieldValue::Null)
    }

    /// Convert to a JSON value for template rendering and evidence payloads.
    /// Integral numbers become JSON integers so `seq` renders as `2`, not `2.0`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Boolean(b) => serde_json::Value::Bool(*b),
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serde_json::Value::from(*n as i64)
            }
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
            FieldValue::Null => serde_json::Value::Null,
        }
    }
}

/// A tax invoice (NF-e) with its line items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: String,
    pub org_id: String,
    pub access_key: String,
    #[serde(alias = "emitente_cnpj")]
    pub issuer_tax_id: String,
    #[serde(alias = "destinatario_cnpj")]
    pub recipient_tax_id: String,
    pub uf: String,
    pub issue_date: NaiveDate,
    pub total_value: f64,
    #[serde(default)]
    pub freight_value: Option<f64>,
    #[serde(default)]
    pub has_st: bool,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
}

/// One line item of an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceItem {
    pub seq: u32,
    pub product_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ncm: Option<String>,
    #[serde(default)]
    pub cest: Option<String>,
    #[serde(default)]
    pub cfop: Option<String>,
    #[serde(default)]
    pub cst: Option<String>,
    pub quantity: f64,
    pub unit_value: f64,
    pub total_value: f64,
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub icms_value: Option<f64>,
    #[serde(default)]
    pub icms_st_value: Option<f64>,
}

impl Invoice {
    /// Sum of the line item totals.
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(|i| i.total_value).sum()
    }

    /// Absolute gap between the declared total and items + freight.
    pub fn total_divergence(&self) -> f64 {
        let expected = self.items_total() + self.freight_value.unwrap_or(0.0);
        let gap = (expected - self.total_value).abs();
        if gap < MONEY_EPSILON { 0.0 } else { gap }
    }

    /// Resolve an `invoice.*` field by its bare name.
    ///
    /// Returns `None` when the name is not part of the vocabulary and
    /// `Some(FieldValue::Null)` when the field exists but carries no value.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "id" => FieldValue::Text(self.id.clone()),
            "access_key" => FieldValue::Text(self.access_key.clone()),
            "issuer_tax_id" => FieldValue::Text(self.issuer_tax_id.clone()),
            "recipient_tax_id" => FieldValue::Text(self.recipient_tax_id.clone()),
            "uf" => FieldValue::Text(self.uf.clone()),
            "issue_date" => FieldValue::Text(self.issue_date.format("%Y-%m-%d").to_string()),
            "total_value" => FieldValue::Number(self.total_value),
            "freight_value" => FieldValue::from_opt_f64(self.freight_value),
            "has_st" => FieldValue::Boolean(self.has_st),
            "item_count" => FieldValue::Number(self.items.len() as f64),
            "items_total" => FieldValue::Number(self.items_total()),
            "total_divergence" => FieldValue::Number(self.total_divergence()),
            _ => return None,
        };
        Some(value)
    }

    /// All `invoice.*` fields as a JSON object, for template contexts.
    pub fn to_context(&self) -> serde_json::Value {
        let map = INVOICE_FIELDS
            .iter()
            .filter_map(|name| self.field(name).map(|v| (name.to_string(), v.to_json())))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl InvoiceItem {
    /// Resolve an `item.*` field by its bare name. Same contract as [`Invoice::field`].
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "seq" => FieldValue::Number(self.seq as f64),
            "product_code" => FieldValue::Text(self.product_code.clone()),
            "description" => FieldValue::Text(self.description.clone()),
            "ncm" => FieldValue::from_opt_str(&self.ncm),
            "cest" => FieldValue::from_opt_str(&self.cest),
            "cfop" => FieldValue::from_opt_str(&self.cfop),
            "cst" => FieldValue::from_opt_str(&self.cst),
            "quantity" => FieldValue::Number(self.quantity),
            "unit_value" => FieldValue::Number(self.unit_value),
            "total_value" => FieldValue::Number(self.total_value),
            "discount" => FieldValue::from_opt_f64(self.discount),
            "icms_value" => FieldValue::from_opt_f64(self.icms_value),
            "icms_st_value" => FieldValue::from_opt_f64(self.icms_st_value),
            _ => return None,
        };
        Some(value)
    }

    pub fn to_context(&self) -> serde_json::Value {
        let map = ITEM_FIELDS
            .iter()
            .filter_map(|name| self.field(name).map(|v| (name.to_string(), v.to_json())))
            .collect();
        serde_json::Value::Object(map)
    }
}

// ── Date range ────────────────────────────────────────────────

/// Inclusive issue-date window for an audit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::InvertedDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn invoice() -> Invoice {
        Invoice {
            id: "inv-1".to_string(),
            org_id: "org-1".to_string(),
            access_key: "35240112345678000199550010000000011000000010".to_string(),
            issuer_tax_id: "12345678000199".to_string(),
            recipient_tax_id: "99887766000155".to_string(),
            uf: "AM".to_string(),
            issue_date: date("2024-01-15"),
            total_value: 95.0,
            freight_value: Some(5.0),
            has_st: false,
            items: vec![
                InvoiceItem {
                    seq: 1,
                    product_code: "001".to_string(),
                    description: "Cerveja".to_string(),
                    ncm: Some("22030000".to_string()),
                    cest: None,
                    cfop: Some("6102".to_string()),
                    cst: Some("10".to_string()),
                    quantity: 1.0,
                    unit_value: 50.0,
                    total_value: 50.0,
                    discount: None,
                    icms_value: None,
                    icms_st_value: Some(0.0),
                },
                InvoiceItem {
                    seq: 2,
                    product_code: "002".to_string(),
                    description: "Perfume".to_string(),
                    ncm: Some("33030010".to_string()),
                    cest: Some("  ".to_string()),
                    cfop: Some("6101".to_string()),
                    cst: Some("60".to_string()),
                    quantity: 1.0,
                    unit_value: 30.0,
                    total_value: 30.0,
                    discount: None,
                    icms_value: None,
                    icms_st_value: None,
                },
            ],
        }
    }

    #[test]
    fn derived_totals() {
        let inv = invoice();
        assert_eq!(inv.items_total(), 80.0);
        // 80 + 5 freight vs 95 declared
        assert_eq!(inv.total_divergence(), 10.0);
        assert_eq!(inv.field("item_count"), Some(FieldValue::Number(2.0)));
    }

    #[test]
    fn unknown_fields_are_none_and_empty_fields_are_null() {
        let inv = invoice();
        assert_eq!(inv.field("nonexistent"), None);
        assert_eq!(inv.items[0].field("cest"), Some(FieldValue::Null));
        // whitespace-only text is treated as empty
        assert_eq!(inv.items[1].field("cest"), Some(FieldValue::Null));
        assert_eq!(inv.items[1].field("icms_st_value"), Some(FieldValue::Null));
        assert_eq!(
            inv.field("issue_date"),
            Some(FieldValue::Text("2024-01-15".to_string()))
        );
    }

    #[test]
    fn context_contains_every_vocabulary_field() {
        let inv = invoice();
        let ctx = inv.to_context();
        for name in INVOICE_FIELDS {
            assert!(ctx.get(name).is_some(), "missing {name}");
        }
        assert_eq!(ctx["uf"], "AM");
        assert_eq!(inv.items[0].to_context()["cfop"], "6102");
        assert_eq!(inv.items[1].to_context()["seq"], serde_json::json!(2));
        assert_eq!(ctx["total_value"], serde_json::json!(95));
        assert_eq!(FieldValue::Number(0.5).to_json(), serde_json::json!(0.5));
    }

    #[test]
    fn legacy_portuguese_keys_deserialize() {
        let json = r#"{
            "id": "inv-9", "org_id": "o", "access_key": "k",
            "emitente_cnpj": "1", "destinatario_cnpj": "2",
            "uf": "SP", "issue_date": "2024-02-01", "total_value": 10.0
        }"#;
        let inv: Invoice = serde_json::from_str(json).unwrap();
        assert_eq!(inv.issuer_tax_id, "1");
        assert_eq!(inv.recipient_tax_id, "2");
        assert!(inv.items.is_empty());
        assert!(!inv.has_st);
    }

    #[test]
    fn date_range_is_inclusive_and_ordered() {
        let range = DateRange::new(date("2024-01-01"), date("2024-01-31")).unwrap();
        assert!(range.contains(date("2024-01-01")));
        assert!(range.contains(date("2024-01-31")));
        assert!(!range.contains(date("2024-02-01")));

        let err = DateRange::new(date("2024-02-01"), date("2024-01-01")).unwrap_err();
        assert!(matches!(err, CoreError::InvertedDateRange { .. }));
    }
}
