//! Tests for parsing and validation.

use super::*;
use crate::schema::{Condition, Scope, Severity};

fn rule_yaml(id: &str, severity: &str) -> String {
    format!(
        "- id: {id}\n  name: Rule {id}\n  when:\n    field: invoice.uf\n    op: eq\n    value: AM\n  then:\n    inconsistency_code: UF_{id}\n    severity: {severity}\n    message: \"UF {{{{ invoice.uf }}}}\"\n"
    )
}

#[test]
fn parses_list_form() {
    let parsed = parse_ruleset(&rule_yaml("R1", "high")).unwrap();
    assert_eq!(parsed.document.rules.len(), 1);
    assert_eq!(parsed.document.rules[0].consequence.severity, Severity::High);
    assert!(parsed.document.name.is_none());
    assert!(parsed.warnings.is_empty());
}

#[test]
fn parses_mapping_form_with_header() {
    let src = "name: Base\nversion: 2024.04\nmetadata:\n  owner: fiscal\n  tags: [zfm]\nrules: []\n";
    let parsed = parse_ruleset(src).unwrap();
    assert_eq!(parsed.document.name.as_deref(), Some("Base"));
    assert_eq!(parsed.document.version.as_deref(), Some("2024.04"));
    assert_eq!(parsed.document.metadata["tags"], serde_json::json!(["zfm"]));
    assert!(parsed.document.rules.is_empty());
}

#[test]
fn empty_list_is_valid() {
    assert!(parse_ruleset("[]").unwrap().document.rules.is_empty());
}

#[test]
fn empty_document_is_rejected() {
    let err = parse_ruleset("").unwrap_err();
    assert_eq!(err.issues.len(), 1);
    assert!(err.issues[0].message.contains("empty"));
}

#[test]
fn yaml_syntax_error_is_reported() {
    let err = parse_ruleset("rules: [\n  - id: x").unwrap_err();
    assert!(err.issues[0].message.starts_with("YAML parse error"));
}

#[test]
fn missing_rules_key_suggests_spelling() {
    let report = validate_source("name: x\nrule: []\n");
    assert!(!report.valid);
    let unknown = report.errors.iter().find(|e| e.path == "rule").unwrap();
    assert_eq!(unknown.suggestion.as_deref(), Some("did you mean 'rules'?"));
    assert!(report.errors.iter().any(|e| e.message.contains("missing required key 'rules'")));
}

#[test]
fn every_offending_rule_is_reported() {
    let src = "
- id: A
  name: Missing then
- id: B
  name: Bad severity
  then:
    inconsistency_code: X
    severity: hihg
    message: m
- id: C
  name: Fine
  then:
    inconsistency_code: Y
    severity: low
    message: m
- id: D
  name: Bad op
  when:
    field: invoice.uf
    op: equals
    value: AM
  then:
    inconsistency_code: Z
    severity: low
    message: m
";
    let err = parse_ruleset(src).unwrap_err();
    let ids: Vec<_> = err.issues.iter().filter_map(|i| i.rule_id.as_deref()).collect();
    assert_eq!(ids, vec!["A", "B", "D"]);

    let severity = &err.issues[1];
    assert_eq!(severity.position, Some(1));
    assert_eq!(severity.path, "rules[1].then.severity");
    assert_eq!(severity.suggestion.as_deref(), Some("did you mean 'high'?"));

    let op = &err.issues[2];
    assert_eq!(op.path, "rules[3].when.op");
}

#[test]
fn duplicate_ids_are_rejected() {
    let src = format!("{}{}", rule_yaml("DUP", "low"), rule_yaml("DUP", "high"));
    let err = parse_ruleset(&src).unwrap_err();
    assert_eq!(err.issues.len(), 1);
    assert_eq!(err.issues[0].position, Some(1));
    assert!(err.issues[0].message.contains("first defined at rules[0]"));
}

#[test]
fn unknown_scope_and_keys_are_rejected() {
    let src = "
- id: S
  name: s
  scope: itens
  severity: low
  then:
    inconsistency_code: X
    severity: low
    message: m
    sugestion_code: Y
";
    let err = parse_ruleset(src).unwrap_err();
    let paths: Vec<_> = err.issues.iter().map(|i| i.path.as_str()).collect();
    assert!(paths.contains(&"rules[0].severity"));
    assert!(paths.contains(&"rules[0].scope"));
    assert!(paths.contains(&"rules[0].then.sugestion_code"));
    let scope = err.issues.iter().find(|i| i.path == "rules[0].scope").unwrap();
    assert_eq!(scope.suggestion.as_deref(), Some("did you mean 'item'?"));
}

#[test]
fn operand_shapes_are_checked() {
    let src = "
- id: O
  name: o
  scope: item
  when:
    all:
      - field: item.quantity
        op: gt
        value: many
      - field: item.cest
        op: absent
        value: x
      - field: item.cfop
        op: in
      - any: {}
  then:
    inconsistency_code: X
    severity: low
    message: m
";
    let err = parse_ruleset(src).unwrap_err();
    let paths: Vec<_> = err.issues.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "rules[0].when.all[0].value",
            "rules[0].when.all[1].value",
            "rules[0].when.all[2].value",
            "rules[0].when.all[3].any",
        ]
    );
}

#[test]
fn mixed_group_node_is_rejected() {
    let src = "
- id: G
  name: g
  when:
    all: []
    field: invoice.uf
  then: {inconsistency_code: X, severity: low, message: m}
";
    let err = parse_ruleset(src).unwrap_err();
    assert_eq!(err.issues[0].path, "rules[0].when");
}

#[test]
fn nesting_depth_is_bounded() {
    let mut when = String::from("field: invoice.uf\nop: present");
    for _ in 0..MAX_CONDITION_DEPTH {
        when = format!("not:\n{}", indent(&when));
    }
    let src = format!(
        "- id: DEEP\n  name: d\n  when:\n{}\n  then: {{inconsistency_code: X, severity: low, message: m}}\n",
        indent(&indent(&when))
    );
    let err = parse_ruleset(&src).unwrap_err();
    assert!(err.issues[0].message.contains("nest deeper"));
}

fn indent(s: &str) -> String {
    s.lines().map(|l| format!("  {l}")).collect::<Vec<_>>().join("\n")
}

#[test]
fn field_problems_only_warn() {
    let src = "
- id: W
  name: w
  when:
    any:
      - field: invoice.totl_value
        op: gt
        value: 10
      - field: item.cfop
        op: starts_with
        value: '6'
  then:
    inconsistency_code: X
    severity: medio
    message_pt: 'Valor {{ invoice.total_value'
";
    let parsed = parse_ruleset(src).unwrap();
    let rule = &parsed.document.rules[0];
    assert_eq!(rule.scope, Scope::Invoice);
    assert_eq!(rule.consequence.severity, Severity::Medium);
    assert!(matches!(rule.condition, Some(Condition::Any { .. })));

    assert_eq!(parsed.warnings.len(), 3);
    assert_eq!(parsed.warnings[0].suggestion.as_deref(), Some("did you mean 'invoice.total_value'?"));
    assert_eq!(parsed.warnings[1].suggestion.as_deref(), Some("set 'scope: item'"));
    assert_eq!(parsed.warnings[2].path, "rules[0].then.message_pt");
}

#[test]
fn message_and_message_pt_conflict() {
    let src = "- id: M\n  name: m\n  then: {inconsistency_code: X, severity: low, message: a, message_pt: b}\n";
    let err = parse_ruleset(src).unwrap_err();
    assert!(err.issues[0].message.contains("not both"));
}

#[test]
fn error_display_mentions_first_issue() {
    let err = parse_ruleset("- id: A\n  name: a\n").unwrap_err();
    let text = err.to_string();
    assert!(text.starts_with("invalid rule set (1 issue(s)): [A] rules[0].then"));
}
