use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use oraculo_audit::{BaselineSummaryCache, MemoryInvoiceSource, RuleSetRepository, RunStore};
use oraculo_core::{Config, Invoice};

use super::build_router;
use crate::state::AppState;

const OVERRIDE: &str = "
rules:
  - id: uf_fora_zfm
    name: UF fora da ZFM
    when: {field: invoice.uf, op: not_in, value: [AM, RR, AP, AC, RO]}
    then: {inconsistency_code: UF_DIVERGENT, severity: medium, message: 'UF {{ invoice.uf }}'}
";

fn invoice(id: &str, uf: &str, day: &str) -> Invoice {
    serde_json::from_value(json!({
        "id": id, "org_id": "org-1", "access_key": format!("KEY-{id}"),
        "issuer_tax_id": "11111111000111", "recipient_tax_id": "22222222000122",
        "uf": uf, "issue_date": day, "total_value": 100.0, "has_st": true,
        "items": [{"seq": 1, "product_code": "P1", "ncm": "84713012", "cfop": "5102",
                   "quantity": 1.0, "unit_value": 100.0, "total_value": 100.0}]
    }))
    .unwrap()
}

fn app(dir: &std::path::Path) -> Router {
    let mut config = Config::for_profile("ORACULO_ROUTER_TEST");
    config.storage.data_dir = dir.to_path_buf();
    config.storage.rule_packs_dir = dir.join("packs");
    config.audit.workers = 2;

    let source = MemoryInvoiceSource::new();
    source.insert(invoice("NF-1", "SP", "2024-04-02"));
    source.insert(invoice("NF-2", "AM", "2024-04-03"));

    let runs = Arc::new(RunStore::in_memory());
    let state = AppState::assemble(
        config,
        Arc::new(RuleSetRepository::in_memory()),
        runs.clone(),
        Arc::new(BaselineSummaryCache::new(runs)),
        Arc::new(source),
    )
    .unwrap();
    build_router(Arc::new(state))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

async fn wait_terminal(app: &Router, org: &str, id: &str) -> Value {
    for _ in 0..200 {
        let (_, run) = send(app, Method::GET, &format!("/orgs/{org}/audits/{id}"), None).await;
        if run["status"] == "done" || run["status"] == "failed" {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {id} did not finish");
}

#[tokio::test]
async fn health_reports_version() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = send(&app(dir.path()), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn baseline_is_seeded_from_default_pack() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let (status, body) = send(&app, Method::GET, "/rules/baseline", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 1);
    assert_eq!(body["rules"].as_array().unwrap().len(), 3);

    let (status, packs) = send(&app, Method::GET, "/rules/catalog", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(packs[0]["slug"], "zfm_baseline");

    let (status, _) = send(&app, Method::GET, "/rules/catalog/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn org_override_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, view) = send(&app, Method::GET, "/rules/org/org-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(view["override"].is_null());
    assert_eq!(view["effectiveVersion"], "baseline@1");

    let (status, view) = send(
        &app,
        Method::PUT,
        "/rules/org/org-1",
        Some(json!({"sourceText": OVERRIDE, "name": "Regras org-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["override"]["name"], "Regras org-1");
    assert_eq!(view["effectiveVersion"], "baseline@1+override@1");
    let ids: Vec<&str> = view["effectiveRules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["zfm_total_mismatch", "zfm_st_missing", "zfm_missing_cest", "uf_fora_zfm"]);
    assert!(view["effectiveSourceText"].as_str().unwrap().contains("uf_fora_zfm"));
}

#[tokio::test]
async fn invalid_source_is_422_with_every_issue() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let bad = "- id: r1\n  name: x\n  scope: lines\n  then: {inconsistency_code: C, severity: urgent, message: m}\n";

    let (status, body) = send(&app, Method::PUT, "/rules/org/org-1", Some(json!({"sourceText": bad}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["details"]["issues"].as_array().unwrap().len() >= 2);

    // nothing was stored
    let (_, view) = send(&app, Method::GET, "/rules/org/org-1", None).await;
    assert!(view["override"].is_null());

    let (status, report) = send(&app, Method::POST, "/rules/validate", Some(json!({"sourceText": bad}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["valid"], false);
}

#[tokio::test]
async fn audit_run_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    send(&app, Method::PUT, "/rules/org/org-1", Some(json!({"sourceText": OVERRIDE}))).await;

    let (_, summary) = send(&app, Method::GET, "/orgs/org-1/audits/baseline/summary", None).await;
    assert_eq!(summary["available"], false);

    let (status, run) = send(
        &app,
        Method::POST,
        "/orgs/org-1/audits/run",
        Some(json!({"dateStart": "2024-04-01", "dateEnd": "2024-04-30"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(run["status"], "queued");
    assert_eq!(run["rulesetVersionUsed"], "baseline@1+override@1");
    let id = run["id"].as_str().unwrap().to_string();

    let run = wait_terminal(&app, "org-1", &id).await;
    assert_eq!(run["status"], "done");
    assert_eq!(run["summary"]["processedInvoices"], 2);
    assert_eq!(run["summary"]["totalFindings"], 1);
    assert_eq!(run["summary"]["severityBreakdown"]["medium"], 1);

    let (_, findings) = send(&app, Method::GET, &format!("/orgs/org-1/audits/{id}/findings"), None).await;
    assert_eq!(findings[0]["invoiceId"], "NF-1");
    assert_eq!(findings[0]["message"], "UF SP");

    let (_, list) = send(&app, Method::GET, "/orgs/org-1/audits", None).await;
    assert_eq!(list[0]["findingCount"], 1);

    let (_, summary) = send(&app, Method::GET, "/orgs/org-1/audits/baseline/summary", None).await;
    assert_eq!(summary["available"], true);
    assert_eq!(summary["baseline"]["runId"], id.as_str());

    let (status, pinned) = send(&app, Method::PUT, &format!("/orgs/org-1/audits/{id}/baseline"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pinned["pinned"], true);

    let (status, body) = send(&app, Method::GET, &format!("/orgs/org-1/audits/{id}/reports/pdf"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");

    let (status, _) = send(&app, Method::GET, &format!("/orgs/org-1/audits/{id}/reports/csv"), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn run_request_errors() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, _) = send(
        &app,
        Method::POST,
        "/orgs/org-1/audits/run",
        Some(json!({"dateStart": "2024-05-01", "dateEnd": "2024-04-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        Method::POST,
        "/orgs/org-1/audits/run",
        Some(json!({"dateStart": "2024-04-01", "dateEnd": "2024-04-30", "rulesetVersion": "baseline@9"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, "/orgs/org-1/audits/unknown-run", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
