//! Audit run endpoints, scoped by organization.

mod handlers;
mod types;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::AppState;

pub use handlers::*;
pub use types::*;

pub fn audits_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orgs/{org_id}/audits", get(list_audits))
        .route("/orgs/{org_id}/audits/run", post(run_audit))
        // static `baseline` segments win over `{id}`
        .route("/orgs/{org_id}/audits/baseline/summary", get(baseline_summary))
        .route("/orgs/{org_id}/audits/baseline", axum::routing::delete(unpin_baseline))
        .route("/orgs/{org_id}/audits/{id}", get(get_audit))
        .route("/orgs/{org_id}/audits/{id}/findings", get(get_findings))
        .route("/orgs/{org_id}/audits/{id}/baseline", put(pin_baseline))
        .route("/orgs/{org_id}/audits/{id}/reports/{format}", get(get_report))
}
