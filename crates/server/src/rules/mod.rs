//! Rule set endpoints: global baseline, per-organization overrides,
//! validation and the rule pack catalog.

mod handlers;
mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub use handlers::*;
pub use types::*;

pub fn rules_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rules/baseline", get(get_baseline).put(put_baseline))
        .route("/rules/org/{org_id}", get(get_org_rules).put(put_org_rules))
        .route("/rules/validate", post(validate_rules))
        // /reload MUST precede /{slug}
        .route("/rules/catalog", get(list_catalog))
        .route("/rules/catalog/reload", post(reload_catalog))
        .route("/rules/catalog/{slug}", get(get_catalog_pack))
}
