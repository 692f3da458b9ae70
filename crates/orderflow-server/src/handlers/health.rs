use std::sync::Arc;

use axum::{Extension, Json};
use orderflow_core::service::OrderFlowService;
use serde_json::{json, Value};

/// GET /health - liveness, no auth.
pub async fn health(Extension(service): Extension<Arc<OrderFlowService>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "orderflow",
        "version": env!("CARGO_PKG_VERSION"),
        "ai_extraction": service.ai_enabled(),
    }))
}
