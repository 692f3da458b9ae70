use std::sync::Arc;

use axum::extract::Query;
use axum::{Extension, Json};
use orderflow_core::audit::{AuditLogEntry, AuditQuery};
use orderflow_core::principal::Actor;
use orderflow_core::service::OrderFlowService;

use super::{ok, ApiResponse};
use crate::error::AppError;

/// GET /api/audit - admin only; filters entity, entity_id, user_id, limit.
pub async fn list(
    Extension(actor): Extension<Actor>,
    Extension(service): Extension<Arc<OrderFlowService>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<Vec<AuditLogEntry>>>, AppError> {
    Ok(ok(service.list_audit(&actor, query).await?))
}
