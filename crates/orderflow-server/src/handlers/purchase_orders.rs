//! Purchase order (OC) handlers.
//!
//! GET   /api/purchase-orders             - list (status, client_id, code, limit, offset)
//! POST  /api/purchase-orders             - manual create
//! GET   /api/purchase-orders/:id         - detail with items
//! PATCH /api/purchase-orders/:id         - edit notes
//! POST  /api/purchase-orders/:id/status  - transition (admin)

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::{Extension, Json};
use orderflow_core::model::{PurchaseOrder, PurchaseOrderFilter};
use orderflow_core::principal::Actor;
use orderflow_core::service::{CreatePurchaseOrder, OrderFlowService, UpdatePurchaseOrder};
use orderflow_core::status::PurchaseOrderStatus;
use uuid::Uuid;

use super::{ok, ApiResponse, StatusChange};
use crate::error::AppError;

type Service = Extension<Arc<OrderFlowService>>;

pub async fn list(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Query(filter): Query<PurchaseOrderFilter>,
) -> Result<Json<ApiResponse<Vec<PurchaseOrder>>>, AppError> {
    Ok(ok(service.list_purchase_orders(&actor, filter).await?))
}

pub async fn get(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PurchaseOrder>>, AppError> {
    Ok(ok(service.get_purchase_order(&actor, id).await?))
}

pub async fn create(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Json(input): Json<CreatePurchaseOrder>,
) -> Result<Json<ApiResponse<PurchaseOrder>>, AppError> {
    Ok(ok(service.create_purchase_order(&actor, input).await?))
}

pub async fn update(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePurchaseOrder>,
) -> Result<Json<ApiResponse<PurchaseOrder>>, AppError> {
    Ok(ok(service.update_purchase_order(&actor, id, input).await?))
}

pub async fn change_status(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChange<PurchaseOrderStatus>>,
) -> Result<Json<ApiResponse<PurchaseOrder>>, AppError> {
    let order = service
        .change_purchase_order_status(&actor, id, body.status)
        .await?;
    Ok(ok(order))
}
