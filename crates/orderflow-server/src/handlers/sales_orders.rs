//! Sales order (OV) handlers.
//!
//! GET   /api/sales-orders                              - list
//! POST  /api/sales-orders                              - direct create (admin)
//! GET   /api/sales-orders/:id                          - detail with shipment
//! PATCH /api/sales-orders/:id                          - edit notes/items
//! POST  /api/sales-orders/:id/status                   - transition (admin)
//! POST  /api/sales-orders/from-purchase-order/:po_id   - derive from an OC (admin)
//! POST  /api/sales-orders/:id/shipment                 - create its shipment (admin)

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::{Extension, Json};
use orderflow_core::model::{SalesOrder, SalesOrderDetail, SalesOrderFilter, Shipment};
use orderflow_core::principal::Actor;
use orderflow_core::service::{CreateSalesOrder, CreateShipment, OrderFlowService, UpdateSalesOrder};
use orderflow_core::status::SalesOrderStatus;
use uuid::Uuid;

use super::{ok, ApiResponse, StatusChange};
use crate::error::AppError;

type Service = Extension<Arc<OrderFlowService>>;

pub async fn list(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Query(filter): Query<SalesOrderFilter>,
) -> Result<Json<ApiResponse<Vec<SalesOrder>>>, AppError> {
    Ok(ok(service.list_sales_orders(&actor, filter).await?))
}

pub async fn get(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SalesOrderDetail>>, AppError> {
    Ok(ok(service.get_sales_order(&actor, id).await?))
}

pub async fn create(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Json(input): Json<CreateSalesOrder>,
) -> Result<Json<ApiResponse<SalesOrder>>, AppError> {
    Ok(ok(service.create_sales_order(&actor, input).await?))
}

pub async fn update(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSalesOrder>,
) -> Result<Json<ApiResponse<SalesOrder>>, AppError> {
    Ok(ok(service.update_sales_order(&actor, id, input).await?))
}

pub async fn change_status(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChange<SalesOrderStatus>>,
) -> Result<Json<ApiResponse<SalesOrder>>, AppError> {
    Ok(ok(service
        .change_sales_order_status(&actor, id, body.status)
        .await?))
}

pub async fn derive_from_purchase_order(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(po_id): Path<Uuid>,
) -> Result<Json<ApiResponse<SalesOrder>>, AppError> {
    Ok(ok(service
        .create_sales_order_from_purchase_order(&actor, po_id)
        .await?))
}

pub async fn create_shipment(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateShipment>,
) -> Result<Json<ApiResponse<Shipment>>, AppError> {
    Ok(ok(service
        .create_shipment_from_sales_order(&actor, id, input)
        .await?))
}
