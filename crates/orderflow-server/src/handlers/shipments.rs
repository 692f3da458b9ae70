//! Shipment (Envío) handlers.
//!
//! GET   /api/shipments             - list (status, client_id, limit, offset)
//! GET   /api/shipments/:id         - detail with events
//! PATCH /api/shipments/:id         - carrier/dates (admin)
//! GET   /api/shipments/:id/events  - tracking timeline
//! POST  /api/shipments/:id/events  - append a tracking event (admin)

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::{Extension, Json};
use orderflow_core::model::{Shipment, ShipmentEvent, ShipmentFilter};
use orderflow_core::principal::Actor;
use orderflow_core::service::{AddShipmentEvent, OrderFlowService, UpdateShipment};
use uuid::Uuid;

use super::{ok, ApiResponse};
use crate::error::AppError;

type Service = Extension<Arc<OrderFlowService>>;

pub async fn list(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Query(filter): Query<ShipmentFilter>,
) -> Result<Json<ApiResponse<Vec<Shipment>>>, AppError> {
    Ok(ok(service.list_shipments(&actor, filter).await?))
}

pub async fn get(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Shipment>>, AppError> {
    Ok(ok(service.get_shipment(&actor, id).await?))
}

pub async fn update(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateShipment>,
) -> Result<Json<ApiResponse<Shipment>>, AppError> {
    Ok(ok(service.update_shipment(&actor, id, input).await?))
}

pub async fn list_events(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<ShipmentEvent>>>, AppError> {
    Ok(ok(service.list_shipment_events(&actor, id).await?))
}

pub async fn add_event(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
    Json(input): Json<AddShipmentEvent>,
) -> Result<Json<ApiResponse<Shipment>>, AppError> {
    Ok(ok(service.add_shipment_event(&actor, id, input).await?))
}
