//! HTTP handlers. Every success body is `{ "success": true, "data": ... }`.

pub mod audit;
pub mod health;
pub mod ingestion;
pub mod master_data;
pub mod purchase_orders;
pub mod sales_orders;
pub mod shipments;

use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// Body of the `/:id/status` endpoints.
#[derive(Debug, Deserialize)]
pub struct StatusChange<S> {
    pub status: S,
}
