//! Client and product handlers.
//!
//! GET    /api/clients          POST  /api/clients (admin)
//! GET    /api/clients/:id      PATCH /api/clients/:id (admin)
//! DELETE /api/clients/:id (admin)
//! GET    /api/products         ?search=&sku=&active=
//! POST   /api/products (admin)
//! GET    /api/products/:id     PATCH /api/products/:id (admin)
//! DELETE /api/products/:id (admin)

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::{Extension, Json};
use orderflow_core::model::{Client, Product, ProductFilter};
use orderflow_core::principal::Actor;
use orderflow_core::service::{
    CreateClient, CreateProduct, OrderFlowService, UpdateClient, UpdateProduct,
};
use uuid::Uuid;

use super::{ok, ApiResponse};
use crate::error::AppError;

type Service = Extension<Arc<OrderFlowService>>;

pub async fn list_clients(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
) -> Result<Json<ApiResponse<Vec<Client>>>, AppError> {
    Ok(ok(service.list_clients(&actor).await?))
}

pub async fn get_client(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Client>>, AppError> {
    Ok(ok(service.get_client(&actor, id).await?))
}

pub async fn create_client(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Json(input): Json<CreateClient>,
) -> Result<Json<ApiResponse<Client>>, AppError> {
    Ok(ok(service.create_client(&actor, input).await?))
}

pub async fn update_client(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateClient>,
) -> Result<Json<ApiResponse<Client>>, AppError> {
    Ok(ok(service.update_client(&actor, id, input).await?))
}

pub async fn delete_client(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Client>>, AppError> {
    Ok(ok(service.delete_client(&actor, id).await?))
}

pub async fn list_products(
    Extension(service): Service,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<ApiResponse<Vec<Product>>>, AppError> {
    Ok(ok(service.list_products(filter).await?))
}

pub async fn get_product(
    Extension(service): Service,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Product>>, AppError> {
    Ok(ok(service.get_product(id).await?))
}

pub async fn create_product(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Json(input): Json<CreateProduct>,
) -> Result<Json<ApiResponse<Product>>, AppError> {
    Ok(ok(service.create_product(&actor, input).await?))
}

pub async fn update_product(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProduct>,
) -> Result<Json<ApiResponse<Product>>, AppError> {
    Ok(ok(service.update_product(&actor, id, input).await?))
}

pub async fn delete_product(
    Extension(actor): Extension<Actor>,
    Extension(service): Service,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Product>>, AppError> {
    Ok(ok(service.delete_product(&actor, id).await?))
}
