//! Router construction for the OrderFlow server.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Extension, Router,
};
use orderflow_core::service::OrderFlowService;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::jwt::{jwt_auth, JwtConfig};

/// Build the full axum router with all routes and middleware.
pub fn build_router(
    service: Arc<OrderFlowService>,
    jwt_config: JwtConfig,
    max_upload_bytes: usize,
) -> Router {
    use handlers::{audit, ingestion, master_data, purchase_orders, sales_orders, shipments};

    let protected = Router::new()
        // Purchase orders
        .route(
            "/api/purchase-orders",
            get(purchase_orders::list).post(purchase_orders::create),
        )
        .route("/api/purchase-orders/upload", post(ingestion::upload))
        .route(
            "/api/purchase-orders/uploads/:archive_id/confirm",
            post(ingestion::confirm),
        )
        .route(
            "/api/purchase-orders/:id",
            get(purchase_orders::get).patch(purchase_orders::update),
        )
        .route(
            "/api/purchase-orders/:id/status",
            post(purchase_orders::change_status),
        )
        // Sales orders
        .route(
            "/api/sales-orders",
            get(sales_orders::list).post(sales_orders::create),
        )
        .route(
            "/api/sales-orders/from-purchase-order/:po_id",
            post(sales_orders::derive_from_purchase_order),
        )
        .route(
            "/api/sales-orders/:id",
            get(sales_orders::get).patch(sales_orders::update),
        )
        .route(
            "/api/sales-orders/:id/status",
            post(sales_orders::change_status),
        )
        .route(
            "/api/sales-orders/:id/shipment",
            post(sales_orders::create_shipment),
        )
        // Shipments
        .route("/api/shipments", get(shipments::list))
        .route(
            "/api/shipments/:id",
            get(shipments::get).patch(shipments::update),
        )
        .route(
            "/api/shipments/:id/events",
            get(shipments::list_events).post(shipments::add_event),
        )
        // Master data
        .route(
            "/api/clients",
            get(master_data::list_clients).post(master_data::create_client),
        )
        .route(
            "/api/clients/:id",
            get(master_data::get_client)
                .patch(master_data::update_client)
                .delete(master_data::delete_client),
        )
        .route(
            "/api/products",
            get(master_data::list_products).post(master_data::create_product),
        )
        .route(
            "/api/products/:id",
            get(master_data::get_product)
                .patch(master_data::update_product)
                .delete(master_data::delete_product),
        )
        .route("/api/audit", get(audit::list))
        .layer(axum_mw::from_fn(jwt_auth))
        .layer(Extension(jwt_config));

    // Public routes (no auth)
    let public = Router::new().route("/health", get(handlers::health::health));

    public
        .merge(protected)
        .layer(Extension(service))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
