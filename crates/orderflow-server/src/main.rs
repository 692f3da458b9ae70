//! orderflow-server - REST API for purchase orders, sales orders and
//! shipments. Configuration comes from the environment; see `config`.

use std::net::SocketAddr;
use std::sync::Arc;

use orderflow_core::audit::AuditRecorder;
use orderflow_core::service::OrderFlowService;
use orderflow_postgres::{migrate, PgStores};
use orderflow_server::blob::LocalBlobStore;
use orderflow_server::config::ServerConfig;
use orderflow_server::gemini::{GeminiConfig, GeminiExtractor};
use orderflow_server::middleware::jwt::JwtConfig;
use orderflow_server::router::build_router;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

const AUDIT_QUEUE_CAPACITY: usize = 1024;
const AUDIT_MAX_ATTEMPTS: usize = 5;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,orderflow_server=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env().expect("invalid server configuration");

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    tracing::info!("Connected to database");

    if config.run_migrations {
        migrate(&pool).await.expect("failed to apply migrations");
        tracing::info!("Migrations applied");
    }

    let blobs = Arc::new(LocalBlobStore::new(&config.upload_dir));
    let ports = PgStores::new(pool).into_ports(blobs);

    let audit = if config.audit_queue {
        let (recorder, dispatcher) =
            AuditRecorder::queued(ports.audit.clone(), AUDIT_QUEUE_CAPACITY, AUDIT_MAX_ATTEMPTS);
        tokio::spawn(dispatcher.run());
        recorder
    } else {
        AuditRecorder::direct(ports.audit.clone())
    };

    let mut service = OrderFlowService::new(ports, audit).with_derivation_policy(config.derivation);
    match &config.gemini {
        Some(settings) => {
            let extractor = GeminiExtractor::new(GeminiConfig::new(
                settings.api_key.clone(),
                settings.model.clone(),
                settings.timeout,
            ))
            .expect("failed to build Gemini client");
            service = service.with_extractor(Arc::new(extractor));
            tracing::info!(model = %settings.model, "AI extraction enabled");
        }
        None => tracing::warn!("GEMINI_API_KEY not set, AI extraction disabled"),
    }
    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        derivation = ?config.derivation,
        audit_queue = config.audit_queue,
        "OrderFlowService ready"
    );

    let jwt_config = JwtConfig::from_secret(config.jwt_secret.as_bytes());
    let app = build_router(Arc::new(service), jwt_config, config.max_upload_bytes);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {}: {e}", config.bind_addr));
    tracing::info!("orderflow-server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
