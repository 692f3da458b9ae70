//! Postgres implementations of the orderflow-core port traits.
//!
//! Each adapter is a newtype wrapping PgPool. All SQL is runtime-checked
//! (sqlx::query, not sqlx::query!) so building needs no live database.

mod error;
mod rows;

pub mod audit;
pub mod master_data;
pub mod orders;
pub mod sequence;
pub mod shipments;

use std::sync::Arc;

use anyhow::Context;
use orderflow_core::ports::BlobStore;
use orderflow_core::service::Ports;
use sqlx::PgPool;

pub use audit::PgAuditStore;
pub use master_data::{PgArchiveStore, PgClientStore, PgProductStore};
pub use orders::{PgPurchaseOrderStore, PgSalesOrderStore};
pub use sequence::PgCodeSequence;
pub use shipments::PgShipmentStore;

/// Every Postgres store, sharing one pool.
pub struct PgStores {
    pub purchase_orders: PgPurchaseOrderStore,
    pub sales_orders: PgSalesOrderStore,
    pub shipments: PgShipmentStore,
    pub clients: PgClientStore,
    pub products: PgProductStore,
    pub archives: PgArchiveStore,
    pub audit: PgAuditStore,
    pub codes: PgCodeSequence,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            purchase_orders: PgPurchaseOrderStore::new(pool.clone()),
            sales_orders: PgSalesOrderStore::new(pool.clone()),
            shipments: PgShipmentStore::new(pool.clone()),
            clients: PgClientStore::new(pool.clone()),
            products: PgProductStore::new(pool.clone()),
            archives: PgArchiveStore::new(pool.clone()),
            audit: PgAuditStore::new(pool.clone()),
            codes: PgCodeSequence::new(pool),
        }
    }

    /// Wire the stores into the service's port bundle. Blob storage is not
    /// database-backed and comes from the caller.
    pub fn into_ports(self, blobs: Arc<dyn BlobStore>) -> Ports {
        Ports {
            purchase_orders: Arc::new(self.purchase_orders),
            sales_orders: Arc::new(self.sales_orders),
            shipments: Arc::new(self.shipments),
            clients: Arc::new(self.clients),
            products: Arc::new(self.products),
            archives: Arc::new(self.archives),
            audit: Arc::new(self.audit),
            codes: Arc::new(self.codes),
            blobs,
        }
    }
}

/// Apply pending migrations, including the one-time rewrite of legacy
/// status values.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    Ok(())
}
