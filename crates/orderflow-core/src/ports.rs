//! Port traits implemented by storage and integration adapters.
//!
//! `orderflow-postgres` implements the stores, `orderflow-server` the blob
//! store and document extractor; `memory` provides test doubles.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogEntry, AuditQuery};
use crate::codes::CodeKind;
use crate::error::OrderFlowError;
use crate::ingestion::ExtractedOrder;
use crate::model::*;
use crate::status::{PurchaseOrderStatus, SalesOrderStatus};

pub type Result<T> = std::result::Result<T, OrderFlowError>;

#[async_trait]
pub trait PurchaseOrderStore: Send + Sync {
    /// Insert order and items atomically. `DuplicateCode` on code collision.
    async fn create(&self, order: &PurchaseOrder) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<PurchaseOrder>>;
    /// Newest first.
    async fn list(&self, filter: &PurchaseOrderFilter) -> Result<Vec<PurchaseOrder>>;
    /// Compare-and-set: `Conflict` if the stored status is no longer `expected`.
    async fn update_status(
        &self,
        id: Uuid,
        expected: PurchaseOrderStatus,
        new: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder>;
    async fn update_notes(&self, id: Uuid, notes: Option<String>) -> Result<PurchaseOrder>;
    async fn code_exists(&self, code: &str) -> Result<bool>;
}

#[async_trait]
pub trait SalesOrderStore: Send + Sync {
    async fn create(&self, order: &SalesOrder) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<SalesOrder>>;
    async fn list(&self, filter: &SalesOrderFilter) -> Result<Vec<SalesOrder>>;
    async fn update_status(
        &self,
        id: Uuid,
        expected: SalesOrderStatus,
        new: SalesOrderStatus,
    ) -> Result<SalesOrder>;
    /// Replace notes, and items + total when `items` is given, in one write.
    async fn update_contents(
        &self,
        id: Uuid,
        notes: Option<String>,
        items: Option<Vec<LineItem>>,
    ) -> Result<SalesOrder>;
    async fn count_for_purchase_order(&self, purchase_order_id: Uuid) -> Result<i64>;
}

/// Partial update of shipment details. Status is never set here.
#[derive(Debug, Clone, Default)]
pub struct ShipmentChanges {
    pub carrier: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub estimated_arrival: Option<NaiveDate>,
}

#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Insert shipment and its initial events. `Conflict` when the sales
    /// order already has a shipment, `DuplicateCode` on code collision.
    async fn create(&self, shipment: &Shipment) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Shipment>>;
    async fn get_by_sales_order(&self, sales_order_id: Uuid) -> Result<Option<Shipment>>;
    async fn list(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>>;
    async fn update_details(&self, id: Uuid, changes: &ShipmentChanges) -> Result<Shipment>;
    /// Insert the event and set the shipment status to the event status in
    /// one transaction.
    async fn append_event(&self, event: &ShipmentEvent) -> Result<Shipment>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    /// `Conflict` on duplicate tax id.
    async fn create(&self, client: &Client) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Client>>;
    async fn list(&self) -> Result<Vec<Client>>;
    async fn find_by_tax_id(&self, tax_id: &str) -> Result<Option<Client>>;
    /// Replace the editable fields. `NotFound` when missing, `Conflict` on
    /// duplicate tax id.
    async fn update(&self, client: &Client) -> Result<()>;
    /// `Conflict` while orders, shipments or uploads still reference it.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// `Conflict` on duplicate SKU.
    async fn create(&self, product: &Product) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Product>>;
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>>;
    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>>;
    /// `NotFound` when missing, `Conflict` on duplicate SKU.
    async fn update(&self, product: &Product) -> Result<()>;
    /// `Conflict` while line items still link to it.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn create(&self, archive: &Archive) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Archive>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<()>;
    /// Newest first.
    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>>;
}

#[async_trait]
pub trait CodeSequence: Send + Sync {
    /// Next sequence value for (kind, year). Must be atomic across callers.
    async fn next_value(&self, kind: CodeKind, year: i32) -> Result<i64>;
}

// ── Blob storage ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob reference: {0}")]
    InvalidRef(String),

    #[error("Blob not found: {0}")]
    NotFound(String),
}

impl From<BlobStoreError> for OrderFlowError {
    fn from(e: BlobStoreError) -> Self {
        match e {
            BlobStoreError::NotFound(r) => OrderFlowError::NotFound(format!("stored file {r}")),
            other => OrderFlowError::Internal(anyhow::anyhow!(other)),
        }
    }
}

/// Raw bytes of uploaded files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store content under `key`, returning a reference URI.
    async fn store(
        &self,
        key: &str,
        content: &[u8],
        content_type: &str,
    ) -> std::result::Result<String, BlobStoreError>;

    async fn fetch(&self, blob_ref: &str) -> std::result::Result<Vec<u8>, BlobStoreError>;

    async fn delete(&self, blob_ref: &str) -> std::result::Result<(), BlobStoreError>;

    async fn exists(&self, blob_ref: &str) -> std::result::Result<bool, BlobStoreError>;
}

// ── Document extraction ───────────────────────────────────────

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionError {
    /// Not configured, circuit open, or upstream 5xx.
    #[error("extractor unavailable: {0}")]
    Unavailable(String),

    #[error("extractor rejected credentials: {0}")]
    Auth(String),

    #[error("extractor quota exhausted: {0}")]
    Quota(String),

    #[error("extractor timed out after {0}s")]
    Timeout(u64),

    #[error("extractor transport error: {0}")]
    Transport(String),

    /// The collaborator answered but its payload could not be parsed.
    #[error("malformed extractor response: {message}")]
    Malformed { message: String, excerpt: String },
}

impl ExtractionError {
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

impl From<ExtractionError> for OrderFlowError {
    fn from(e: ExtractionError) -> Self {
        let excerpt = match &e {
            ExtractionError::Malformed { excerpt, .. } => Some(excerpt.clone()),
            _ => None,
        };
        OrderFlowError::AiExtractionFailed {
            message: e.to_string(),
            excerpt,
        }
    }
}

/// AI collaborator: file bytes + MIME type in, structured order out.
/// Every field of the result is untrusted and may be missing.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(
        &self,
        content: &[u8],
        mime_type: &str,
    ) -> std::result::Result<ExtractedOrder, ExtractionError>;
}
