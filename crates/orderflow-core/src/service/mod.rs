//! OrderFlowService: the workflows behind every HTTP operation.
//!
//! Each operation takes the acting [`Actor`], validates business rules
//! against current state loaded through the ports, writes the change, and
//! records an audit entry. Split by aggregate:
//! - `purchase_orders` - OC list/get/create/notes and status transitions
//! - `sales_orders`    - OV create/derive/edit/transition, shipment creation
//! - `shipments`       - shipment reads, detail edits, tracking events
//! - `ingestion`       - file upload staging and confirmation
//! - `master_data`     - clients, products, audit queries

mod ingestion;
mod master_data;
mod purchase_orders;
mod sales_orders;
mod shipments;

use std::sync::Arc;

use uuid::Uuid;

pub use ingestion::{ConfirmIngestion, UploadOutcome, UploadRequest, UploadedFile};
pub use master_data::{CreateClient, CreateProduct, UpdateClient, UpdateProduct};
pub use purchase_orders::{CreatePurchaseOrder, UpdatePurchaseOrder};
pub use sales_orders::{CreateSalesOrder, CreateShipment, UpdateSalesOrder};
pub use shipments::{AddShipmentEvent, UpdateShipment};

use crate::audit::AuditRecorder;
use crate::error::OrderFlowError;
use crate::model::{Client, LineItem, NewLineItem};
use crate::ports::*;

/// What happens when a purchase order is derived into a second sales order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DerivationPolicy {
    /// A second derivation fails with `Conflict`.
    #[default]
    SingleSalesOrder,
    /// Partial fulfilment: any number of sales orders per purchase order.
    AllowMultiple,
}

/// Every port the workflows need.
#[derive(Clone)]
pub struct Ports {
    pub purchase_orders: Arc<dyn PurchaseOrderStore>,
    pub sales_orders: Arc<dyn SalesOrderStore>,
    pub shipments: Arc<dyn ShipmentStore>,
    pub clients: Arc<dyn ClientStore>,
    pub products: Arc<dyn ProductStore>,
    pub archives: Arc<dyn ArchiveStore>,
    pub audit: Arc<dyn AuditStore>,
    pub codes: Arc<dyn CodeSequence>,
    pub blobs: Arc<dyn BlobStore>,
}

pub struct OrderFlowService {
    ports: Ports,
    audit: AuditRecorder,
    extractor: Option<Arc<dyn DocumentExtractor>>,
    derivation: DerivationPolicy,
}

impl OrderFlowService {
    pub fn new(ports: Ports, audit: AuditRecorder) -> Self {
        Self {
            ports,
            audit,
            extractor: None,
            derivation: DerivationPolicy::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_derivation_policy(mut self, policy: DerivationPolicy) -> Self {
        self.derivation = policy;
        self
    }

    pub fn ai_enabled(&self) -> bool {
        self.extractor.is_some()
    }

    async fn require_client(&self, client_id: Uuid) -> Result<Client> {
        self.ports
            .clients
            .get(client_id)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(format!("client {client_id}")))
    }

    /// Validate manually entered items and link each to its product by SKU.
    async fn build_line_items(&self, items: Vec<NewLineItem>) -> Result<Vec<LineItem>> {
        if items.is_empty() {
            return Err(OrderFlowError::InvalidInput(
                "at least one line item is required".into(),
            ));
        }
        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            item.validate(idx)?;
            let sku = item.sku.trim().to_string();
            out.push(
                self.resolve_line_item(sku, item.description, item.quantity, item.unit_price)
                    .await?,
            );
        }
        Ok(out)
    }

    /// Build a line item, linking the canonical product when the SKU is known.
    /// Unknown SKUs stay free-text items without a product link.
    async fn resolve_line_item(
        &self,
        sku: String,
        description: Option<String>,
        quantity: i32,
        unit_price: rust_decimal::Decimal,
    ) -> Result<LineItem> {
        let product = self.ports.products.find_by_sku(&sku).await?;
        let description = description
            .filter(|d| !d.trim().is_empty())
            .or_else(|| product.as_ref().map(|p| p.name.clone()))
            .unwrap_or_else(|| sku.clone());
        LineItem::new(
            sku,
            description,
            quantity,
            unit_price,
            product.map(|p| p.id),
        )
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
