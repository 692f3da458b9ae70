//! Private FromRow types, converted to core types after the status and
//! origin columns are parsed.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use orderflow_core::audit::{AuditEntry, AuditLogEntry};
use orderflow_core::error::OrderFlowError;
use orderflow_core::model::*;

use crate::error::parse_column;

type Result<T> = std::result::Result<T, OrderFlowError>;

#[derive(sqlx::FromRow)]
pub(crate) struct LineItemRow {
    pub order_id: Uuid,
    pub sku: String,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub product_id: Option<Uuid>,
}

impl From<LineItemRow> for LineItem {
    fn from(r: LineItemRow) -> Self {
        Self {
            sku: r.sku,
            description: r.description,
            quantity: r.quantity,
            unit_price: r.unit_price,
            subtotal: r.subtotal,
            product_id: r.product_id,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PurchaseOrderRow {
    pub id: Uuid,
    pub code: String,
    pub client_id: Uuid,
    pub total: Decimal,
    pub currency: String,
    pub status: String,
    pub origin: String,
    pub notes: Option<String>,
    pub archive_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrderRow {
    pub fn into_order(self, items: Vec<LineItem>) -> Result<PurchaseOrder> {
        Ok(PurchaseOrder {
            id: self.id,
            code: self.code,
            client_id: self.client_id,
            total: self.total,
            currency: self.currency,
            status: parse_column("purchase_orders.status", &self.status)?,
            origin: parse_column("purchase_orders.origin", &self.origin)?,
            notes: self.notes,
            archive_id: self.archive_id,
            created_by: self.created_by,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SalesOrderRow {
    pub id: Uuid,
    pub code: String,
    pub client_id: Uuid,
    pub purchase_order_id: Option<Uuid>,
    pub total: Decimal,
    pub currency: String,
    pub status: String,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SalesOrderRow {
    pub fn into_order(self, items: Vec<LineItem>) -> Result<SalesOrder> {
        Ok(SalesOrder {
            id: self.id,
            code: self.code,
            client_id: self.client_id,
            purchase_order_id: self.purchase_order_id,
            total: self.total,
            currency: self.currency,
            status: parse_column("sales_orders.status", &self.status)?,
            notes: self.notes,
            created_by: self.created_by,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ShipmentRow {
    pub id: Uuid,
    pub code: String,
    pub sales_order_id: Uuid,
    pub client_id: Uuid,
    pub carrier: String,
    pub status: String,
    pub departure_date: Option<NaiveDate>,
    pub estimated_arrival: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShipmentRow {
    pub fn into_shipment(self, events: Vec<ShipmentEvent>) -> Result<Shipment> {
        Ok(Shipment {
            id: self.id,
            code: self.code,
            sales_order_id: self.sales_order_id,
            client_id: self.client_id,
            carrier: self.carrier,
            status: parse_column("shipments.status", &self.status)?,
            departure_date: self.departure_date,
            estimated_arrival: self.estimated_arrival,
            events,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ShipmentEventRow {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub location: String,
    pub status: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ShipmentEventRow> for ShipmentEvent {
    type Error = OrderFlowError;

    fn try_from(r: ShipmentEventRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            shipment_id: r.shipment_id,
            occurred_at: r.occurred_at,
            location: r.location,
            status: parse_column("shipment_events.status", &r.status)?,
            comment: r.comment,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ClientRow {
    pub id: Uuid,
    pub name: String,
    pub tax_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ClientRow> for Client {
    fn from(r: ClientRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            tax_id: r.tax_id,
            email: r.email,
            phone: r.phone,
            address: r.address,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ProductRow {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub unit_price: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Self {
            id: r.id,
            sku: r.sku,
            name: r.name,
            description: r.description,
            unit_price: r.unit_price,
            active: r.active,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ArchiveRow {
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_ref: String,
    pub uploaded_by: Uuid,
    pub client_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<ArchiveRow> for Archive {
    fn from(r: ArchiveRow) -> Self {
        Self {
            id: r.id,
            file_name: r.file_name,
            mime_type: r.mime_type,
            size_bytes: r.size_bytes,
            storage_ref: r.storage_ref,
            uploaded_by: r.uploaded_by,
            client_id: r.client_id,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AuditRow {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub entity: String,
    pub entity_id: Uuid,
    pub action: String,
    pub diff: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = OrderFlowError;

    fn try_from(r: AuditRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            entry: AuditEntry {
                actor_id: r.actor_id,
                entity: parse_column("audit_log.entity", &r.entity)?,
                entity_id: r.entity_id,
                action: parse_column("audit_log.action", &r.action)?,
                diff: r.diff,
                ip: r.ip,
                user_agent: r.user_agent,
            },
            created_at: r.created_at,
        })
    }
}
