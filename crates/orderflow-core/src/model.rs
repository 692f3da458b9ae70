//! Domain records: orders, line items, shipments and master data.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrderFlowError;
use crate::status::{OrderOrigin, PurchaseOrderStatus, SalesOrderStatus, ShipmentStatus};

pub const DEFAULT_CURRENCY: &str = "COP";

// ── Line items ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub product_id: Option<Uuid>,
}

impl LineItem {
    /// `InvalidInput` when `quantity × unit_price` does not fit a `Decimal`.
    pub fn new(
        sku: impl Into<String>,
        description: impl Into<String>,
        quantity: i32,
        unit_price: Decimal,
        product_id: Option<Uuid>,
    ) -> Result<Self, OrderFlowError> {
        let sku = sku.into();
        let subtotal = line_subtotal(quantity, unit_price).ok_or_else(|| {
            OrderFlowError::InvalidInput(format!("item {sku}: subtotal is out of range"))
        })?;
        Ok(Self {
            sku,
            description: description.into(),
            quantity,
            unit_price,
            subtotal,
            product_id,
        })
    }
}

/// `quantity × unit_price`, or `None` on overflow.
pub fn line_subtotal(quantity: i32, unit_price: Decimal) -> Option<Decimal> {
    Decimal::from(quantity).checked_mul(unit_price)
}

/// Overflow-checked sum of subtotals.
pub fn checked_total(
    subtotals: impl IntoIterator<Item = Decimal>,
) -> Result<Decimal, OrderFlowError> {
    subtotals
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, s| acc.checked_add(s))
        .ok_or_else(|| OrderFlowError::InvalidInput("order total is out of range".into()))
}

/// Line item as supplied by a caller for manual create/update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub sku: String,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl NewLineItem {
    /// Strict validation for manually entered items. Ingestion uses the
    /// lenient drop-the-row policy in [`crate::ingestion`] instead.
    pub fn validate(&self, index: usize) -> Result<(), OrderFlowError> {
        if self.sku.trim().is_empty() {
            return Err(OrderFlowError::InvalidInput(format!(
                "item {index}: sku is required"
            )));
        }
        if self.quantity <= 0 {
            return Err(OrderFlowError::InvalidInput(format!(
                "item {index}: quantity must be positive"
            )));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(OrderFlowError::InvalidInput(format!(
                "item {index}: unit_price must not be negative"
            )));
        }
        if line_subtotal(self.quantity, self.unit_price).is_none() {
            return Err(OrderFlowError::InvalidInput(format!(
                "item {index}: subtotal is out of range"
            )));
        }
        Ok(())
    }
}

pub fn order_total(items: &[LineItem]) -> Result<Decimal, OrderFlowError> {
    checked_total(items.iter().map(|i| i.subtotal))
}

pub fn normalize_currency(currency: Option<&str>) -> Result<String, OrderFlowError> {
    let code = currency
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CURRENCY)
        .to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(OrderFlowError::InvalidInput(format!(
            "currency must be a 3-letter code, got {code:?}"
        )))
    }
}

// ── Orders ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub code: String,
    pub client_id: Uuid,
    pub total: Decimal,
    pub currency: String,
    pub status: PurchaseOrderStatus,
    pub origin: OrderOrigin,
    pub notes: Option<String>,
    pub archive_id: Option<Uuid>,
    pub created_by: Uuid,
    pub items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: Uuid,
    pub code: String,
    pub client_id: Uuid,
    pub purchase_order_id: Option<Uuid>,
    pub total: Decimal,
    pub currency: String,
    pub status: SalesOrderStatus,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sales order together with its (at most one) shipment.
#[derive(Debug, Clone, Serialize)]
pub struct SalesOrderDetail {
    #[serde(flatten)]
    pub order: SalesOrder,
    pub shipment: Option<Shipment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseOrderFilter {
    pub status: Option<PurchaseOrderStatus>,
    pub client_id: Option<Uuid>,
    pub code: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SalesOrderFilter {
    pub status: Option<SalesOrderStatus>,
    pub client_id: Option<Uuid>,
    pub purchase_order_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 500;

/// Clamp caller-supplied paging to sane bounds.
pub fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

// ── Shipments ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    pub code: String,
    pub sales_order_id: Uuid,
    /// Client of the owning sales order.
    pub client_id: Uuid,
    pub carrier: String,
    pub status: ShipmentStatus,
    pub departure_date: Option<NaiveDate>,
    pub estimated_arrival: Option<NaiveDate>,
    /// Ascending by `occurred_at`.
    pub events: Vec<ShipmentEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentEvent {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub location: String,
    pub status: ShipmentStatus,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentFilter {
    pub status: Option<ShipmentStatus>,
    pub client_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Sort events ascending by timestamp; insertion order breaks ties.
pub fn sort_events(events: &mut [ShipmentEvent]) {
    events.sort_by_key(|e| e.occurred_at);
}

// ── Master data ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    /// NIT.
    pub tax_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub unit_price: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Product listing filter. `search` matches name, description or SKU;
/// `sku` matches SKU only. Both are case-insensitive substrings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub sku: Option<String>,
    pub active: Option<bool>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        fn contains(haystack: &str, needle: &str) -> bool {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        }
        let search = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let sku = self.sku.as_deref().map(str::trim).filter(|s| !s.is_empty());
        search.map_or(true, |s| {
            contains(&product.name, s)
                || contains(&product.sku, s)
                || product.description.as_deref().is_some_and(|d| contains(d, s))
        }) && sku.map_or(true, |s| contains(&product.sku, s))
            && self.active.map_or(true, |a| a == product.active)
    }
}

/// Stored upload, persisted before any parsing happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_ref: String,
    pub uploaded_by: Uuid,
    pub client_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn event(shipment_id: Uuid, at: DateTime<Utc>, status: ShipmentStatus) -> ShipmentEvent {
        ShipmentEvent {
            id: Uuid::new_v4(),
            shipment_id,
            occurred_at: at,
            location: "Bodega".into(),
            status,
            comment: None,
            created_at: at,
        }
    }

    #[test]
    fn line_item_subtotal_is_quantity_times_price() {
        let item = LineItem::new("A", "Widget", 3, dec("2.50"), None).unwrap();
        assert_eq!(item.subtotal, dec("7.50"));
    }

    #[test]
    fn order_total_sums_subtotals() {
        let items = vec![
            LineItem::new("A", "a", 2, dec("10"), None).unwrap(),
            LineItem::new("B", "b", 1, dec("0.99"), None).unwrap(),
        ];
        assert_eq!(order_total(&items).unwrap(), dec("20.99"));
    }

    #[test]
    fn overflowing_amounts_are_invalid_input() {
        let err = LineItem::new("A", "a", 2, Decimal::MAX, None).unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidInput(_)));

        let items = vec![
            LineItem::new("A", "a", 1, Decimal::MAX, None).unwrap(),
            LineItem::new("B", "b", 1, Decimal::MAX, None).unwrap(),
        ];
        assert!(matches!(
            order_total(&items).unwrap_err(),
            OrderFlowError::InvalidInput(_)
        ));

        let huge = NewLineItem {
            sku: "A".into(),
            description: None,
            quantity: i32::MAX,
            unit_price: dec("100000000000000000000"),
        };
        assert!(matches!(huge.validate(3), Err(OrderFlowError::InvalidInput(m)) if m.contains("item 3")));
    }

    #[test]
    fn manual_item_validation() {
        let ok = NewLineItem {
            sku: "A".into(),
            description: None,
            quantity: 1,
            unit_price: Decimal::ZERO,
        };
        assert!(ok.validate(0).is_ok());
        let bad_qty = NewLineItem { quantity: 0, ..ok.clone() };
        assert!(bad_qty.validate(0).is_err());
        let bad_price = NewLineItem { unit_price: dec("-1"), ..ok.clone() };
        assert!(bad_price.validate(0).is_err());
        let bad_sku = NewLineItem { sku: "  ".into(), ..ok };
        assert!(bad_sku.validate(0).is_err());
    }

    #[test]
    fn currency_defaults_to_cop() {
        assert_eq!(normalize_currency(None).unwrap(), "COP");
        assert_eq!(normalize_currency(Some(" usd ")).unwrap(), "USD");
        assert!(normalize_currency(Some("dollars")).is_err());
    }

    #[test]
    fn events_sort_by_timestamp_then_insertion() {
        let sid = Uuid::new_v4();
        let now = Utc::now();
        let mut events = vec![
            event(sid, now, ShipmentStatus::InTransit),
            event(sid, now - Duration::hours(2), ShipmentStatus::Preparing),
            event(sid, now, ShipmentStatus::Delivered),
        ];
        sort_events(&mut events);
        let order: Vec<_> = events.iter().map(|e| e.status).collect();
        assert_eq!(
            order,
            [
                ShipmentStatus::Preparing,
                ShipmentStatus::InTransit,
                ShipmentStatus::Delivered
            ]
        );
    }

    #[test]
    fn product_filter_matches_search_sku_and_active() {
        let product = Product {
            id: Uuid::new_v4(),
            sku: "TOR-14".into(),
            name: "Tornillo".into(),
            description: Some("Acero galvanizado".into()),
            unit_price: dec("250"),
            active: true,
            created_at: Utc::now(),
        };
        let filter = |search: Option<&str>, sku: Option<&str>, active: Option<bool>| ProductFilter {
            search: search.map(String::from),
            sku: sku.map(String::from),
            active,
        };
        assert!(filter(None, None, None).matches(&product));
        assert!(filter(Some("GALVA"), None, None).matches(&product));
        assert!(filter(Some("tor-"), Some("14"), Some(true)).matches(&product));
        assert!(!filter(None, Some("Tornillo"), None).matches(&product));
        assert!(!filter(None, None, Some(false)).matches(&product));
        assert!(filter(Some("  "), None, None).matches(&product));
    }

    #[test]
    fn paging_is_clamped() {
        assert_eq!(page(None, None), (DEFAULT_PAGE_SIZE, 0));
        assert_eq!(page(Some(10_000), Some(-4)), (MAX_PAGE_SIZE, 0));
    }
}
