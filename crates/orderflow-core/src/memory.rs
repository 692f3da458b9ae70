//! In-memory port implementations for tests (feature `test-support`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogEntry, AuditQuery};
use crate::codes::CodeKind;
use crate::error::OrderFlowError;
use crate::ingestion::ExtractedOrder;
use crate::model::*;
use crate::ports::*;
use crate::service::Ports;
use crate::status::{PurchaseOrderStatus, SalesOrderStatus};

#[derive(Default)]
struct State {
    purchase_orders: Vec<PurchaseOrder>,
    sales_orders: Vec<SalesOrder>,
    shipments: Vec<Shipment>,
    clients: Vec<Client>,
    products: Vec<Product>,
    archives: Vec<Archive>,
    audit: Vec<AuditLogEntry>,
    sequences: HashMap<(CodeKind, i32), i64>,
    fail_archive_create: bool,
}

/// One shared in-memory database implementing every store port.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ports(&self, blobs: Arc<dyn BlobStore>) -> Ports {
        Ports {
            purchase_orders: Arc::new(self.clone()),
            sales_orders: Arc::new(self.clone()),
            shipments: Arc::new(self.clone()),
            clients: Arc::new(self.clone()),
            products: Arc::new(self.clone()),
            archives: Arc::new(self.clone()),
            audit: Arc::new(self.clone()),
            codes: Arc::new(self.clone()),
            blobs,
        }
    }

    /// Every audit entry, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state().audit.iter().map(|e| e.entry.clone()).collect()
    }

    pub fn archive_count(&self) -> usize {
        self.state().archives.len()
    }

    /// Make the next archive inserts fail, to exercise upload cleanup.
    pub fn fail_archive_create(&self, fail: bool) {
        self.state().fail_archive_create = fail;
    }
}

fn paged<T>(items: impl Iterator<Item = T>, limit: Option<i64>, offset: Option<i64>) -> Vec<T> {
    let (limit, offset) = page(limit, offset);
    items.skip(offset as usize).take(limit as usize).collect()
}

#[async_trait]
impl PurchaseOrderStore for InMemoryStore {
    async fn create(&self, order: &PurchaseOrder) -> Result<()> {
        let mut state = self.state();
        if state.purchase_orders.iter().any(|o| o.code == order.code) {
            return Err(OrderFlowError::DuplicateCode(order.code.clone()));
        }
        state.purchase_orders.push(order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PurchaseOrder>> {
        Ok(self.state().purchase_orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list(&self, filter: &PurchaseOrderFilter) -> Result<Vec<PurchaseOrder>> {
        let state = self.state();
        let code = filter.code.as_deref().map(str::to_ascii_uppercase);
        Ok(paged(
            state
                .purchase_orders
                .iter()
                .rev()
                .filter(|o| filter.status.map_or(true, |s| s == o.status))
                .filter(|o| filter.client_id.map_or(true, |c| c == o.client_id))
                .filter(|o| code.as_deref().map_or(true, |c| o.code.contains(c)))
                .cloned(),
            filter.limit,
            filter.offset,
        ))
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: PurchaseOrderStatus,
        new: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder> {
        let mut state = self.state();
        let order = state
            .purchase_orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| OrderFlowError::NotFound(format!("purchase order {id}")))?;
        if order.status != expected {
            return Err(OrderFlowError::Conflict(format!(
                "purchase order {} changed concurrently (now {})",
                order.code, order.status
            )));
        }
        order.status = new;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn update_notes(&self, id: Uuid, notes: Option<String>) -> Result<PurchaseOrder> {
        let mut state = self.state();
        let order = state
            .purchase_orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| OrderFlowError::NotFound(format!("purchase order {id}")))?;
        order.notes = notes;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn code_exists(&self, code: &str) -> Result<bool> {
        Ok(self.state().purchase_orders.iter().any(|o| o.code == code))
    }
}

#[async_trait]
impl SalesOrderStore for InMemoryStore {
    async fn create(&self, order: &SalesOrder) -> Result<()> {
        let mut state = self.state();
        if state.sales_orders.iter().any(|o| o.code == order.code) {
            return Err(OrderFlowError::DuplicateCode(order.code.clone()));
        }
        state.sales_orders.push(order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SalesOrder>> {
        Ok(self.state().sales_orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list(&self, filter: &SalesOrderFilter) -> Result<Vec<SalesOrder>> {
        let state = self.state();
        Ok(paged(
            state
                .sales_orders
                .iter()
                .rev()
                .filter(|o| filter.status.map_or(true, |s| s == o.status))
                .filter(|o| filter.client_id.map_or(true, |c| c == o.client_id))
                .filter(|o| {
                    filter
                        .purchase_order_id
                        .map_or(true, |p| Some(p) == o.purchase_order_id)
                })
                .cloned(),
            filter.limit,
            filter.offset,
        ))
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: SalesOrderStatus,
        new: SalesOrderStatus,
    ) -> Result<SalesOrder> {
        let mut state = self.state();
        let order = state
            .sales_orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| OrderFlowError::NotFound(format!("sales order {id}")))?;
        if order.status != expected {
            return Err(OrderFlowError::Conflict(format!(
                "sales order {} changed concurrently (now {})",
                order.code, order.status
            )));
        }
        order.status = new;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn update_contents(
        &self,
        id: Uuid,
        notes: Option<String>,
        items: Option<Vec<LineItem>>,
    ) -> Result<SalesOrder> {
        let mut state = self.state();
        let order = state
            .sales_orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| OrderFlowError::NotFound(format!("sales order {id}")))?;
        order.notes = notes;
        if let Some(items) = items {
            order.total = order_total(&items)?;
            order.items = items;
        }
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn count_for_purchase_order(&self, purchase_order_id: Uuid) -> Result<i64> {
        Ok(self
            .state()
            .sales_orders
            .iter()
            .filter(|o| o.purchase_order_id == Some(purchase_order_id))
            .count() as i64)
    }
}

#[async_trait]
impl ShipmentStore for InMemoryStore {
    async fn create(&self, shipment: &Shipment) -> Result<()> {
        let mut state = self.state();
        if state
            .shipments
            .iter()
            .any(|s| s.sales_order_id == shipment.sales_order_id)
        {
            return Err(OrderFlowError::Conflict(format!(
                "sales order {} already has a shipment",
                shipment.sales_order_id
            )));
        }
        if state.shipments.iter().any(|s| s.code == shipment.code) {
            return Err(OrderFlowError::DuplicateCode(shipment.code.clone()));
        }
        state.shipments.push(shipment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Shipment>> {
        Ok(self.state().shipments.iter().find(|s| s.id == id).cloned())
    }

    async fn get_by_sales_order(&self, sales_order_id: Uuid) -> Result<Option<Shipment>> {
        Ok(self
            .state()
            .shipments
            .iter()
            .find(|s| s.sales_order_id == sales_order_id)
            .cloned())
    }

    async fn list(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>> {
        let state = self.state();
        Ok(paged(
            state
                .shipments
                .iter()
                .rev()
                .filter(|s| filter.status.map_or(true, |st| st == s.status))
                .filter(|s| filter.client_id.map_or(true, |c| c == s.client_id))
                .cloned(),
            filter.limit,
            filter.offset,
        ))
    }

    async fn update_details(&self, id: Uuid, changes: &ShipmentChanges) -> Result<Shipment> {
        let mut state = self.state();
        let shipment = state
            .shipments
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| OrderFlowError::NotFound(format!("shipment {id}")))?;
        if let Some(carrier) = &changes.carrier {
            shipment.carrier = carrier.clone();
        }
        if changes.departure_date.is_some() {
            shipment.departure_date = changes.departure_date;
        }
        if changes.estimated_arrival.is_some() {
            shipment.estimated_arrival = changes.estimated_arrival;
        }
        shipment.updated_at = Utc::now();
        Ok(shipment.clone())
    }

    async fn append_event(&self, event: &ShipmentEvent) -> Result<Shipment> {
        let mut state = self.state();
        let shipment = state
            .shipments
            .iter_mut()
            .find(|s| s.id == event.shipment_id)
            .ok_or_else(|| OrderFlowError::NotFound(format!("shipment {}", event.shipment_id)))?;
        shipment.events.push(event.clone());
        shipment.status = event.status;
        sort_events(&mut shipment.events);
        shipment.updated_at = Utc::now();
        Ok(shipment.clone())
    }
}

#[async_trait]
impl ClientStore for InMemoryStore {
    async fn create(&self, client: &Client) -> Result<()> {
        let mut state = self.state();
        if state.clients.iter().any(|c| c.tax_id == client.tax_id) {
            return Err(OrderFlowError::Conflict(format!(
                "client with tax id {} already exists",
                client.tax_id
            )));
        }
        state.clients.push(client.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Client>> {
        Ok(self.state().clients.iter().find(|c| c.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Client>> {
        let mut clients = self.state().clients.clone();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clients)
    }

    async fn find_by_tax_id(&self, tax_id: &str) -> Result<Option<Client>> {
        Ok(self
            .state()
            .clients
            .iter()
            .find(|c| c.tax_id == tax_id)
            .cloned())
    }

    async fn update(&self, client: &Client) -> Result<()> {
        let mut state = self.state();
        if state
            .clients
            .iter()
            .any(|c| c.id != client.id && c.tax_id == client.tax_id)
        {
            return Err(OrderFlowError::Conflict(format!(
                "client with tax id {} already exists",
                client.tax_id
            )));
        }
        let slot = state
            .clients
            .iter_mut()
            .find(|c| c.id == client.id)
            .ok_or_else(|| OrderFlowError::NotFound(format!("client {}", client.id)))?;
        *slot = client.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut state = self.state();
        let referenced = state.purchase_orders.iter().any(|o| o.client_id == id)
            || state.sales_orders.iter().any(|o| o.client_id == id)
            || state.shipments.iter().any(|s| s.client_id == id)
            || state.archives.iter().any(|a| a.client_id == Some(id));
        if referenced {
            return Err(OrderFlowError::Conflict(format!(
                "client {id} is still referenced"
            )));
        }
        let before = state.clients.len();
        state.clients.retain(|c| c.id != id);
        if state.clients.len() == before {
            return Err(OrderFlowError::NotFound(format!("client {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn create(&self, product: &Product) -> Result<()> {
        let mut state = self.state();
        if state.products.iter().any(|p| p.sku == product.sku) {
            return Err(OrderFlowError::Conflict(format!(
                "product with sku {} already exists",
                product.sku
            )));
        }
        state.products.push(product.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state().products.iter().find(|p| p.id == id).cloned())
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self
            .state()
            .products
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        Ok(self.state().products.iter().find(|p| p.sku == sku).cloned())
    }

    async fn update(&self, product: &Product) -> Result<()> {
        let mut state = self.state();
        if state
            .products
            .iter()
            .any(|p| p.id != product.id && p.sku == product.sku)
        {
            return Err(OrderFlowError::Conflict(format!(
                "product with sku {} already exists",
                product.sku
            )));
        }
        let slot = state
            .products
            .iter_mut()
            .find(|p| p.id == product.id)
            .ok_or_else(|| OrderFlowError::NotFound(format!("product {}", product.id)))?;
        *slot = product.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut state = self.state();
        let linked = |items: &[LineItem]| items.iter().any(|i| i.product_id == Some(id));
        let referenced = state.purchase_orders.iter().any(|o| linked(&o.items))
            || state.sales_orders.iter().any(|o| linked(&o.items));
        if referenced {
            return Err(OrderFlowError::Conflict(format!(
                "product {id} is still referenced"
            )));
        }
        let before = state.products.len();
        state.products.retain(|p| p.id != id);
        if state.products.len() == before {
            return Err(OrderFlowError::NotFound(format!("product {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveStore for InMemoryStore {
    async fn create(&self, archive: &Archive) -> Result<()> {
        let mut state = self.state();
        if state.fail_archive_create {
            return Err(OrderFlowError::Internal(anyhow::anyhow!(
                "archive insert failed"
            )));
        }
        state.archives.push(archive.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Archive>> {
        Ok(self.state().archives.iter().find(|a| a.id == id).cloned())
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        self.state().audit.push(AuditLogEntry {
            id: Uuid::new_v4(),
            entry: entry.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>> {
        Ok(self
            .state()
            .audit
            .iter()
            .rev()
            .filter(|e| query.matches(&e.entry))
            .take(query.effective_limit() as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CodeSequence for InMemoryStore {
    async fn next_value(&self, kind: CodeKind, year: i32) -> Result<i64> {
        let mut state = self.state();
        let prefix = kind.year_prefix(year);
        let existing = match kind {
            CodeKind::PurchaseOrder => state
                .purchase_orders
                .iter()
                .filter(|o| o.code.starts_with(&prefix))
                .count(),
            CodeKind::SalesOrder => state
                .sales_orders
                .iter()
                .filter(|o| o.code.starts_with(&prefix))
                .count(),
            CodeKind::Shipment => state
                .shipments
                .iter()
                .filter(|s| s.code.starts_with(&prefix))
                .count(),
        } as i64;
        let next = state.sequences.entry((kind, year)).or_insert(existing);
        *next += 1;
        Ok(*next)
    }
}

// ── Blob store ────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(
        &self,
        key: &str,
        content: &[u8],
        _content_type: &str,
    ) -> std::result::Result<String, BlobStoreError> {
        let blob_ref = format!("mem://{}", key);
        self.blobs
            .write()
            .await
            .insert(blob_ref.clone(), content.to_vec());
        Ok(blob_ref)
    }

    async fn fetch(&self, blob_ref: &str) -> std::result::Result<Vec<u8>, BlobStoreError> {
        self.blobs
            .read()
            .await
            .get(blob_ref)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(blob_ref.to_string()))
    }

    async fn delete(&self, blob_ref: &str) -> std::result::Result<(), BlobStoreError> {
        self.blobs.write().await.remove(blob_ref);
        Ok(())
    }

    async fn exists(&self, blob_ref: &str) -> std::result::Result<bool, BlobStoreError> {
        Ok(self.blobs.read().await.contains_key(blob_ref))
    }
}

// ── Document extractor ────────────────────────────────────────

/// Extractor double that answers every call with the same canned result.
pub struct ScriptedExtractor {
    result: std::result::Result<ExtractedOrder, ExtractionError>,
    calls: Mutex<usize>,
}

impl ScriptedExtractor {
    pub fn returning(order: ExtractedOrder) -> Self {
        Self {
            result: Ok(order),
            calls: Mutex::new(0),
        }
    }

    pub fn failing(error: ExtractionError) -> Self {
        Self {
            result: Err(error),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DocumentExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        _content: &[u8],
        _mime_type: &str,
    ) -> std::result::Result<ExtractedOrder, ExtractionError> {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.result.clone()
    }
}
