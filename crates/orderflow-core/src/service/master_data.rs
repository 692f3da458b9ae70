use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{non_empty, OrderFlowService};
use crate::audit::{AuditAction, AuditEntry, AuditLogEntry, AuditQuery, EntityKind};
use crate::error::OrderFlowError;
use crate::model::{Client, Product, ProductFilter};
use crate::ports::Result;
use crate::principal::Actor;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClient {
    pub name: String,
    pub tax_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Partial client edit. Absent fields are kept; a blank optional field
/// clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateClient {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProduct {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProduct {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub active: Option<bool>,
}

fn required(value: String, field: &str) -> Result<String> {
    non_empty(Some(value))
        .ok_or_else(|| OrderFlowError::InvalidInput(format!("{field} is required")))
}

fn check_unit_price(price: Decimal) -> Result<()> {
    if price < Decimal::ZERO {
        return Err(OrderFlowError::InvalidInput(
            "unit_price must not be negative".into(),
        ));
    }
    Ok(())
}

impl OrderFlowService {
    // ── Clients ───────────────────────────────────────────────

    pub async fn create_client(&self, actor: &Actor, input: CreateClient) -> Result<Client> {
        actor.require_admin()?;
        let client = Client {
            id: Uuid::new_v4(),
            name: required(input.name, "name")?,
            tax_id: required(input.tax_id, "tax_id")?,
            email: non_empty(input.email),
            phone: non_empty(input.phone),
            address: non_empty(input.address),
            created_at: Utc::now(),
        };
        self.ports.clients.create(&client).await?;
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::Client, client.id, AuditAction::Create)
                    .with_diff(json!({ "name": client.name, "taxId": client.tax_id })),
            )
            .await;
        Ok(client)
    }

    pub async fn list_clients(&self, actor: &Actor) -> Result<Vec<Client>> {
        let clients = self.ports.clients.list().await?;
        Ok(match actor.client_scope() {
            Some(scope) => clients.into_iter().filter(|c| c.id == scope).collect(),
            None => clients,
        })
    }

    pub async fn get_client(&self, actor: &Actor, id: Uuid) -> Result<Client> {
        actor.require_client_access(id)?;
        self.require_client(id).await
    }

    pub async fn find_client_by_tax_id(&self, tax_id: &str) -> Result<Option<Client>> {
        self.ports.clients.find_by_tax_id(tax_id.trim()).await
    }

    pub async fn update_client(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateClient,
    ) -> Result<Client> {
        actor.require_admin()?;
        let current = self.require_client(id).await?;
        let mut updated = current.clone();
        if let Some(name) = input.name {
            updated.name = required(name, "name")?;
        }
        if let Some(tax_id) = input.tax_id {
            updated.tax_id = required(tax_id, "tax_id")?;
        }
        if let Some(email) = input.email {
            updated.email = non_empty(Some(email));
        }
        if let Some(phone) = input.phone {
            updated.phone = non_empty(Some(phone));
        }
        if let Some(address) = input.address {
            updated.address = non_empty(Some(address));
        }
        self.ports.clients.update(&updated).await?;
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::Client, id, AuditAction::Update).with_diff(
                    json!({
                        "name": { "from": current.name, "to": updated.name },
                        "taxId": { "from": current.tax_id, "to": updated.tax_id },
                        "email": { "from": current.email, "to": updated.email },
                        "phone": { "from": current.phone, "to": updated.phone },
                        "address": { "from": current.address, "to": updated.address },
                    }),
                ),
            )
            .await;
        Ok(updated)
    }

    /// Remove a client that nothing references yet.
    pub async fn delete_client(&self, actor: &Actor, id: Uuid) -> Result<Client> {
        actor.require_admin()?;
        let client = self.require_client(id).await?;
        self.ports.clients.delete(id).await?;
        tracing::info!(client_id = %id, tax_id = %client.tax_id, "client deleted");
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::Client, id, AuditAction::Delete)
                    .with_diff(json!({ "name": client.name, "taxId": client.tax_id })),
            )
            .await;
        Ok(client)
    }

    // ── Products ──────────────────────────────────────────────

    pub async fn create_product(&self, actor: &Actor, input: CreateProduct) -> Result<Product> {
        actor.require_admin()?;
        check_unit_price(input.unit_price)?;
        let product = Product {
            id: Uuid::new_v4(),
            sku: required(input.sku, "sku")?,
            name: required(input.name, "name")?,
            description: non_empty(input.description),
            unit_price: input.unit_price,
            active: input.active,
            created_at: Utc::now(),
        };
        self.ports.products.create(&product).await?;
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::Product, product.id, AuditAction::Create)
                    .with_diff(json!({ "sku": product.sku })),
            )
            .await;
        Ok(product)
    }

    pub async fn list_products(&self, filter: ProductFilter) -> Result<Vec<Product>> {
        self.ports.products.list(&filter).await
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Product> {
        self.ports
            .products
            .get(id)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(format!("product {id}")))
    }

    pub async fn find_product_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        self.ports.products.find_by_sku(sku.trim()).await
    }

    pub async fn update_product(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateProduct,
    ) -> Result<Product> {
        actor.require_admin()?;
        let current = self.get_product(id).await?;
        let mut updated = current.clone();
        if let Some(sku) = input.sku {
            updated.sku = required(sku, "sku")?;
        }
        if let Some(name) = input.name {
            updated.name = required(name, "name")?;
        }
        if let Some(description) = input.description {
            updated.description = non_empty(Some(description));
        }
        if let Some(price) = input.unit_price {
            check_unit_price(price)?;
            updated.unit_price = price;
        }
        if let Some(active) = input.active {
            updated.active = active;
        }
        self.ports.products.update(&updated).await?;
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::Product, id, AuditAction::Update).with_diff(
                    json!({
                        "sku": { "from": current.sku, "to": updated.sku },
                        "name": { "from": current.name, "to": updated.name },
                        "unitPrice": { "from": current.unit_price, "to": updated.unit_price },
                        "active": { "from": current.active, "to": updated.active },
                    }),
                ),
            )
            .await;
        Ok(updated)
    }

    /// Remove a product no line item links to. Deactivate it otherwise.
    pub async fn delete_product(&self, actor: &Actor, id: Uuid) -> Result<Product> {
        actor.require_admin()?;
        let product = self.get_product(id).await?;
        self.ports.products.delete(id).await?;
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::Product, id, AuditAction::Delete)
                    .with_diff(json!({ "sku": product.sku })),
            )
            .await;
        Ok(product)
    }

    // ── Audit ─────────────────────────────────────────────────

    pub async fn list_audit(&self, actor: &Actor, query: AuditQuery) -> Result<Vec<AuditLogEntry>> {
        actor.require_admin()?;
        self.ports.audit.list(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testkit::*;

    fn client_input(tax_id: &str) -> CreateClient {
        CreateClient {
            name: "Distribuidora Norte".into(),
            tax_id: tax_id.into(),
            email: Some("compras@norte.co".into()),
            phone: None,
            address: Some("  ".into()),
        }
    }

    #[tokio::test]
    async fn create_client_and_lookup_by_tax_id() {
        let h = harness().await;
        let c = h.service.create_client(&h.admin, client_input("811")).await.unwrap();
        assert_eq!(c.address, None);
        let found = h.service.find_client_by_tax_id(" 811 ").await.unwrap().unwrap();
        assert_eq!(found.id, c.id);
        let err = h.service.create_client(&h.admin, client_input("811")).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::Conflict(_)));
    }

    #[tokio::test]
    async fn client_creation_is_admin_only() {
        let h = harness().await;
        let err = h
            .service
            .create_client(&h.client_actor(), client_input("812"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::Forbidden(_)));
    }

    #[tokio::test]
    async fn cliente_lists_only_itself() {
        let h = harness().await;
        h.service.create_client(&h.admin, client_input("813")).await.unwrap();
        let listed = h.service.list_clients(&h.client_actor()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, h.client.id);
        assert_eq!(h.service.list_clients(&h.admin).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn product_sku_is_unique() {
        let h = harness().await;
        let err = h
            .service
            .create_product(
                &h.admin,
                product_input("T-1", "dup", true),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::Conflict(_)));
        assert!(h.service.find_product_by_sku("T-1").await.unwrap().is_some());
    }

    fn product_input(sku: &str, name: &str, active: bool) -> CreateProduct {
        CreateProduct {
            sku: sku.into(),
            name: name.into(),
            description: None,
            unit_price: Decimal::ONE,
            active,
        }
    }

    #[tokio::test]
    async fn update_client_applies_partial_edit_and_audits() {
        let h = harness().await;
        let c = h.service.create_client(&h.admin, client_input("820")).await.unwrap();
        let updated = h
            .service
            .update_client(
                &h.admin,
                c.id,
                UpdateClient {
                    name: Some(" Distribuidora Sur ".into()),
                    email: Some("".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Distribuidora Sur");
        assert_eq!(updated.email, None);
        assert_eq!(updated.tax_id, "820");
        assert_eq!(h.service.get_client(&h.admin, c.id).await.unwrap().name, "Distribuidora Sur");

        let last = h.store.audit_entries().pop().unwrap();
        assert_eq!(last.action, AuditAction::Update);
        assert_eq!(last.diff.unwrap()["name"]["from"], json!("Distribuidora Norte"));
    }

    #[tokio::test]
    async fn update_client_rejects_taken_tax_id_and_non_admin() {
        let h = harness().await;
        let c = h.service.create_client(&h.admin, client_input("821")).await.unwrap();
        let taken = UpdateClient {
            tax_id: Some(h.client.tax_id.clone()),
            ..Default::default()
        };
        assert!(matches!(
            h.service.update_client(&h.admin, c.id, taken.clone()).await.unwrap_err(),
            OrderFlowError::Conflict(_)
        ));
        assert!(matches!(
            h.service.update_client(&h.client_actor(), h.client.id, taken).await.unwrap_err(),
            OrderFlowError::Forbidden(_)
        ));
        assert!(matches!(
            h.service
                .update_client(&h.admin, Uuid::new_v4(), UpdateClient::default())
                .await
                .unwrap_err(),
            OrderFlowError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn delete_client_only_when_unreferenced() {
        let h = harness().await;
        let c = h.service.create_client(&h.admin, client_input("822")).await.unwrap();
        let deleted = h.service.delete_client(&h.admin, c.id).await.unwrap();
        assert_eq!(deleted.id, c.id);
        assert!(matches!(
            h.service.get_client(&h.admin, c.id).await.unwrap_err(),
            OrderFlowError::NotFound(_)
        ));
        assert_eq!(h.store.audit_entries().pop().unwrap().action, AuditAction::Delete);

        h.service
            .create_purchase_order(
                &h.admin,
                crate::service::CreatePurchaseOrder {
                    client_id: h.client.id,
                    currency: None,
                    notes: None,
                    items: vec![item("T-1", 1, "250")],
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            h.service.delete_client(&h.admin, h.client.id).await.unwrap_err(),
            OrderFlowError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn product_listing_filters() {
        let h = harness().await;
        h.service
            .create_product(&h.admin, product_input("CAJ-1", "Caja carton", true))
            .await
            .unwrap();
        h.service
            .create_product(&h.admin, product_input("CAJ-2", "Caja madera", false))
            .await
            .unwrap();

        let all = h.service.list_products(ProductFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        let search = ProductFilter { search: Some("caja".into()), ..Default::default() };
        assert_eq!(h.service.list_products(search).await.unwrap().len(), 2);
        let active = ProductFilter {
            search: Some("caja".into()),
            active: Some(true),
            ..Default::default()
        };
        let listed = h.service.list_products(active).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].sku, "CAJ-1");
        let by_sku = ProductFilter { sku: Some("t-1".into()), ..Default::default() };
        assert_eq!(h.service.list_products(by_sku).await.unwrap()[0].sku, "T-1");
    }

    #[tokio::test]
    async fn update_and_delete_product() {
        let h = harness().await;
        let p = h
            .service
            .create_product(&h.admin, product_input("CAJ-3", "Caja", true))
            .await
            .unwrap();
        let updated = h
            .service
            .update_product(
                &h.admin,
                p.id,
                UpdateProduct {
                    unit_price: Some(Decimal::new(1250, 2)),
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.unit_price, Decimal::new(1250, 2));
        assert!(!updated.active);
        assert_eq!(updated.sku, "CAJ-3");

        let negative = UpdateProduct { unit_price: Some(-Decimal::ONE), ..Default::default() };
        assert!(matches!(
            h.service.update_product(&h.admin, p.id, negative).await.unwrap_err(),
            OrderFlowError::InvalidInput(_)
        ));
        let dup = UpdateProduct { sku: Some("T-1".into()), ..Default::default() };
        assert!(matches!(
            h.service.update_product(&h.admin, p.id, dup).await.unwrap_err(),
            OrderFlowError::Conflict(_)
        ));

        h.service.delete_product(&h.admin, p.id).await.unwrap();
        assert!(matches!(
            h.service.get_product(p.id).await.unwrap_err(),
            OrderFlowError::NotFound(_)
        ));
        assert_eq!(h.store.audit_entries().pop().unwrap().action, AuditAction::Delete);
    }

    #[tokio::test]
    async fn linked_product_cannot_be_deleted() {
        let h = harness().await;
        let linked = h.service.find_product_by_sku("T-1").await.unwrap().unwrap();
        h.service
            .create_purchase_order(
                &h.admin,
                crate::service::CreatePurchaseOrder {
                    client_id: h.client.id,
                    currency: None,
                    notes: None,
                    items: vec![item("T-1", 2, "250")],
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            h.service.delete_product(&h.admin, linked.id).await.unwrap_err(),
            OrderFlowError::Conflict(_)
        ));
        assert!(matches!(
            h.service.delete_product(&h.client_actor(), linked.id).await.unwrap_err(),
            OrderFlowError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn audit_listing_filters_and_requires_admin() {
        let h = harness().await;
        let c = h.service.create_client(&h.admin, client_input("814")).await.unwrap();
        let rows = h
            .service
            .list_audit(
                &h.admin,
                AuditQuery { entity: Some(EntityKind::Client), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entry.entity_id, c.id);
        assert!(h
            .service
            .list_audit(&h.client_actor(), AuditQuery::default())
            .await
            .is_err());
    }
}
