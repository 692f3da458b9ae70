use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{non_empty, DerivationPolicy, OrderFlowService};
use crate::audit::{AuditAction, AuditEntry, EntityKind};
use crate::codes::{with_fresh_code, CodeKind};
use crate::error::OrderFlowError;
use crate::lifecycle::Lifecycle;
use crate::model::{
    normalize_currency, order_total, NewLineItem, SalesOrder, SalesOrderDetail,
    SalesOrderFilter, Shipment, ShipmentEvent,
};
use crate::ports::Result;
use crate::principal::Actor;
use crate::status::{PurchaseOrderStatus, SalesOrderStatus, ShipmentStatus};

pub const INITIAL_EVENT_LOCATION: &str = "Bodega";
pub const INITIAL_EVENT_COMMENT: &str = "Envío creado";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSalesOrder {
    pub client_id: Uuid,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewLineItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSalesOrder {
    /// Kept as is when absent.
    #[serde(default)]
    pub notes: Option<String>,
    /// Replaces every line item and recomputes the total when present.
    #[serde(default)]
    pub items: Option<Vec<NewLineItem>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateShipment {
    pub carrier: String,
    #[serde(default)]
    pub departure_date: Option<NaiveDate>,
    #[serde(default)]
    pub estimated_arrival: Option<NaiveDate>,
}

impl OrderFlowService {
    pub async fn list_sales_orders(
        &self,
        actor: &Actor,
        mut filter: SalesOrderFilter,
    ) -> Result<Vec<SalesOrder>> {
        if let Some(scope) = actor.client_scope() {
            filter.client_id = Some(scope);
        }
        self.ports.sales_orders.list(&filter).await
    }

    pub async fn get_sales_order(&self, actor: &Actor, id: Uuid) -> Result<SalesOrderDetail> {
        let order = self.load_sales_order(id).await?;
        actor.require_client_access(order.client_id)?;
        let shipment = self.ports.shipments.get_by_sales_order(id).await?;
        Ok(SalesOrderDetail { order, shipment })
    }

    pub async fn create_sales_order(
        &self,
        actor: &Actor,
        input: CreateSalesOrder,
    ) -> Result<SalesOrder> {
        actor.require_admin()?;
        self.require_client(input.client_id).await?;
        let items = self.build_line_items(input.items).await?;
        let order = self
            .insert_sales_order(SalesOrder {
                id: Uuid::new_v4(),
                code: String::new(),
                client_id: input.client_id,
                purchase_order_id: None,
                total: order_total(&items)?,
                currency: normalize_currency(input.currency.as_deref())?,
                status: SalesOrderStatus::Received,
                notes: non_empty(input.notes),
                created_by: actor.user_id,
                items,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await?;
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::SalesOrder, order.id, AuditAction::Create)
                    .with_diff(json!({ "code": order.code, "total": order.total })),
            )
            .await;
        Ok(order)
    }

    /// Derive a sales order from a purchase order, copying client, total,
    /// currency and line items verbatim.
    pub async fn create_sales_order_from_purchase_order(
        &self,
        actor: &Actor,
        purchase_order_id: Uuid,
    ) -> Result<SalesOrder> {
        actor.require_admin()?;
        let source = self.load_purchase_order(purchase_order_id).await?;
        if source.status == PurchaseOrderStatus::Voided {
            return Err(OrderFlowError::InvalidState(format!(
                "purchase order {} is {}",
                source.code, source.status
            )));
        }
        if self.derivation == DerivationPolicy::SingleSalesOrder
            && self
                .ports
                .sales_orders
                .count_for_purchase_order(source.id)
                .await?
                > 0
        {
            return Err(OrderFlowError::Conflict(format!(
                "purchase order {} already has a sales order",
                source.code
            )));
        }

        let now = Utc::now();
        let order = self
            .insert_sales_order(SalesOrder {
                id: Uuid::new_v4(),
                code: String::new(),
                client_id: source.client_id,
                purchase_order_id: Some(source.id),
                total: source.total,
                currency: source.currency.clone(),
                status: SalesOrderStatus::Received,
                notes: Some(format!("Generada desde OC {}", source.code)),
                created_by: actor.user_id,
                items: source.items.clone(),
                created_at: now,
                updated_at: now,
            })
            .await?;
        tracing::info!(
            source = %source.code,
            code = %order.code,
            "sales order derived from purchase order"
        );
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::SalesOrder, order.id, AuditAction::CreateFromOc)
                    .with_diff(json!({ "sourceId": source.id, "sourceCode": source.code })),
            )
            .await;
        Ok(order)
    }

    pub async fn update_sales_order(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateSalesOrder,
    ) -> Result<SalesOrder> {
        actor.require_admin()?;
        let current = self.load_sales_order(id).await?;
        if !current.status.is_editable() {
            return Err(OrderFlowError::OrderLocked(format!(
                "sales order {} is {}",
                current.code, current.status
            )));
        }
        let items = match input.items {
            Some(items) => Some(self.build_line_items(items).await?),
            None => None,
        };
        let notes = match input.notes {
            Some(notes) => non_empty(Some(notes)),
            None => current.notes.clone(),
        };
        let updated = self
            .ports
            .sales_orders
            .update_contents(id, notes.clone(), items)
            .await?;

        let mut diff = json!({ "notes": { "from": current.notes, "to": notes } });
        if updated.total != current.total || updated.items != current.items {
            diff["total"] = json!({ "from": current.total, "to": updated.total });
            diff["items"] = json!(updated.items.len());
        }
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::SalesOrder, id, AuditAction::Update)
                    .with_diff(diff),
            )
            .await;
        Ok(updated)
    }

    pub async fn change_sales_order_status(
        &self,
        actor: &Actor,
        id: Uuid,
        target: SalesOrderStatus,
    ) -> Result<SalesOrder> {
        actor.require_admin()?;
        let current = self.load_sales_order(id).await?;
        current.status.check_transition(target)?;
        let updated = self
            .ports
            .sales_orders
            .update_status(id, current.status, target)
            .await?;
        tracing::info!(
            code = %updated.code,
            from = %current.status,
            to = %target,
            "sales order status changed"
        );
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::SalesOrder, id, AuditAction::ChangeStatus)
                    .with_diff(json!({ "from": current.status, "to": target })),
            )
            .await;
        Ok(updated)
    }

    /// Create the one shipment of a sales order that is ready for dispatch.
    pub async fn create_shipment_from_sales_order(
        &self,
        actor: &Actor,
        sales_order_id: Uuid,
        input: CreateShipment,
    ) -> Result<Shipment> {
        actor.require_admin()?;
        let carrier = input.carrier.trim().to_string();
        if carrier.is_empty() {
            return Err(OrderFlowError::InvalidInput("carrier is required".into()));
        }
        let order = self.load_sales_order(sales_order_id).await?;
        if let Some(existing) = self.ports.shipments.get_by_sales_order(order.id).await? {
            return Err(OrderFlowError::Conflict(format!(
                "sales order {} already has shipment {}",
                order.code, existing.code
            )));
        }
        if !order.status.is_ready_for_dispatch() {
            return Err(OrderFlowError::InvalidState(format!(
                "sales order {} is {}, shipments require {}",
                order.code,
                order.status,
                SalesOrderStatus::Dispatching
            )));
        }

        let now = Utc::now();
        let shipment_id = Uuid::new_v4();
        let template = Shipment {
            id: shipment_id,
            code: String::new(),
            sales_order_id: order.id,
            client_id: order.client_id,
            carrier,
            status: ShipmentStatus::Preparing,
            departure_date: input.departure_date,
            estimated_arrival: input.estimated_arrival,
            events: vec![ShipmentEvent {
                id: Uuid::new_v4(),
                shipment_id,
                occurred_at: now,
                location: INITIAL_EVENT_LOCATION.into(),
                status: ShipmentStatus::Preparing,
                comment: Some(INITIAL_EVENT_COMMENT.into()),
                created_at: now,
            }],
            created_at: now,
            updated_at: now,
        };

        let store = Arc::clone(&self.ports.shipments);
        let shipment = with_fresh_code(self.ports.codes.as_ref(), CodeKind::Shipment, |code| {
            let store = Arc::clone(&store);
            let shipment = Shipment {
                code,
                ..template.clone()
            };
            async move {
                store.create(&shipment).await?;
                Ok::<_, OrderFlowError>(shipment)
            }
        })
        .await?;

        tracing::info!(
            code = %shipment.code,
            sales_order = %order.code,
            carrier = %shipment.carrier,
            "shipment created"
        );
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::Shipment, shipment.id, AuditAction::Create)
                    .with_diff(json!({
                        "salesOrderId": order.id,
                        "code": shipment.code,
                        "carrier": shipment.carrier,
                    })),
            )
            .await;
        Ok(shipment)
    }

    pub(super) async fn load_sales_order(&self, id: Uuid) -> Result<SalesOrder> {
        self.ports
            .sales_orders
            .get(id)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(format!("sales order {id}")))
    }

    async fn insert_sales_order(&self, template: SalesOrder) -> Result<SalesOrder> {
        let store = Arc::clone(&self.ports.sales_orders);
        with_fresh_code(self.ports.codes.as_ref(), CodeKind::SalesOrder, |code| {
            let store = Arc::clone(&store);
            let order = SalesOrder {
                code,
                ..template.clone()
            };
            async move {
                store.create(&order).await?;
                Ok::<_, OrderFlowError>(order)
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{current_year, format_code};
    use crate::model::PurchaseOrder;
    use crate::service::testkit::*;
    use crate::service::CreatePurchaseOrder;

    async fn purchase_order(h: &Harness) -> PurchaseOrder {
        h.service
            .create_purchase_order(
                &h.admin,
                CreatePurchaseOrder {
                    client_id: h.client.id,
                    currency: Some("usd".into()),
                    notes: None,
                    items: vec![item("T-1", 3, "250"), item("B-2", 2, "1000.25")],
                },
            )
            .await
            .unwrap()
    }

    async fn dispatching_sales_order(h: &Harness) -> SalesOrder {
        let po = purchase_order(h).await;
        let so = h
            .service
            .create_sales_order_from_purchase_order(&h.admin, po.id)
            .await
            .unwrap();
        for target in [SalesOrderStatus::Processing, SalesOrderStatus::Dispatching] {
            h.service
                .change_sales_order_status(&h.admin, so.id, target)
                .await
                .unwrap();
        }
        h.service.get_sales_order(&h.admin, so.id).await.unwrap().order
    }

    fn dhl() -> CreateShipment {
        CreateShipment {
            carrier: "DHL".into(),
            departure_date: None,
            estimated_arrival: None,
        }
    }

    #[tokio::test]
    async fn derived_sales_order_copies_source() {
        let h = harness().await;
        let po = purchase_order(&h).await;
        let so = h
            .service
            .create_sales_order_from_purchase_order(&h.admin, po.id)
            .await
            .unwrap();
        assert_eq!(so.client_id, po.client_id);
        assert_eq!(so.currency, "USD");
        assert_eq!(so.items, po.items);
        assert_eq!(so.total, po.total);
        assert_eq!(order_total(&so.items).unwrap(), po.total);
        assert_eq!(so.purchase_order_id, Some(po.id));
        assert_eq!(so.notes, Some(format!("Generada desde OC {}", po.code)));
        assert_eq!(so.code, format_code(CodeKind::SalesOrder, current_year(), 1));

        let last = h.store.audit_entries().pop().unwrap();
        assert_eq!(last.action, AuditAction::CreateFromOc);
        assert_eq!(last.diff.unwrap()["sourceId"], json!(po.id));
    }

    #[tokio::test]
    async fn second_derivation_conflicts_by_default() {
        let h = harness().await;
        let po = purchase_order(&h).await;
        h.service
            .create_sales_order_from_purchase_order(&h.admin, po.id)
            .await
            .unwrap();
        let err = h
            .service
            .create_sales_order_from_purchase_order(&h.admin, po.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::Conflict(_)));
    }

    #[tokio::test]
    async fn allow_multiple_policy_permits_second_derivation() {
        let h = harness_with(|s| s.with_derivation_policy(DerivationPolicy::AllowMultiple)).await;
        let po = purchase_order(&h).await;
        for _ in 0..2 {
            h.service
                .create_sales_order_from_purchase_order(&h.admin, po.id)
                .await
                .unwrap();
        }
        let listed = h
            .service
            .list_sales_orders(
                &h.admin,
                SalesOrderFilter { purchase_order_id: Some(po.id), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn derivation_from_missing_or_voided_order_fails() {
        let h = harness().await;
        let err = h
            .service
            .create_sales_order_from_purchase_order(&h.admin, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::NotFound(_)));

        let po = purchase_order(&h).await;
        h.service
            .change_purchase_order_status(&h.admin, po.id, PurchaseOrderStatus::Voided)
            .await
            .unwrap();
        let err = h
            .service
            .create_sales_order_from_purchase_order(&h.admin, po.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidState(_)));
    }

    #[tokio::test]
    async fn shipment_created_once_for_dispatching_order() {
        let h = harness().await;
        let so = dispatching_sales_order(&h).await;
        let shipment = h
            .service
            .create_shipment_from_sales_order(&h.admin, so.id, dhl())
            .await
            .unwrap();
        assert_eq!(shipment.status, ShipmentStatus::Preparing);
        assert_eq!(shipment.events.len(), 1);
        assert_eq!(shipment.events[0].location, INITIAL_EVENT_LOCATION);
        assert_eq!(shipment.events[0].comment.as_deref(), Some(INITIAL_EVENT_COMMENT));
        assert_eq!(shipment.code, format!("SH-{}-000001", current_year()));
        assert_eq!(shipment.client_id, so.client_id);

        let err = h
            .service
            .create_shipment_from_sales_order(&h.admin, so.id, dhl())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::Conflict(_)));

        let detail = h.service.get_sales_order(&h.admin, so.id).await.unwrap();
        assert_eq!(detail.shipment.map(|s| s.id), Some(shipment.id));
    }

    #[tokio::test]
    async fn shipment_requires_en_despacho() {
        let h = harness().await;
        let po = purchase_order(&h).await;
        let so = h
            .service
            .create_sales_order_from_purchase_order(&h.admin, po.id)
            .await
            .unwrap();
        let err = h
            .service
            .create_shipment_from_sales_order(&h.admin, so.id, dhl())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidState(_)));

        let err = h
            .service
            .create_shipment_from_sales_order(&h.admin, Uuid::new_v4(), dhl())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::NotFound(_)));
    }

    #[tokio::test]
    async fn sales_order_transitions_are_linear() {
        let h = harness().await;
        let po = purchase_order(&h).await;
        let so = h
            .service
            .create_sales_order_from_purchase_order(&h.admin, po.id)
            .await
            .unwrap();
        let err = h
            .service
            .change_sales_order_status(&h.admin, so.id, SalesOrderStatus::Dispatching)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidTransition { .. }));
        let err = h
            .service
            .change_sales_order_status(&h.admin, so.id, SalesOrderStatus::Received)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn update_replaces_items_and_recomputes_total() {
        let h = harness().await;
        let so = h
            .service
            .create_sales_order(
                &h.admin,
                CreateSalesOrder {
                    client_id: h.client.id,
                    currency: None,
                    notes: None,
                    items: vec![item("A", 1, "10")],
                },
            )
            .await
            .unwrap();
        let updated = h
            .service
            .update_sales_order(
                &h.admin,
                so.id,
                UpdateSalesOrder {
                    notes: Some("revisada".into()),
                    items: Some(vec![item("A", 2, "10"), item("B", 1, "5")]),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.total, dec("25"));
        assert_eq!(updated.items.len(), 2);
        assert_eq!(updated.notes.as_deref(), Some("revisada"));
    }

    #[tokio::test]
    async fn update_locked_once_dispatching() {
        let h = harness().await;
        let so = dispatching_sales_order(&h).await;
        let err = h
            .service
            .update_sales_order(&h.admin, so.id, UpdateSalesOrder::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::OrderLocked(_)));
    }

    #[tokio::test]
    async fn sales_order_writes_are_admin_only() {
        let h = harness().await;
        let po = purchase_order(&h).await;
        let actor = h.client_actor();
        let err = h
            .service
            .create_sales_order_from_purchase_order(&actor, po.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::Forbidden(_)));
    }
}
