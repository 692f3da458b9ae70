use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{non_empty, OrderFlowService};
use crate::audit::{AuditAction, AuditEntry, EntityKind};
use crate::codes::{with_fresh_code, CodeKind};
use crate::error::OrderFlowError;
use crate::lifecycle::Lifecycle;
use crate::model::{
    normalize_currency, order_total, LineItem, NewLineItem, PurchaseOrder, PurchaseOrderFilter,
};
use crate::ports::Result;
use crate::principal::Actor;
use crate::status::{OrderOrigin, PurchaseOrderStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePurchaseOrder {
    pub client_id: Uuid,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewLineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePurchaseOrder {
    pub notes: Option<String>,
}

/// Everything needed to persist a new purchase order except its code.
pub(super) struct PurchaseOrderDraft {
    pub client_id: Uuid,
    pub currency: String,
    pub origin: OrderOrigin,
    pub notes: Option<String>,
    pub archive_id: Option<Uuid>,
    pub items: Vec<LineItem>,
}

impl OrderFlowService {
    pub async fn list_purchase_orders(
        &self,
        actor: &Actor,
        mut filter: PurchaseOrderFilter,
    ) -> Result<Vec<PurchaseOrder>> {
        if let Some(scope) = actor.client_scope() {
            filter.client_id = Some(scope);
        }
        self.ports.purchase_orders.list(&filter).await
    }

    pub async fn get_purchase_order(&self, actor: &Actor, id: Uuid) -> Result<PurchaseOrder> {
        let order = self.load_purchase_order(id).await?;
        actor.require_client_access(order.client_id)?;
        Ok(order)
    }

    pub async fn create_purchase_order(
        &self,
        actor: &Actor,
        input: CreatePurchaseOrder,
    ) -> Result<PurchaseOrder> {
        actor.require_client_access(input.client_id)?;
        self.require_client(input.client_id).await?;
        let draft = PurchaseOrderDraft {
            client_id: input.client_id,
            currency: normalize_currency(input.currency.as_deref())?,
            origin: OrderOrigin::Manual,
            notes: non_empty(input.notes),
            archive_id: None,
            items: self.build_line_items(input.items).await?,
        };
        let order = self.insert_purchase_order(actor, draft, None).await?;
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::PurchaseOrder, order.id, AuditAction::Create)
                    .with_diff(json!({ "code": order.code, "total": order.total })),
            )
            .await;
        Ok(order)
    }

    pub async fn update_purchase_order(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdatePurchaseOrder,
    ) -> Result<PurchaseOrder> {
        let current = self.load_purchase_order(id).await?;
        actor.require_client_access(current.client_id)?;
        if !current.status.is_editable() {
            return Err(OrderFlowError::OrderLocked(format!(
                "purchase order {} is {}",
                current.code, current.status
            )));
        }
        let notes = non_empty(input.notes);
        let updated = self
            .ports
            .purchase_orders
            .update_notes(id, notes.clone())
            .await?;
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::PurchaseOrder, id, AuditAction::Update)
                    .with_diff(json!({ "notes": { "from": current.notes, "to": notes } })),
            )
            .await;
        Ok(updated)
    }

    /// Move a purchase order along its transition table (admin only).
    pub async fn change_purchase_order_status(
        &self,
        actor: &Actor,
        id: Uuid,
        target: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder> {
        actor.require_admin()?;
        let current = self.load_purchase_order(id).await?;
        current.status.check_transition(target)?;
        let updated = self
            .ports
            .purchase_orders
            .update_status(id, current.status, target)
            .await?;
        tracing::info!(
            code = %updated.code,
            from = %current.status,
            to = %target,
            "purchase order status changed"
        );
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::PurchaseOrder, id, AuditAction::ChangeStatus)
                    .with_diff(json!({ "from": current.status, "to": target })),
            )
            .await;
        Ok(updated)
    }

    pub(super) async fn load_purchase_order(&self, id: Uuid) -> Result<PurchaseOrder> {
        self.ports
            .purchase_orders
            .get(id)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(format!("purchase order {id}")))
    }

    /// Persist a new purchase order, using `preferred_code` when it is free
    /// and a freshly generated sequential code otherwise.
    pub(super) async fn insert_purchase_order(
        &self,
        actor: &Actor,
        draft: PurchaseOrderDraft,
        preferred_code: Option<&str>,
    ) -> Result<PurchaseOrder> {
        let now = Utc::now();
        let order = PurchaseOrder {
            id: Uuid::new_v4(),
            code: String::new(),
            client_id: draft.client_id,
            total: order_total(&draft.items)?,
            currency: draft.currency,
            status: PurchaseOrderStatus::Received,
            origin: draft.origin,
            notes: draft.notes,
            archive_id: draft.archive_id,
            created_by: actor.user_id,
            items: draft.items,
            created_at: now,
            updated_at: now,
        };

        let store = Arc::clone(&self.ports.purchase_orders);
        if let Some(code) = preferred_code {
            if !store.code_exists(code).await? {
                let order = PurchaseOrder {
                    code: code.to_string(),
                    ..order.clone()
                };
                match store.create(&order).await {
                    Ok(()) => return Ok(order),
                    Err(OrderFlowError::DuplicateCode(_)) => {
                        tracing::warn!(code, "preferred code taken concurrently");
                    }
                    Err(e) => return Err(e),
                }
            } else {
                tracing::info!(code, "preferred code already in use, generating one");
            }
        }

        with_fresh_code(self.ports.codes.as_ref(), CodeKind::PurchaseOrder, |code| {
            let store = Arc::clone(&store);
            let order = PurchaseOrder {
                code,
                ..order.clone()
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
    use crate::service::testkit::*;

    fn input(client_id: Uuid) -> CreatePurchaseOrder {
        CreatePurchaseOrder {
            client_id,
            currency: None,
            notes: Some("  urgente ".into()),
            items: vec![item("T-1", 2, "250"), item("X-9", 1, "99.5")],
        }
    }

    #[tokio::test]
    async fn manual_create_computes_total_and_code() {
        let h = harness().await;
        let order = h
            .service
            .create_purchase_order(&h.admin, input(h.client.id))
            .await
            .unwrap();
        assert_eq!(order.total, dec("599.5"));
        assert_eq!(order.currency, "COP");
        assert_eq!(order.status, PurchaseOrderStatus::Received);
        assert_eq!(order.origin, OrderOrigin::Manual);
        assert_eq!(order.notes.as_deref(), Some("urgente"));
        assert_eq!(order.code, format_code(CodeKind::PurchaseOrder, current_year(), 1));
        // Known SKU links the product and borrows its name.
        assert!(order.items[0].product_id.is_some());
        assert_eq!(order.items[0].description, "Tornillo 1/4");
        assert!(order.items[1].product_id.is_none());
        assert_eq!(order.items[1].description, "X-9");
        let audit = h.store.audit_entries();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Create);
    }

    #[tokio::test]
    async fn codes_are_sequential() {
        let h = harness().await;
        let a = h.service.create_purchase_order(&h.admin, input(h.client.id)).await.unwrap();
        let b = h.service.create_purchase_order(&h.admin, input(h.client.id)).await.unwrap();
        let year = current_year();
        assert_eq!(a.code, format_code(CodeKind::PurchaseOrder, year, 1));
        assert_eq!(b.code, format_code(CodeKind::PurchaseOrder, year, 2));
    }

    #[tokio::test]
    async fn cliente_can_only_create_for_own_client() {
        let h = harness().await;
        let actor = h.client_actor();
        assert!(h.service.create_purchase_order(&actor, input(h.client.id)).await.is_ok());
        let err = h
            .service
            .create_purchase_order(&actor, input(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::Forbidden(_)));
    }

    #[tokio::test]
    async fn unknown_client_is_not_found() {
        let h = harness().await;
        let err = h
            .service
            .create_purchase_order(&h.admin, input(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_items_rejected() {
        let h = harness().await;
        let mut req = input(h.client.id);
        req.items.clear();
        assert!(matches!(
            h.service.create_purchase_order(&h.admin, req).await.unwrap_err(),
            OrderFlowError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn overflowing_item_amount_rejected() {
        let h = harness().await;
        let mut req = input(h.client.id);
        req.items = vec![item("T-1", i32::MAX, "100000000000000000000")];
        assert!(matches!(
            h.service.create_purchase_order(&h.admin, req).await.unwrap_err(),
            OrderFlowError::InvalidInput(_)
        ));

        let mut req = input(h.client.id);
        req.items = vec![
            item("T-1", 1, "79228162514264337593543950335"),
            item("X-9", 1, "79228162514264337593543950335"),
        ];
        assert!(matches!(
            h.service.create_purchase_order(&h.admin, req).await.unwrap_err(),
            OrderFlowError::InvalidInput(_)
        ));
        assert!(h
            .service
            .list_purchase_orders(&h.admin, Default::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn transition_follows_table_and_audits() {
        let h = harness().await;
        let order = h.service.create_purchase_order(&h.admin, input(h.client.id)).await.unwrap();
        let updated = h
            .service
            .change_purchase_order_status(&h.admin, order.id, PurchaseOrderStatus::Processing)
            .await
            .unwrap();
        assert_eq!(updated.status, PurchaseOrderStatus::Processing);

        let audit = h.store.audit_entries();
        let last = audit.last().unwrap();
        assert_eq!(last.action, AuditAction::ChangeStatus);
        assert_eq!(
            last.diff,
            Some(json!({ "from": "recibida", "to": "procesando" }))
        );
    }

    #[tokio::test]
    async fn illegal_and_self_transitions_fail() {
        let h = harness().await;
        let order = h.service.create_purchase_order(&h.admin, input(h.client.id)).await.unwrap();
        for target in [PurchaseOrderStatus::Received, PurchaseOrderStatus::Processed] {
            let err = h
                .service
                .change_purchase_order_status(&h.admin, order.id, target)
                .await
                .unwrap_err();
            assert!(matches!(err, OrderFlowError::InvalidTransition { .. }));
        }
        let stored = h.service.get_purchase_order(&h.admin, order.id).await.unwrap();
        assert_eq!(stored.status, PurchaseOrderStatus::Received);
    }

    #[tokio::test]
    async fn transition_requires_admin() {
        let h = harness().await;
        let actor = h.client_actor();
        let order = h.service.create_purchase_order(&actor, input(h.client.id)).await.unwrap();
        let err = h
            .service
            .change_purchase_order_status(&actor, order.id, PurchaseOrderStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::Forbidden(_)));
    }

    #[tokio::test]
    async fn missing_order_transition_is_not_found() {
        let h = harness().await;
        let err = h
            .service
            .change_purchase_order_status(&h.admin, Uuid::new_v4(), PurchaseOrderStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::NotFound(_)));
    }

    #[tokio::test]
    async fn notes_locked_in_terminal_status() {
        let h = harness().await;
        let order = h.service.create_purchase_order(&h.admin, input(h.client.id)).await.unwrap();
        let edited = h
            .service
            .update_purchase_order(&h.admin, order.id, UpdatePurchaseOrder { notes: Some("ok".into()) })
            .await
            .unwrap();
        assert_eq!(edited.notes.as_deref(), Some("ok"));

        h.service
            .change_purchase_order_status(&h.admin, order.id, PurchaseOrderStatus::Voided)
            .await
            .unwrap();
        let err = h
            .service
            .update_purchase_order(&h.admin, order.id, UpdatePurchaseOrder { notes: None })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::OrderLocked(_)));
    }

    #[tokio::test]
    async fn cliente_reads_are_scoped() {
        let h = harness().await;
        let own = h.service.create_purchase_order(&h.admin, input(h.client.id)).await.unwrap();

        let other = crate::model::Client {
            id: Uuid::new_v4(),
            name: "Otro".into(),
            tax_id: "800".into(),
            email: None,
            phone: None,
            address: None,
            created_at: Utc::now(),
        };
        crate::ports::ClientStore::create(&h.store, &other).await.unwrap();
        let foreign = h.service.create_purchase_order(&h.admin, input(other.id)).await.unwrap();

        let actor = h.client_actor();
        let listed = h
            .service
            .list_purchase_orders(
                &actor,
                PurchaseOrderFilter { client_id: Some(other.id), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, own.id);
        assert!(matches!(
            h.service.get_purchase_order(&actor, foreign.id).await.unwrap_err(),
            OrderFlowError::Forbidden(_)
        ));
        assert_eq!(
            h.service.list_purchase_orders(&h.admin, Default::default()).await.unwrap().len(),
            2
        );
    }
}
