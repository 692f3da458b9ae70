use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{non_empty, OrderFlowService};
use crate::audit::{AuditAction, AuditEntry, EntityKind};
use crate::error::OrderFlowError;
use crate::model::{Shipment, ShipmentEvent, ShipmentFilter};
use crate::ports::{Result, ShipmentChanges};
use crate::principal::Actor;
use crate::status::ShipmentStatus;

/// Editable shipment details. Status is not among them: it only moves
/// through tracking events.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateShipment {
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub departure_date: Option<NaiveDate>,
    #[serde(default)]
    pub estimated_arrival: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddShipmentEvent {
    /// Defaults to now.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    pub location: String,
    pub status: ShipmentStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

impl OrderFlowService {
    pub async fn list_shipments(
        &self,
        actor: &Actor,
        mut filter: ShipmentFilter,
    ) -> Result<Vec<Shipment>> {
        if let Some(scope) = actor.client_scope() {
            filter.client_id = Some(scope);
        }
        self.ports.shipments.list(&filter).await
    }

    pub async fn get_shipment(&self, actor: &Actor, id: Uuid) -> Result<Shipment> {
        let shipment = self.load_shipment(id).await?;
        actor.require_client_access(shipment.client_id)?;
        Ok(shipment)
    }

    pub async fn list_shipment_events(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<Vec<ShipmentEvent>> {
        Ok(self.get_shipment(actor, id).await?.events)
    }

    pub async fn update_shipment(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateShipment,
    ) -> Result<Shipment> {
        actor.require_admin()?;
        let current = self.load_shipment(id).await?;
        let changes = ShipmentChanges {
            carrier: match input.carrier {
                Some(c) => Some(non_empty(Some(c)).ok_or_else(|| {
                    OrderFlowError::InvalidInput("carrier must not be blank".into())
                })?),
                None => None,
            },
            departure_date: input.departure_date,
            estimated_arrival: input.estimated_arrival,
        };
        let updated = self.ports.shipments.update_details(id, &changes).await?;
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::Shipment, id, AuditAction::Update).with_diff(
                    json!({
                        "carrier": { "from": current.carrier, "to": updated.carrier },
                        "departureDate": { "from": current.departure_date, "to": updated.departure_date },
                        "estimatedArrival": { "from": current.estimated_arrival, "to": updated.estimated_arrival },
                    }),
                ),
            )
            .await;
        Ok(updated)
    }

    /// Append a tracking event. The shipment takes the event's status,
    /// whatever its timestamp; events stay listed in timestamp order.
    pub async fn add_shipment_event(
        &self,
        actor: &Actor,
        shipment_id: Uuid,
        input: AddShipmentEvent,
    ) -> Result<Shipment> {
        actor.require_admin()?;
        let location = input.location.trim().to_string();
        if location.is_empty() {
            return Err(OrderFlowError::InvalidInput("location is required".into()));
        }
        let shipment = self.load_shipment(shipment_id).await?;

        let now = Utc::now();
        let event = ShipmentEvent {
            id: Uuid::new_v4(),
            shipment_id: shipment.id,
            occurred_at: input.occurred_at.unwrap_or(now),
            location,
            status: input.status,
            comment: non_empty(input.comment),
            created_at: now,
        };
        let updated = self.ports.shipments.append_event(&event).await?;
        tracing::info!(
            code = %updated.code,
            event_status = %event.status,
            shipment_status = %updated.status,
            "shipment event recorded"
        );
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::ShipmentEvent, event.id, AuditAction::Create)
                    .with_diff(json!({ "shipmentId": shipment.id, "newStatus": event.status })),
            )
            .await;
        Ok(updated)
    }

    async fn load_shipment(&self, id: Uuid) -> Result<Shipment> {
        self.ports
            .shipments
            .get(id)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(format!("shipment {id}")))
    }
}
