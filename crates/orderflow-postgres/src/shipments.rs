//! Shipment store. One shipment per sales order is enforced by the
//! `shipments_sales_order_id_key` constraint; appending an event writes its
//! status onto the shipment inside the same transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use orderflow_core::error::OrderFlowError;
use orderflow_core::model::*;
use orderflow_core::ports::{Result, ShipmentChanges, ShipmentStore};

use crate::error::db_err;
use crate::rows::{ShipmentEventRow, ShipmentRow};

const SHIPMENT_SELECT: &str = r#"
    SELECT s.id, s.code, s.sales_order_id, so.client_id, s.carrier, s.status,
           s.departure_date, s.estimated_arrival, s.created_at, s.updated_at
    FROM shipments s
    JOIN sales_orders so ON so.id = s.sales_order_id
"#;

pub struct PgShipmentStore {
    pool: PgPool,
}

impl PgShipmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, rows: Vec<ShipmentRow>) -> Result<Vec<Shipment>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let event_rows = sqlx::query_as::<_, ShipmentEventRow>(
            r#"
            SELECT id, shipment_id, occurred_at, location, status, comment, created_at
            FROM shipment_events
            WHERE shipment_id = ANY($1)
            ORDER BY occurred_at, seq
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut events: HashMap<Uuid, Vec<ShipmentEvent>> = HashMap::new();
        for row in event_rows {
            let event = ShipmentEvent::try_from(row)?;
            events.entry(event.shipment_id).or_default().push(event);
        }
        rows.into_iter()
            .map(|r| {
                let list = events.remove(&r.id).unwrap_or_default();
                r.into_shipment(list)
            })
            .collect()
    }

    async fn fetch_one(&self, clause: &str, id: Uuid) -> Result<Option<Shipment>> {
        let row = sqlx::query_as::<_, ShipmentRow>(&format!("{SHIPMENT_SELECT} WHERE {clause}"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn fetch(&self, id: Uuid) -> Result<Shipment> {
        self.get(id)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(format!("shipment {id}")))
    }
}

async fn insert_event(conn: &mut PgConnection, event: &ShipmentEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO shipment_events
            (id, shipment_id, occurred_at, location, status, comment, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(event.id)
    .bind(event.shipment_id)
    .bind(event.occurred_at)
    .bind(&event.location)
    .bind(event.status.as_str())
    .bind(&event.comment)
    .bind(event.created_at)
    .execute(conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

#[async_trait]
impl ShipmentStore for PgShipmentStore {
    async fn create(&self, shipment: &Shipment) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            r#"
            INSERT INTO shipments
                (id, code, sales_order_id, carrier, status, departure_date,
                 estimated_arrival, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(shipment.id)
        .bind(&shipment.code)
        .bind(shipment.sales_order_id)
        .bind(&shipment.carrier)
        .bind(shipment.status.as_str())
        .bind(shipment.departure_date)
        .bind(shipment.estimated_arrival)
        .bind(shipment.created_at)
        .bind(shipment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        for event in &shipment.events {
            insert_event(&mut tx, event).await?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Shipment>> {
        self.fetch_one("s.id = $1", id).await
    }

    async fn get_by_sales_order(&self, sales_order_id: Uuid) -> Result<Option<Shipment>> {
        self.fetch_one("s.sales_order_id = $1", sales_order_id).await
    }

    async fn list(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>> {
        let (limit, offset) = page(filter.limit, filter.offset);
        let rows = sqlx::query_as::<_, ShipmentRow>(&format!(
            r#"
            {SHIPMENT_SELECT}
            WHERE ($1::text IS NULL OR s.status = $1)
              AND ($2::uuid IS NULL OR so.client_id = $2)
            ORDER BY s.created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.client_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        self.hydrate(rows).await
    }

    async fn update_details(&self, id: Uuid, changes: &ShipmentChanges) -> Result<Shipment> {
        let updated = sqlx::query(
            r#"
            UPDATE shipments
            SET carrier = COALESCE($2, carrier),
                departure_date = COALESCE($3, departure_date),
                estimated_arrival = COALESCE($4, estimated_arrival),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.carrier.as_deref())
        .bind(changes.departure_date)
        .bind(changes.estimated_arrival)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();
        if updated == 0 {
            return Err(OrderFlowError::NotFound(format!("shipment {id}")));
        }
        self.fetch(id).await
    }

    async fn append_event(&self, event: &ShipmentEvent) -> Result<Shipment> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        // Row lock serializes concurrent appends to one shipment.
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM shipments WHERE id = $1 FOR UPDATE")
                .bind(event.shipment_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        if locked.is_none() {
            return Err(OrderFlowError::NotFound(format!(
                "shipment {}",
                event.shipment_id
            )));
        }
        insert_event(&mut tx, event).await?;
        sqlx::query("UPDATE shipments SET status = $2, updated_at = now() WHERE id = $1")
            .bind(event.shipment_id)
            .bind(event.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        self.fetch(event.shipment_id).await
    }
}
