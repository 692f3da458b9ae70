//! Purchase and sales order stores. Orders and their line items are written
//! in one transaction; status changes are compare-and-set.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use orderflow_core::error::OrderFlowError;
use orderflow_core::model::*;
use orderflow_core::ports::{PurchaseOrderStore, Result, SalesOrderStore};
use orderflow_core::status::{PurchaseOrderStatus, SalesOrderStatus};

use crate::error::db_err;
use crate::rows::{LineItemRow, PurchaseOrderRow, SalesOrderRow};

const PURCHASE_ORDER_ITEMS: &str = "purchase_order_items";
const SALES_ORDER_ITEMS: &str = "sales_order_items";

async fn insert_items(
    conn: &mut PgConnection,
    table: &str,
    order_id: Uuid,
    items: &[LineItem],
) -> Result<()> {
    let sql = format!(
        r#"
        INSERT INTO {table}
            (order_id, position, sku, description, quantity, unit_price, subtotal, product_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#
    );
    for (position, item) in items.iter().enumerate() {
        sqlx::query(&sql)
            .bind(order_id)
            .bind(position as i32)
            .bind(&item.sku)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.subtotal)
            .bind(item.product_id)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
    }
    Ok(())
}

async fn load_items(
    pool: &PgPool,
    table: &str,
    order_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<LineItem>>> {
    let sql = format!(
        r#"
        SELECT order_id, sku, description, quantity, unit_price, subtotal, product_id
        FROM {table}
        WHERE order_id = ANY($1)
        ORDER BY order_id, position
        "#
    );
    let rows = sqlx::query_as::<_, LineItemRow>(&sql)
        .bind(order_ids)
        .fetch_all(pool)
        .await
        .map_err(db_err)?;
    let mut by_order: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
    for row in rows {
        by_order.entry(row.order_id).or_default().push(row.into());
    }
    Ok(by_order)
}

// ── PgPurchaseOrderStore ──────────────────────────────────────

pub struct PgPurchaseOrderStore {
    pool: PgPool,
}

impl PgPurchaseOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, rows: Vec<PurchaseOrderRow>) -> Result<Vec<PurchaseOrder>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = load_items(&self.pool, PURCHASE_ORDER_ITEMS, &ids).await?;
        rows.into_iter()
            .map(|r| {
                let lines = items.remove(&r.id).unwrap_or_default();
                r.into_order(lines)
            })
            .collect()
    }

    async fn fetch(&self, id: Uuid) -> Result<PurchaseOrder> {
        self.get(id)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(format!("purchase order {id}")))
    }
}

const PURCHASE_ORDER_COLUMNS: &str = "id, code, client_id, total, currency, status, origin, \
     notes, archive_id, created_by, created_at, updated_at";

#[async_trait]
impl PurchaseOrderStore for PgPurchaseOrderStore {
    async fn create(&self, order: &PurchaseOrder) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            r#"
            INSERT INTO purchase_orders
                (id, code, client_id, total, currency, status, origin, notes,
                 archive_id, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id)
        .bind(&order.code)
        .bind(order.client_id)
        .bind(order.total)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(order.origin.as_str())
        .bind(&order.notes)
        .bind(order.archive_id)
        .bind(order.created_by)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        insert_items(&mut tx, PURCHASE_ORDER_ITEMS, order.id, &order.items).await?;
        tx.commit().await.map_err(db_err)?;
        tracing::debug!(code = %order.code, items = order.items.len(), "purchase order inserted");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PurchaseOrder>> {
        let row = sqlx::query_as::<_, PurchaseOrderRow>(&format!(
            "SELECT {PURCHASE_ORDER_COLUMNS} FROM purchase_orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &PurchaseOrderFilter) -> Result<Vec<PurchaseOrder>> {
        let (limit, offset) = page(filter.limit, filter.offset);
        let rows = sqlx::query_as::<_, PurchaseOrderRow>(&format!(
            r#"
            SELECT {PURCHASE_ORDER_COLUMNS}
            FROM purchase_orders
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR client_id = $2)
              AND ($3::text IS NULL OR code ILIKE '%' || $3 || '%')
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.client_id)
        .bind(filter.code.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        self.hydrate(rows).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: PurchaseOrderStatus,
        new: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder> {
        let updated = sqlx::query(
            r#"
            UPDATE purchase_orders
            SET status = $3, updated_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(new.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();
        let order = self.fetch(id).await?;
        if updated == 0 {
            return Err(OrderFlowError::Conflict(format!(
                "purchase order {} changed concurrently (now {})",
                order.code, order.status
            )));
        }
        Ok(order)
    }

    async fn update_notes(&self, id: Uuid, notes: Option<String>) -> Result<PurchaseOrder> {
        let updated = sqlx::query(
            "UPDATE purchase_orders SET notes = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(notes)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();
        if updated == 0 {
            return Err(OrderFlowError::NotFound(format!("purchase order {id}")));
        }
        self.fetch(id).await
    }

    async fn code_exists(&self, code: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM purchase_orders WHERE code = $1)")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }
}

// ── PgSalesOrderStore ─────────────────────────────────────────

pub struct PgSalesOrderStore {
    pool: PgPool,
}

impl PgSalesOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, rows: Vec<SalesOrderRow>) -> Result<Vec<SalesOrder>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = load_items(&self.pool, SALES_ORDER_ITEMS, &ids).await?;
        rows.into_iter()
            .map(|r| {
                let lines = items.remove(&r.id).unwrap_or_default();
                r.into_order(lines)
            })
            .collect()
    }

    async fn fetch(&self, id: Uuid) -> Result<SalesOrder> {
        self.get(id)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(format!("sales order {id}")))
    }
}

const SALES_ORDER_COLUMNS: &str = "id, code, client_id, purchase_order_id, total, currency, \
     status, notes, created_by, created_at, updated_at";

#[async_trait]
impl SalesOrderStore for PgSalesOrderStore {
    async fn create(&self, order: &SalesOrder) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            r#"
            INSERT INTO sales_orders
                (id, code, client_id, purchase_order_id, total, currency, status,
                 notes, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id)
        .bind(&order.code)
        .bind(order.client_id)
        .bind(order.purchase_order_id)
        .bind(order.total)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(&order.notes)
        .bind(order.created_by)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        insert_items(&mut tx, SALES_ORDER_ITEMS, order.id, &order.items).await?;
        tx.commit().await.map_err(db_err)?;
        tracing::debug!(code = %order.code, items = order.items.len(), "sales order inserted");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SalesOrder>> {
        let row = sqlx::query_as::<_, SalesOrderRow>(&format!(
            "SELECT {SALES_ORDER_COLUMNS} FROM sales_orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &SalesOrderFilter) -> Result<Vec<SalesOrder>> {
        let (limit, offset) = page(filter.limit, filter.offset);
        let rows = sqlx::query_as::<_, SalesOrderRow>(&format!(
            r#"
            SELECT {SALES_ORDER_COLUMNS}
            FROM sales_orders
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR client_id = $2)
              AND ($3::uuid IS NULL OR purchase_order_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.client_id)
        .bind(filter.purchase_order_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        self.hydrate(rows).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: SalesOrderStatus,
        new: SalesOrderStatus,
    ) -> Result<SalesOrder> {
        let updated = sqlx::query(
            r#"
            UPDATE sales_orders
            SET status = $3, updated_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(new.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();
        let order = self.fetch(id).await?;
        if updated == 0 {
            return Err(OrderFlowError::Conflict(format!(
                "sales order {} changed concurrently (now {})",
                order.code, order.status
            )));
        }
        Ok(order)
    }

    async fn update_contents(
        &self,
        id: Uuid,
        notes: Option<String>,
        items: Option<Vec<LineItem>>,
    ) -> Result<SalesOrder> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let updated = sqlx::query(
            "UPDATE sales_orders SET notes = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(notes)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();
        if updated == 0 {
            return Err(OrderFlowError::NotFound(format!("sales order {id}")));
        }
        if let Some(items) = items {
            sqlx::query("DELETE FROM sales_order_items WHERE order_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            insert_items(&mut tx, SALES_ORDER_ITEMS, id, &items).await?;
            sqlx::query("UPDATE sales_orders SET total = $2 WHERE id = $1")
                .bind(id)
                .bind(order_total(&items)?)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        self.fetch(id).await
    }

    async fn count_for_purchase_order(&self, purchase_order_id: Uuid) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM sales_orders WHERE purchase_order_id = $1",
        )
        .bind(purchase_order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }
}
