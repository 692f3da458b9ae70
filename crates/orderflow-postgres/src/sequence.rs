use async_trait::async_trait;
use orderflow_core::codes::CodeKind;
use orderflow_core::ports::{CodeSequence, Result};
use sqlx::PgPool;

use crate::error::db_err;

fn table_for(kind: CodeKind) -> &'static str {
    match kind {
        CodeKind::PurchaseOrder => "purchase_orders",
        CodeKind::SalesOrder => "sales_orders",
        CodeKind::Shipment => "shipments",
    }
}

/// Per-(kind, year) counter. The first call for a year seeds the counter
/// from the codes already present, so data written before the counter
/// existed keeps its numbering.
pub struct PgCodeSequence {
    pool: PgPool,
}

impl PgCodeSequence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CodeSequence for PgCodeSequence {
    async fn next_value(&self, kind: CodeKind, year: i32) -> Result<i64> {
        let sql = format!(
            r#"
            INSERT INTO code_sequences (kind, year, last_value)
            VALUES ($1, $2, (SELECT count(*) FROM {table} WHERE code LIKE $3) + 1)
            ON CONFLICT (kind, year)
            DO UPDATE SET last_value = code_sequences.last_value + 1
            RETURNING last_value
            "#,
            table = table_for(kind)
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(kind.as_str())
            .bind(year)
            .bind(format!("{}%", kind.year_prefix(year)))
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }
}
