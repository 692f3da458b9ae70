use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use orderflow_core::audit::{AuditEntry, AuditLogEntry, AuditQuery};
use orderflow_core::ports::{AuditStore, Result};

use crate::error::db_err;
use crate::rows::AuditRow;

/// Append-only audit log.
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, actor_id, entity, entity_id, action, diff, ip, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.actor_id)
        .bind(entry.entity.as_str())
        .bind(entry.entity_id)
        .bind(entry.action.as_str())
        .bind(&entry.diff)
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, actor_id, entity, entity_id, action, diff, ip, user_agent, created_at
            FROM audit_log
            WHERE ($1::text IS NULL OR entity = $1)
              AND ($2::uuid IS NULL OR entity_id = $2)
              AND ($3::uuid IS NULL OR actor_id = $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
        )
        .bind(query.entity.map(|e| e.as_str()))
        .bind(query.entity_id)
        .bind(query.user_id)
        .bind(query.effective_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }
}
