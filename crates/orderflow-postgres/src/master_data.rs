//! Clients, products and upload archives.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use orderflow_core::error::OrderFlowError;
use orderflow_core::model::{Archive, Client, Product, ProductFilter};
use orderflow_core::ports::{ArchiveStore, ClientStore, ProductStore, Result};

use crate::error::db_err;
use crate::rows::{ArchiveRow, ClientRow, ProductRow};

const CLIENT_COLUMNS: &str = "id, name, tax_id, email, phone, address, created_at";
const PRODUCT_COLUMNS: &str = "id, sku, name, description, unit_price, active, created_at";

// ── PgClientStore ─────────────────────────────────────────────

pub struct PgClientStore {
    pool: PgPool,
}

impl PgClientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientStore for PgClientStore {
    async fn create(&self, client: &Client) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clients (id, name, tax_id, email, phone, address, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(client.id)
        .bind(&client.name)
        .bind(&client.tax_id)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(&client.address)
        .bind(client.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Client>> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<Client>> {
        let rows = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_by_tax_id(&self, tax_id: &str) -> Result<Option<Client>> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE tax_id = $1"
        ))
        .bind(tax_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn update(&self, client: &Client) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE clients
            SET name = $2, tax_id = $3, email = $4, phone = $5, address = $6
            WHERE id = $1
            "#,
        )
        .bind(client.id)
        .bind(&client.name)
        .bind(&client.tax_id)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(&client.address)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();
        if updated == 0 {
            return Err(OrderFlowError::NotFound(format!("client {}", client.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();
        if deleted == 0 {
            return Err(OrderFlowError::NotFound(format!("client {id}")));
        }
        Ok(())
    }
}

// ── PgProductStore ────────────────────────────────────────────

pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn create(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, description, unit_price, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_price)
        .bind(product.active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let term = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE ($1::text IS NULL
                   OR name ILIKE '%' || $1 || '%'
                   OR sku ILIKE '%' || $1 || '%'
                   OR description ILIKE '%' || $1 || '%')
              AND ($2::text IS NULL OR sku ILIKE '%' || $2 || '%')
              AND ($3::boolean IS NULL OR active = $3)
            ORDER BY sku
            "#
        ))
        .bind(term(&filter.search))
        .bind(term(&filter.sku))
        .bind(filter.active)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = $1"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn update(&self, product: &Product) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE products
            SET sku = $2, name = $3, description = $4, unit_price = $5, active = $6
            WHERE id = $1
            "#,
        )
        .bind(product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_price)
        .bind(product.active)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();
        if updated == 0 {
            return Err(OrderFlowError::NotFound(format!("product {}", product.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();
        if deleted == 0 {
            return Err(OrderFlowError::NotFound(format!("product {id}")));
        }
        Ok(())
    }
}

// ── PgArchiveStore ────────────────────────────────────────────

pub struct PgArchiveStore {
    pool: PgPool,
}

impl PgArchiveStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArchiveStore for PgArchiveStore {
    async fn create(&self, archive: &Archive) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO archives
                (id, file_name, mime_type, size_bytes, storage_ref, uploaded_by, client_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(archive.id)
        .bind(&archive.file_name)
        .bind(&archive.mime_type)
        .bind(archive.size_bytes)
        .bind(&archive.storage_ref)
        .bind(archive.uploaded_by)
        .bind(archive.client_id)
        .bind(archive.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Archive>> {
        let row = sqlx::query_as::<_, ArchiveRow>(
            r#"
            SELECT id, file_name, mime_type, size_bytes, storage_ref, uploaded_by, client_id, created_at
            FROM archives
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }
}
