//! sqlx error translation.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::anyhow;
use orderflow_core::error::OrderFlowError;

/// Map a sqlx error onto the domain taxonomy. Unique violations on a
/// `*_code_key` constraint are code collisions the workflows retry; any
/// other unique violation is a caller-visible conflict. A foreign key
/// violation means a delete hit a row that is still referenced.
pub(crate) fn db_err(e: sqlx::Error) -> OrderFlowError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let constraint = db.constraint().unwrap_or_default().to_string();
            if constraint.ends_with("_code_key") {
                return OrderFlowError::DuplicateCode(constraint);
            }
            return OrderFlowError::Conflict(match constraint.as_str() {
                "shipments_sales_order_id_key" => "sales order already has a shipment".into(),
                "clients_tax_id_key" => "a client with this tax id already exists".into(),
                "products_sku_key" => "a product with this SKU already exists".into(),
                _ => db.message().to_string(),
            });
        }
        if db.is_foreign_key_violation() {
            let constraint = db.constraint().unwrap_or_default();
            return OrderFlowError::Conflict(format!(
                "record is still referenced ({constraint})"
            ));
        }
    }
    OrderFlowError::Internal(anyhow!(e))
}

/// Parse a stored text column into its domain enum. A value outside the
/// vocabulary means the row is corrupt, not that the caller erred.
pub(crate) fn parse_column<T>(column: &str, value: &str) -> Result<T, OrderFlowError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e: T::Err| OrderFlowError::Internal(anyhow!("column {column}: {e}")))
}
