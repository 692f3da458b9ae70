//! Human-readable sequential codes (`OC-2024-00005`, `SH-2024-000001`).
//!
//! Sequence values come from the [`CodeSequence`] port, which must hand out
//! values atomically per (kind, year). Stores also enforce a UNIQUE code, so
//! a collision (e.g. with an imported AI order number) is retried with a
//! fresh value instead of being surfaced.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OrderFlowError;
use crate::ports::CodeSequence;

/// Bounded retries after the first attempt when a generated code collides.
pub const MAX_CODE_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    PurchaseOrder,
    SalesOrder,
    Shipment,
}

impl CodeKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::PurchaseOrder => "OC",
            Self::SalesOrder => "OV",
            Self::Shipment => "SH",
        }
    }

    /// Zero-padded width of the sequence part.
    pub fn width(&self) -> usize {
        match self {
            Self::PurchaseOrder | Self::SalesOrder => 5,
            Self::Shipment => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PurchaseOrder => "purchase_order",
            Self::SalesOrder => "sales_order",
            Self::Shipment => "shipment",
        }
    }

    /// `OC-2024-` style prefix shared by every code of one year.
    pub fn year_prefix(&self, year: i32) -> String {
        format!("{}-{}-", self.prefix(), year)
    }
}

pub fn format_code(kind: CodeKind, year: i32, seq: i64) -> String {
    format!(
        "{}{:0width$}",
        kind.year_prefix(year),
        seq,
        width = kind.width()
    )
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Allocate a code for `kind` and hand it to `insert`, regenerating on
/// `DuplicateCode`. Any other outcome of `insert` is returned as is.
pub async fn with_fresh_code<T, F, Fut>(
    codes: &dyn CodeSequence,
    kind: CodeKind,
    mut insert: F,
) -> Result<T, OrderFlowError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, OrderFlowError>>,
{
    let year = current_year();
    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(25))
        .with_max_delay(Duration::from_secs(1))
        .with_max_times(MAX_CODE_RETRIES)
        .with_jitter()
        .build();

    for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
        }
        let seq = codes.next_value(kind, year).await?;
        let code = format_code(kind, year, seq);
        match insert(code.clone()).await {
            Err(OrderFlowError::DuplicateCode(_)) => {
                tracing::warn!(code = %code, attempt, "code collision, regenerating");
            }
            other => return other,
        }
    }

    tracing::error!(kind = kind.as_str(), "code allocation exhausted retries");
    Err(OrderFlowError::Conflict(format!(
        "could not allocate a unique {} code",
        kind.prefix()
    )))
}
