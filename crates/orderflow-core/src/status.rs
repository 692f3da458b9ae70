//! Canonical status vocabularies.
//!
//! Wire values are the lower-snake Spanish terms persisted in the database and
//! exchanged over HTTP. Transition tables live in [`crate::lifecycle`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OrderFlowError;

#[derive(Debug, thiserror::Error)]
pub enum StatusParseError {
    #[error("unknown {entity} status: {value}")]
    Unknown { entity: &'static str, value: String },
}

impl From<StatusParseError> for OrderFlowError {
    fn from(e: StatusParseError) -> Self {
        OrderFlowError::InvalidInput(e.to_string())
    }
}

// ── Purchase order (OC) ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseOrderStatus {
    #[serde(rename = "recibida")]
    Received,
    #[serde(rename = "procesando")]
    Processing,
    #[serde(rename = "pendiente_ajustes")]
    PendingAdjustments,
    #[serde(rename = "procesada")]
    Processed,
    #[serde(rename = "anulada")]
    Voided,
}

impl PurchaseOrderStatus {
    pub const ALL: [Self; 5] = [
        Self::Received,
        Self::Processing,
        Self::PendingAdjustments,
        Self::Processed,
        Self::Voided,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "recibida",
            Self::Processing => "procesando",
            Self::PendingAdjustments => "pendiente_ajustes",
            Self::Processed => "procesada",
            Self::Voided => "anulada",
        }
    }
}

impl FromStr for PurchaseOrderStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recibida" => Ok(Self::Received),
            "procesando" => Ok(Self::Processing),
            "pendiente_ajustes" => Ok(Self::PendingAdjustments),
            "procesada" => Ok(Self::Processed),
            "anulada" => Ok(Self::Voided),
            _ => Err(StatusParseError::Unknown {
                entity: "purchase_order",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Sales order (OV) ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SalesOrderStatus {
    #[serde(rename = "recibida")]
    Received,
    #[serde(rename = "procesando")]
    Processing,
    /// Ready for dispatch: the only status that permits shipment creation.
    #[serde(rename = "en_despacho")]
    Dispatching,
    #[serde(rename = "procesada")]
    Processed,
}

impl SalesOrderStatus {
    pub const ALL: [Self; 4] = [
        Self::Received,
        Self::Processing,
        Self::Dispatching,
        Self::Processed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "recibida",
            Self::Processing => "procesando",
            Self::Dispatching => "en_despacho",
            Self::Processed => "procesada",
        }
    }

    pub fn is_ready_for_dispatch(&self) -> bool {
        matches!(self, Self::Dispatching)
    }
}

impl FromStr for SalesOrderStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recibida" => Ok(Self::Received),
            "procesando" => Ok(Self::Processing),
            "en_despacho" => Ok(Self::Dispatching),
            "procesada" => Ok(Self::Processed),
            _ => Err(StatusParseError::Unknown {
                entity: "sales_order",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SalesOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Shipment (Envío) ──────────────────────────────────────────

/// Shipment status has no transition table: it is always the status of the
/// most recent tracking event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipmentStatus {
    #[serde(rename = "preparando")]
    Preparing,
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "en_transito")]
    InTransit,
    #[serde(rename = "en_distribucion")]
    OutForDelivery,
    #[serde(rename = "retenido")]
    OnHold,
    #[serde(rename = "entregado")]
    Delivered,
    #[serde(rename = "devuelto")]
    Returned,
    #[serde(rename = "cancelado")]
    Cancelled,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "preparando",
            Self::Pending => "pendiente",
            Self::InTransit => "en_transito",
            Self::OutForDelivery => "en_distribucion",
            Self::OnHold => "retenido",
            Self::Delivered => "entregado",
            Self::Returned => "devuelto",
            Self::Cancelled => "cancelado",
        }
    }
}

impl FromStr for ShipmentStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparando" => Ok(Self::Preparing),
            "pendiente" => Ok(Self::Pending),
            "en_transito" => Ok(Self::InTransit),
            "en_distribucion" => Ok(Self::OutForDelivery),
            "retenido" => Ok(Self::OnHold),
            "entregado" => Ok(Self::Delivered),
            "devuelto" => Ok(Self::Returned),
            "cancelado" => Ok(Self::Cancelled),
            _ => Err(StatusParseError::Unknown {
                entity: "shipment",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Order origin ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderOrigin {
    Manual,
    File,
    Ai,
}

impl OrderOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::File => "file",
            Self::Ai => "ai",
        }
    }
}

impl FromStr for OrderOrigin {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "file" => Ok(Self::File),
            "ai" => Ok(Self::Ai),
            _ => Err(StatusParseError::Unknown {
                entity: "order_origin",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OrderOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
