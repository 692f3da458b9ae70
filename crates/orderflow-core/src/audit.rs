//! Audit log: entry types, the recorder used by workflows, and the queued
//! dispatcher that writes entries after the primary change has committed.
//!
//! Audit is best-effort: a failed append is logged (never swallowed) but
//! never rolls back or fails the operation that produced it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::OrderFlowError;
use crate::ports::AuditStore;
use crate::principal::Actor;

pub const DEFAULT_AUDIT_LIMIT: i64 = 50;
pub const MAX_AUDIT_LIMIT: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    PurchaseOrder,
    SalesOrder,
    Shipment,
    ShipmentEvent,
    Client,
    Product,
    Archive,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PurchaseOrder => "purchase_order",
            Self::SalesOrder => "sales_order",
            Self::Shipment => "shipment",
            Self::ShipmentEvent => "shipment_event",
            Self::Client => "client",
            Self::Product => "product",
            Self::Archive => "archive",
        }
    }
}

impl FromStr for EntityKind {
    type Err = OrderFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase_order" => Ok(Self::PurchaseOrder),
            "sales_order" => Ok(Self::SalesOrder),
            "shipment" => Ok(Self::Shipment),
            "shipment_event" => Ok(Self::ShipmentEvent),
            "client" => Ok(Self::Client),
            "product" => Ok(Self::Product),
            "archive" => Ok(Self::Archive),
            other => Err(OrderFlowError::InvalidInput(format!(
                "unknown audit entity: {other}"
            ))),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    ChangeStatus,
    CreateFromOc,
    CreateFromFile,
    CreateFromAi,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::ChangeStatus => "CHANGE_STATUS",
            Self::CreateFromOc => "CREATE_FROM_OC",
            Self::CreateFromFile => "CREATE_FROM_FILE",
            Self::CreateFromAi => "CREATE_FROM_AI",
        }
    }
}

impl FromStr for AuditAction {
    type Err = OrderFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "CHANGE_STATUS" => Ok(Self::ChangeStatus),
            "CREATE_FROM_OC" => Ok(Self::CreateFromOc),
            "CREATE_FROM_FILE" => Ok(Self::CreateFromFile),
            "CREATE_FROM_AI" => Ok(Self::CreateFromAi),
            other => Err(OrderFlowError::InvalidInput(format!(
                "unknown audit action: {other}"
            ))),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit record before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor_id: Uuid,
    pub entity: EntityKind,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub diff: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEntry {
    pub fn new(actor: &Actor, entity: EntityKind, entity_id: Uuid, action: AuditAction) -> Self {
        Self {
            actor_id: actor.user_id,
            entity,
            entity_id,
            action,
            diff: None,
            ip: actor.request.ip.clone(),
            user_agent: actor.request.user_agent.clone(),
        }
    }

    pub fn with_diff(mut self, diff: serde_json::Value) -> Self {
        self.diff = Some(diff);
        self
    }
}

/// A persisted audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    #[serde(flatten)]
    pub entry: AuditEntry,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub entity: Option<EntityKind>,
    pub entity_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
}

impl AuditQuery {
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_AUDIT_LIMIT)
            .clamp(1, MAX_AUDIT_LIMIT)
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.entity.map_or(true, |e| e == entry.entity)
            && self.entity_id.map_or(true, |id| id == entry.entity_id)
            && self.user_id.map_or(true, |u| u == entry.actor_id)
    }
}

// ── Recorder ──────────────────────────────────────────────────

/// Handle through which workflows emit audit entries.
#[derive(Clone)]
pub enum AuditRecorder {
    /// Append inline; failures are logged.
    Direct(Arc<dyn AuditStore>),
    /// Hand off to an [`AuditDispatcher`] running in the background.
    Queued(mpsc::Sender<AuditEntry>),
}

impl AuditRecorder {
    pub fn direct(store: Arc<dyn AuditStore>) -> Self {
        Self::Direct(store)
    }

    /// Build a queued recorder and the dispatcher that drains it.
    /// Spawn the dispatcher via `tokio::spawn(dispatcher.run())`.
    pub fn queued(
        store: Arc<dyn AuditStore>,
        capacity: usize,
        max_attempts: usize,
    ) -> (Self, AuditDispatcher) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self::Queued(tx),
            AuditDispatcher {
                store,
                rx,
                max_attempts: max_attempts.max(1),
            },
        )
    }

    pub async fn record(&self, entry: AuditEntry) {
        match self {
            Self::Direct(store) => {
                if let Err(e) = store.append(&entry).await {
                    tracing::error!(
                        entity = entry.entity.as_str(),
                        entity_id = %entry.entity_id,
                        action = entry.action.as_str(),
                        "audit append failed: {e}"
                    );
                }
            }
            Self::Queued(tx) => {
                if let Err(mpsc::error::SendError(entry)) = tx.send(entry).await {
                    tracing::error!(
                        entity = entry.entity.as_str(),
                        entity_id = %entry.entity_id,
                        action = entry.action.as_str(),
                        "audit queue closed, entry lost"
                    );
                }
            }
        }
    }
}

/// Background writer for queued audit entries.
pub struct AuditDispatcher {
    store: Arc<dyn AuditStore>,
    rx: mpsc::Receiver<AuditEntry>,
    max_attempts: usize,
}

impl AuditDispatcher {
    /// Drain the queue until every sender is dropped.
    pub async fn run(mut self) {
        tracing::info!(max_attempts = self.max_attempts, "AuditDispatcher started");
        while let Some(entry) = self.rx.recv().await {
            self.deliver(&entry).await;
        }
        tracing::info!("AuditDispatcher stopped");
    }

    async fn deliver(&self, entry: &AuditEntry) -> bool {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(self.max_attempts - 1)
            .with_jitter()
            .build();

        let mut last_error = None;
        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }
            match self.store.append(entry).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        entity_id = %entry.entity_id,
                        "audit append failed: {e}"
                    );
                    last_error = Some(e);
                }
            }
        }

        let diff = entry
            .diff
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();
        tracing::error!(
            entity = entry.entity.as_str(),
            entity_id = %entry.entity_id,
            action = entry.action.as_str(),
            actor_id = %entry.actor_id,
            diff = %diff,
            "DEAD LETTER: audit entry dropped after {} attempt(s): {}",
            self.max_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        );
        false
    }
}
