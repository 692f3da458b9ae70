//! orderflow-core - domain model and workflows for the OrderFlow API.
//!
//! Purchase orders (OC) become sales orders (OV), which become shipments.
//! This crate holds the pure business logic: status vocabularies and their
//! transition tables, the actor model, port traits for storage and the AI
//! extractor, and the workflows in [`service::OrderFlowService`]. Adapters
//! live in `orderflow-postgres` and `orderflow-server`.

pub mod audit;
pub mod codes;
pub mod error;
pub mod ingestion;
pub mod lifecycle;
pub mod model;
pub mod ports;
pub mod principal;
pub mod service;
pub mod status;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;
