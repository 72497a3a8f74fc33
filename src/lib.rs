//! Incident correlation and evidence anchoring runtime
//!
//! An always-on node that ingests SOS alerts, correlates them in space
//! and time into incidents, composes deterministic e-FIR evidence
//! documents, and anchors their hashes on an external ledger.
//!
//! The flow through the crate: [`ingest::IngestionCoordinator`] drives
//! every alert from arrival to settlement; [`cluster::ClusterEngine`]
//! makes the pure grouping decision; [`store::IncidentStore`] owns all
//! durable state and the atomic cluster commit; [`ledger`] handles
//! anchoring and confirmation tracking; [`bus::EventBus`] fans lifecycle
//! events out to subscribers.

pub mod api;
pub mod bus;
pub mod cluster;
pub mod config;
pub mod error;
pub mod evidence;
pub mod ingest;
pub mod ledger;
pub mod model;
pub mod store;

pub use bus::EventBus;
pub use cluster::ClusterEngine;
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::IngestionCoordinator;
pub use ledger::LedgerBridge;
pub use store::IncidentStore;
