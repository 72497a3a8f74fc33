//! Durable state for alerts, incidents, and ledger transactions
//!
//! Backed by a single SQLite connection behind a mutex. Every compound
//! operation (cluster commit, incident update, confirmation) runs inside
//! one transaction on that connection, which is what makes the commit-time
//! membership re-check in [`IncidentStore::create_incident_with_members`]
//! safe under concurrent ingestion.

mod alerts;
mod incidents;
mod ledger_txs;
mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct IncidentStore {
    conn: Arc<Mutex<Connection>>,
}

impl IncidentStore {
    /// Open (or create) the database at `path` and bring the schema up.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| Error::Unavailable(format!("Cannot open database: {}", e)))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        info!("Incident store ready at {}", path.as_ref().display());
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("Storage mutex poisoned".to_string()))
    }
}

// Timestamps are stored as integer microseconds since the epoch.

fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| bad_column(format!("Timestamp out of range: {}", micros)))
}

/// Wrap a row decoding problem so it propagates through rusqlite's
/// row-mapping closures.
fn bad_column(msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, msg.into())
}
