//! Schema creation and versioning

use rusqlite::params;

use crate::error::{Error, Result};

use super::{to_micros, IncidentStore};

const SCHEMA_VERSION: i32 = 1;

const META_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_meta (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
";

const ALERTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alerts (
    alert_id TEXT PRIMARY KEY,
    digital_id TEXT,
    tourist_id TEXT,
    lat REAL,
    lng REAL,
    timestamp INTEGER NOT NULL,
    source TEXT NOT NULL,
    media_refs TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'received',
    incident_id TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON alerts(timestamp);
CREATE INDEX IF NOT EXISTS idx_alerts_incident ON alerts(incident_id);
";

const INCIDENTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS incidents (
    incident_id TEXT PRIMARY KEY,
    alert_ids TEXT NOT NULL,
    priority INTEGER NOT NULL,
    assigned_unit TEXT,
    efir_pointer TEXT,
    efir_hash TEXT,
    ledger_tx_id TEXT,
    status TEXT NOT NULL DEFAULT 'received',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_incidents_status ON incidents(status);
CREATE INDEX IF NOT EXISTS idx_incidents_created ON incidents(created_at);
";

const LEDGER_TXS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ledger_txs (
    tx_id TEXT PRIMARY KEY,
    op_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    payload_hash TEXT NOT NULL,
    submitted_at INTEGER NOT NULL,
    confirmed_at INTEGER,
    block_ref TEXT,
    raw_response TEXT
);

CREATE INDEX IF NOT EXISTS idx_ledger_txs_target ON ledger_txs(target_id);
";

impl IncidentStore {
    pub(super) fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(META_SCHEMA)?;

        let current: Option<i32> =
            conn.query_row("SELECT MAX(version) FROM schema_meta", [], |row| row.get(0))?;
        if let Some(version) = current {
            if version > SCHEMA_VERSION {
                return Err(Error::Internal(format!(
                    "Database schema version {} is newer than supported version {}",
                    version, SCHEMA_VERSION
                )));
            }
        }

        conn.execute_batch(ALERTS_SCHEMA)?;
        conn.execute_batch(INCIDENTS_SCHEMA)?;
        conn.execute_batch(LEDGER_TXS_SCHEMA)?;

        conn.execute(
            "INSERT OR REPLACE INTO schema_meta (version, applied_at) VALUES (?1, ?2)",
            params![SCHEMA_VERSION, to_micros(chrono::Utc::now())],
        )?;

        Ok(())
    }
}
