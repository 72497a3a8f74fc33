//! Local bookkeeping for ledger transactions

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::model::{LedgerOp, LedgerTransaction};

use super::{bad_column, from_micros, to_micros, IncidentStore};

const TX_COLUMNS: &str =
    "tx_id, op_type, target_id, payload_hash, submitted_at, confirmed_at, block_ref, raw_response";

fn tx_from_row(row: &Row) -> rusqlite::Result<LedgerTransaction> {
    let op_text: String = row.get(1)?;
    let op_type = LedgerOp::parse(&op_text)
        .ok_or_else(|| bad_column(format!("Unknown ledger op: {}", op_text)))?;

    let confirmed_micros: Option<i64> = row.get(5)?;
    let confirmed_at = match confirmed_micros {
        Some(micros) => Some(from_micros(micros)?),
        None => None,
    };

    Ok(LedgerTransaction {
        tx_id: row.get(0)?,
        op_type,
        target_id: row.get(2)?,
        payload_hash: row.get(3)?,
        submitted_at: from_micros(row.get(4)?)?,
        confirmed_at,
        block_ref: row.get(6)?,
        raw_response: row.get(7)?,
    })
}

impl IncidentStore {
    /// Record a freshly submitted transaction in pending state.
    pub fn record_ledger_tx(&self, tx: &LedgerTransaction) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ledger_txs (tx_id, op_type, target_id, payload_hash, submitted_at, \
             confirmed_at, block_ref, raw_response) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                tx.tx_id,
                tx.op_type.as_str(),
                tx.target_id,
                tx.payload_hash,
                to_micros(tx.submitted_at),
                tx.confirmed_at.map(to_micros),
                tx.block_ref,
                tx.raw_response,
            ],
        )?;
        Ok(())
    }

    /// Write-once confirmation. A second confirmation for the same
    /// transaction returns [`Error::Conflict`] and changes nothing.
    pub fn confirm_ledger_tx(
        &self,
        tx_id: &str,
        confirmed_at: DateTime<Utc>,
        block_ref: &str,
        raw_response: Option<&str>,
    ) -> Result<LedgerTransaction> {
        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;

        let current = Self::get_ledger_tx_inner(&db_tx, tx_id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {} not found", tx_id)))?;
        if current.is_confirmed() {
            return Err(Error::Conflict(format!(
                "Transaction {} is already confirmed",
                tx_id
            )));
        }

        let changed = db_tx.execute(
            "UPDATE ledger_txs SET confirmed_at = ?1, block_ref = ?2, \
             raw_response = COALESCE(?3, raw_response) \
             WHERE tx_id = ?4 AND confirmed_at IS NULL",
            params![to_micros(confirmed_at), block_ref, raw_response, tx_id],
        )?;
        if changed != 1 {
            return Err(Error::Conflict(format!(
                "Transaction {} is already confirmed",
                tx_id
            )));
        }

        let updated = Self::get_ledger_tx_inner(&db_tx, tx_id)?
            .ok_or_else(|| Error::Internal(format!("Transaction {} vanished", tx_id)))?;
        db_tx.commit()?;
        Ok(updated)
    }

    pub fn get_ledger_tx(&self, tx_id: &str) -> Result<Option<LedgerTransaction>> {
        let conn = self.conn()?;
        Self::get_ledger_tx_inner(&conn, tx_id)
    }

    fn get_ledger_tx_inner(conn: &Connection, tx_id: &str) -> Result<Option<LedgerTransaction>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM ledger_txs WHERE tx_id = ?1",
            TX_COLUMNS
        ))?;
        match stmt.query_row(params![tx_id], tx_from_row) {
            Ok(tx) => Ok(Some(tx)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Most recently submitted first, optionally filtered by operation
    /// kind and target.
    pub fn list_ledger_txs(
        &self,
        op_type: Option<LedgerOp>,
        target_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>> {
        let conn = self.conn()?;

        let mut sql = format!("SELECT {} FROM ledger_txs", TX_COLUMNS);
        let mut conditions: Vec<String> = Vec::new();
        let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(op) = op_type {
            conditions.push(format!("op_type = ?{}", sql_params.len() + 1));
            sql_params.push(Box::new(op.as_str().to_string()));
        }
        if let Some(target) = target_id {
            conditions.push(format!("target_id = ?{}", sql_params.len() + 1));
            sql_params.push(Box::new(target.to_string()));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(&format!(
            " ORDER BY submitted_at DESC LIMIT ?{} OFFSET ?{}",
            sql_params.len() + 1,
            sql_params.len() + 2
        ));
        sql_params.push(Box::new(limit as i64));
        sql_params.push(Box::new(offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), tx_from_row)?;

        let mut txs = Vec::new();
        for row in rows {
            txs.push(row?);
        }
        Ok(txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> IncidentStore {
        IncidentStore::open(dir.path().join("txs.db")).unwrap()
    }

    fn pending(tx_id: &str, op_type: LedgerOp, target_id: &str) -> LedgerTransaction {
        LedgerTransaction {
            tx_id: tx_id.to_string(),
            op_type,
            target_id: target_id.to_string(),
            payload_hash: "ab".repeat(32),
            submitted_at: Utc::now(),
            confirmed_at: None,
            block_ref: None,
            raw_response: Some("{\"accepted\":true}".to_string()),
        }
    }

    #[test]
    fn test_confirmation_is_write_once() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let tx = pending("mock_tx_0011223344556677", LedgerOp::AnchorEvidence, "inc-1");
        store.record_ledger_tx(&tx).unwrap();

        let confirmed = store
            .confirm_ledger_tx(&tx.tx_id, Utc::now(), "block_7", None)
            .unwrap();
        assert!(confirmed.is_confirmed());
        assert_eq!(confirmed.block_ref.as_deref(), Some("block_7"));
        // COALESCE keeps the submission response when no raw payload
        // accompanies the confirmation.
        assert_eq!(confirmed.raw_response.as_deref(), Some("{\"accepted\":true}"));

        let err = store
            .confirm_ledger_tx(&tx.tx_id, Utc::now(), "block_8", None)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let row = store.get_ledger_tx(&tx.tx_id).unwrap().unwrap();
        assert_eq!(row.block_ref.as_deref(), Some("block_7"));
        assert_eq!(row.confirmed_at, confirmed.confirmed_at);
    }

    #[test]
    fn test_confirming_unknown_tx_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let err = store
            .confirm_ledger_tx("mock_tx_ffffffffffffffff", Utc::now(), "block_1", None)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_list_filters_by_op_and_target() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .record_ledger_tx(&pending("tx-1", LedgerOp::AnchorEvidence, "inc-1"))
            .unwrap();
        store
            .record_ledger_tx(&pending("tx-2", LedgerOp::RecordIncident, "inc-1"))
            .unwrap();
        store
            .record_ledger_tx(&pending("tx-3", LedgerOp::AnchorEvidence, "inc-2"))
            .unwrap();

        let anchors = store
            .list_ledger_txs(Some(LedgerOp::AnchorEvidence), None, 10, 0)
            .unwrap();
        assert_eq!(anchors.len(), 2);

        let for_incident = store.list_ledger_txs(None, Some("inc-1"), 10, 0).unwrap();
        assert_eq!(for_incident.len(), 2);

        let narrowed = store
            .list_ledger_txs(Some(LedgerOp::AnchorEvidence), Some("inc-2"), 10, 0)
            .unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].tx_id, "tx-3");

        let all = store.list_ledger_txs(None, None, 10, 0).unwrap();
        assert_eq!(all.len(), 3);
    }
}
