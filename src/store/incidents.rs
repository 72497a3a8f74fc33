//! Incident persistence and the atomic cluster commit

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{AlertStatus, Incident, IncidentPatch, IncidentStatus};

use super::{bad_column, from_micros, to_micros, IncidentStore};

const INCIDENT_COLUMNS: &str = "incident_id, alert_ids, priority, assigned_unit, efir_pointer, \
                                efir_hash, ledger_tx_id, status, created_at, updated_at";

fn incident_from_row(row: &Row) -> rusqlite::Result<Incident> {
    let ids_json: String = row.get(1)?;
    let alert_ids: Vec<String> = serde_json::from_str(&ids_json)
        .map_err(|e| bad_column(format!("Bad alert_ids JSON: {}", e)))?;

    let priority: i64 = row.get(2)?;

    let status_text: String = row.get(7)?;
    let status = IncidentStatus::parse(&status_text)
        .ok_or_else(|| bad_column(format!("Unknown incident status: {}", status_text)))?;

    Ok(Incident {
        incident_id: row.get(0)?,
        alert_ids,
        priority: priority as u32,
        assigned_unit: row.get(3)?,
        efir_pointer: row.get(4)?,
        efir_hash: row.get(5)?,
        ledger_tx_id: row.get(6)?,
        status,
        created_at: from_micros(row.get(8)?)?,
        updated_at: from_micros(row.get(9)?)?,
    })
}

impl IncidentStore {
    /// Atomically open an incident over `member_ids`.
    ///
    /// Inside one transaction every member is re-checked: any alert another
    /// commit has claimed since the caller's snapshot is dropped from the
    /// group. If the survivors fall below `threshold` nothing is written
    /// and [`Error::ClusterRace`] tells the caller to retry with a fresh
    /// snapshot. Priority is recomputed from the surviving set.
    pub fn create_incident_with_members(
        &self,
        member_ids: &[String],
        threshold: usize,
        now: DateTime<Utc>,
    ) -> Result<Incident> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut survivors: Vec<String> = Vec::with_capacity(member_ids.len());
        for alert_id in member_ids {
            let claimed_by: Option<String> = match tx.query_row(
                "SELECT incident_id FROM alerts WHERE alert_id = ?1",
                params![alert_id],
                |row| row.get(0),
            ) {
                Ok(value) => value,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return Err(Error::NotFound(format!("Alert {} not found", alert_id)));
                }
                Err(e) => return Err(e.into()),
            };
            match claimed_by {
                Some(other) => {
                    debug!("Alert {} already claimed by incident {}, dropped", alert_id, other)
                }
                None => survivors.push(alert_id.clone()),
            }
        }

        if survivors.len() < threshold {
            return Err(Error::ClusterRace(format!(
                "{} of {} members survive the commit re-check",
                survivors.len(),
                member_ids.len()
            )));
        }

        let incident = Incident::new(survivors, now);
        let ids_json = serde_json::to_string(&incident.alert_ids)
            .map_err(|e| Error::Internal(format!("Cannot encode alert_ids: {}", e)))?;

        tx.execute(
            "INSERT INTO incidents (incident_id, alert_ids, priority, assigned_unit, \
             efir_pointer, efir_hash, ledger_tx_id, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, NULL, NULL, NULL, NULL, ?4, ?5, ?5)",
            params![
                incident.incident_id,
                ids_json,
                incident.priority,
                incident.status.as_str(),
                to_micros(now),
            ],
        )?;

        for alert_id in &incident.alert_ids {
            let changed = tx.execute(
                "UPDATE alerts SET status = ?1, incident_id = ?2 \
                 WHERE alert_id = ?3 AND incident_id IS NULL",
                params![AlertStatus::Escalated.as_str(), incident.incident_id, alert_id],
            )?;
            if changed != 1 {
                return Err(Error::Internal(format!(
                    "Alert {} was claimed mid-transaction",
                    alert_id
                )));
            }
        }

        tx.commit()?;
        info!(
            "Incident {} opened with {} member alerts",
            incident.incident_id,
            incident.alert_ids.len()
        );
        Ok(incident)
    }

    pub fn get_incident(&self, incident_id: &str) -> Result<Option<Incident>> {
        let conn = self.conn()?;
        Self::get_incident_inner(&conn, incident_id)
    }

    fn get_incident_inner(conn: &Connection, incident_id: &str) -> Result<Option<Incident>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM incidents WHERE incident_id = ?1",
            INCIDENT_COLUMNS
        ))?;
        match stmt.query_row(params![incident_id], incident_from_row) {
            Ok(incident) => Ok(Some(incident)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Newest first, optionally filtered by status.
    pub fn list_incidents(
        &self,
        status: Option<IncidentStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Incident>> {
        let conn = self.conn()?;

        let mut sql = format!("SELECT {} FROM incidents", INCIDENT_COLUMNS);
        let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = status {
            sql.push_str(" WHERE status = ?1");
            sql_params.push(Box::new(status.as_str().to_string()));
        }

        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
            sql_params.len() + 1,
            sql_params.len() + 2
        ));
        sql_params.push(Box::new(limit as i64));
        sql_params.push(Box::new(offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), incident_from_row)?;

        let mut incidents = Vec::new();
        for row in rows {
            incidents.push(row?);
        }
        Ok(incidents)
    }

    /// Apply a partial update. Closed incidents reject every change, and
    /// status never moves backward; re-asserting the current status is a
    /// no-op so operator retries stay safe.
    pub fn update_incident(
        &self,
        incident_id: &str,
        patch: &IncidentPatch,
        now: DateTime<Utc>,
    ) -> Result<Incident> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current = Self::get_incident_inner(&tx, incident_id)?
            .ok_or_else(|| Error::NotFound(format!("Incident {} not found", incident_id)))?;

        if current.status == IncidentStatus::Closed {
            return Err(Error::Conflict(format!(
                "Incident {} is closed and immutable",
                incident_id
            )));
        }

        if let Some(next) = patch.status {
            if next < current.status {
                return Err(Error::InvalidArgument(format!(
                    "Cannot move incident {} from {} back to {}",
                    incident_id,
                    current.status.as_str(),
                    next.as_str()
                )));
            }
        }

        let mut updated = current;
        if let Some(status) = patch.status {
            updated.status = status;
        }
        if let Some(unit) = &patch.assigned_unit {
            updated.assigned_unit = Some(unit.clone());
        }
        if let Some(priority) = patch.priority {
            updated.priority = priority;
        }
        if let Some(pointer) = &patch.efir_pointer {
            updated.efir_pointer = Some(pointer.clone());
        }
        if let Some(hash) = &patch.efir_hash {
            updated.efir_hash = Some(hash.clone());
        }
        if let Some(tx_id) = &patch.ledger_tx_id {
            updated.ledger_tx_id = Some(tx_id.clone());
        }
        updated.updated_at = now;

        tx.execute(
            "UPDATE incidents SET priority = ?1, assigned_unit = ?2, efir_pointer = ?3, \
             efir_hash = ?4, ledger_tx_id = ?5, status = ?6, updated_at = ?7 \
             WHERE incident_id = ?8",
            params![
                updated.priority,
                updated.assigned_unit,
                updated.efir_pointer,
                updated.efir_hash,
                updated.ledger_tx_id,
                updated.status.as_str(),
                to_micros(now),
                incident_id,
            ],
        )?;

        tx.commit()?;
        Ok(updated)
    }
}
