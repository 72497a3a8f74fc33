//! Alert persistence

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Alert, AlertSource, AlertStatus, NewAlert};

use super::{bad_column, from_micros, to_micros, IncidentStore};

const ALERT_COLUMNS: &str = "alert_id, digital_id, tourist_id, lat, lng, timestamp, source, \
                             media_refs, status, incident_id, created_at";

fn alert_from_row(row: &Row) -> rusqlite::Result<Alert> {
    let source_text: String = row.get(6)?;
    let source = AlertSource::parse(&source_text)
        .ok_or_else(|| bad_column(format!("Unknown alert source: {}", source_text)))?;

    let media_json: String = row.get(7)?;
    let media_refs: Vec<String> = serde_json::from_str(&media_json)
        .map_err(|e| bad_column(format!("Bad media_refs JSON: {}", e)))?;

    let status_text: String = row.get(8)?;
    let status = AlertStatus::parse(&status_text)
        .ok_or_else(|| bad_column(format!("Unknown alert status: {}", status_text)))?;

    Ok(Alert {
        alert_id: row.get(0)?,
        digital_id: row.get(1)?,
        tourist_id: row.get(2)?,
        lat: row.get(3)?,
        lng: row.get(4)?,
        timestamp: from_micros(row.get(5)?)?,
        source,
        media_refs,
        status,
        incident_id: row.get(9)?,
        created_at: from_micros(row.get(10)?)?,
    })
}

impl IncidentStore {
    /// Idempotent insert keyed on `alert_id`. Returns the stored alert and
    /// whether this call created it; a replayed identifier returns the
    /// original row untouched.
    pub fn save_alert(&self, new: &NewAlert, now: DateTime<Utc>) -> Result<(Alert, bool)> {
        let conn = self.conn()?;

        // Check and insert under the same guard, so concurrent duplicates
        // converge on one row.
        if let Some(existing) = Self::get_alert_inner(&conn, &new.alert_id)? {
            debug!("Alert {} already stored, returning existing row", new.alert_id);
            return Ok((existing, false));
        }

        let media_json = serde_json::to_string(&new.media_refs)
            .map_err(|e| Error::Internal(format!("Cannot encode media_refs: {}", e)))?;

        conn.execute(
            "INSERT INTO alerts (alert_id, digital_id, tourist_id, lat, lng, timestamp, source, \
             media_refs, status, incident_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10)",
            params![
                new.alert_id,
                new.digital_id,
                new.tourist_id,
                new.lat,
                new.lng,
                to_micros(new.timestamp),
                new.source.as_str(),
                media_json,
                AlertStatus::Received.as_str(),
                to_micros(now),
            ],
        )?;

        let alert = Self::get_alert_inner(&conn, &new.alert_id)?
            .ok_or_else(|| Error::Internal(format!("Alert {} vanished after insert", new.alert_id)))?;
        Ok((alert, true))
    }

    pub fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>> {
        let conn = self.conn()?;
        Self::get_alert_inner(&conn, alert_id)
    }

    pub(super) fn get_alert_inner(conn: &Connection, alert_id: &str) -> Result<Option<Alert>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM alerts WHERE alert_id = ?1",
            ALERT_COLUMNS
        ))?;
        match stmt.query_row(params![alert_id], alert_from_row) {
            Ok(alert) => Ok(Some(alert)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Newest first, for listings.
    pub fn list_alerts(&self, limit: usize, offset: usize) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM alerts ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            ALERT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], alert_from_row)?;

        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?);
        }
        Ok(alerts)
    }

    /// Snapshot for the clustering scan: alerts captured at or after
    /// `since` that no incident has claimed, in ascending alert_id order
    /// so the scan is reproducible.
    pub fn recent_unescalated_alerts(&self, since: DateTime<Utc>) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM alerts WHERE timestamp >= ?1 AND incident_id IS NULL \
             ORDER BY alert_id ASC",
            ALERT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![to_micros(since)], alert_from_row)?;

        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?);
        }
        Ok(alerts)
    }

    /// Settle a `received` alert as `processed`. Already-escalated alerts
    /// are left untouched.
    pub fn mark_alert_processed(&self, alert_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE alerts SET status = ?1 WHERE alert_id = ?2 AND status = ?3",
            params![
                AlertStatus::Processed.as_str(),
                alert_id,
                AlertStatus::Received.as_str(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> IncidentStore {
        IncidentStore::open(dir.path().join("alerts.db")).unwrap()
    }

    fn sample(id: &str) -> NewAlert {
        NewAlert {
            alert_id: id.to_string(),
            digital_id: Some("did-1".to_string()),
            tourist_id: Some("t-1".to_string()),
            lat: Some(19.0760),
            lng: Some(72.8777),
            timestamp: Utc::now(),
            source: AlertSource::App,
            media_refs: vec!["s3://bucket/clip.mp4".to_string()],
        }
    }

    #[test]
    fn test_save_and_fetch_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let (saved, created) = store.save_alert(&sample("a-1"), Utc::now()).unwrap();
        assert!(created);
        assert_eq!(saved.status, AlertStatus::Received);
        assert!(saved.incident_id.is_none());

        let fetched = store.get_alert("a-1").unwrap().unwrap();
        assert_eq!(fetched.alert_id, "a-1");
        assert_eq!(fetched.lat, Some(19.0760));
        assert_eq!(fetched.media_refs, vec!["s3://bucket/clip.mp4"]);
    }

    #[test]
    fn test_replayed_id_returns_original_row() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.save_alert(&sample("a-1"), Utc::now()).unwrap();

        let mut replay = sample("a-1");
        replay.lat = Some(48.8566);
        replay.digital_id = Some("did-other".to_string());
        let (row, created) = store.save_alert(&replay, Utc::now()).unwrap();

        assert!(!created);
        assert_eq!(row.lat, Some(19.0760));
        assert_eq!(row.digital_id.as_deref(), Some("did-1"));
    }

    #[test]
    fn test_mark_processed_only_touches_received() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.save_alert(&sample("a-1"), Utc::now()).unwrap();
        store.mark_alert_processed("a-1").unwrap();
        assert_eq!(
            store.get_alert("a-1").unwrap().unwrap().status,
            AlertStatus::Processed
        );

        // A second pass is a no-op, not an error.
        store.mark_alert_processed("a-1").unwrap();
        assert_eq!(
            store.get_alert("a-1").unwrap().unwrap().status,
            AlertStatus::Processed
        );
    }

    #[test]
    fn test_snapshot_is_window_filtered_and_ordered() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut stale = sample("a-0");
        stale.timestamp = Utc::now() - chrono::Duration::hours(3);
        store.save_alert(&stale, Utc::now()).unwrap();

        // Saved out of id order on purpose.
        store.save_alert(&sample("a-2"), Utc::now()).unwrap();
        store.save_alert(&sample("a-1"), Utc::now()).unwrap();

        let since = Utc::now() - chrono::Duration::hours(2);
        let snapshot = store.recent_unescalated_alerts(since).unwrap();
        let ids: Vec<&str> = snapshot.iter().map(|a| a.alert_id.as_str()).collect();
        assert_eq!(ids, vec!["a-1", "a-2"]);
    }
}
