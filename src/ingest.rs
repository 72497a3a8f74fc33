//! Ingestion pipeline
//!
//! Every alert lands here first: persist, announce, attempt correlation,
//! settle the alert's final status. Cluster races are absorbed inside
//! this module; a well-formed alert is always saved and never bounced
//! back to the caller because two workers collided.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::cluster::ClusterEngine;
use crate::error::{Error, Result};
use crate::evidence::{self, EvidenceArchive};
use crate::ledger::{LedgerBridge, LedgerMeta};
use crate::model::{
    Alert, AlertCreated, Incident, IncidentCreated, IncidentPatch, IncidentStatus,
    LedgerTransaction, NewAlert, TxId,
};
use crate::store::IncidentStore;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// What ingestion did with one alert
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// The stored alert in its settled state
    pub alert: Alert,
    /// False when the alert_id had been seen before
    pub created: bool,
    /// Present when this alert's arrival completed a cluster
    pub incident: Option<Incident>,
}

/// Response payload for a generated evidence document
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceReceipt {
    pub incident_id: String,
    pub efir_pointer: String,
    pub efir_hash: String,
    pub tx_id: TxId,
}

pub struct IngestionCoordinator {
    store: IncidentStore,
    engine: ClusterEngine,
    bus: EventBus,
    bridge: LedgerBridge,
    archive: EvidenceArchive,
}

impl IngestionCoordinator {
    pub fn new(
        store: IncidentStore,
        engine: ClusterEngine,
        bus: EventBus,
        bridge: LedgerBridge,
        archive: EvidenceArchive,
    ) -> Self {
        Self {
            store,
            engine,
            bus,
            bridge,
            archive,
        }
    }

    /// Ingest one alert end to end: save, publish `alert.created`, try to
    /// correlate, and settle the alert as processed or escalated.
    pub async fn ingest_alert(&self, new: &NewAlert) -> Result<IngestOutcome> {
        if new.alert_id.trim().is_empty() {
            return Err(Error::InvalidArgument("alert_id must not be empty".to_string()));
        }

        let (alert, created) = self.save_with_retry(new).await?;
        if !created {
            debug!("Alert {} replayed, returning stored state", alert.alert_id);
            return Ok(IngestOutcome {
                alert,
                created: false,
                incident: None,
            });
        }

        self.bus
            .publish(BusEvent::AlertCreated(AlertCreated::from(&alert)));

        let incident = if alert.has_coordinates() {
            self.try_escalate(&alert).await?
        } else {
            debug!("Alert {} has no coordinates, skipping correlation", alert.alert_id);
            None
        };

        // No-op for alerts the commit just escalated.
        self.store.mark_alert_processed(&alert.alert_id)?;

        let settled = self.store.get_alert(&alert.alert_id)?.ok_or_else(|| {
            Error::Internal(format!("Alert {} vanished after ingestion", alert.alert_id))
        })?;

        Ok(IngestOutcome {
            alert: settled,
            created: true,
            incident,
        })
    }

    async fn save_with_retry(&self, new: &NewAlert) -> Result<(Alert, bool)> {
        let mut backoff = BACKOFF_BASE;
        let mut attempt = 1;
        loop {
            match self.store.save_alert(new, Utc::now()) {
                Ok(saved) => return Ok(saved),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!("Alert save attempt {} failed, retrying: {}", attempt, e);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One correlation attempt plus a single retry with a fresh snapshot
    /// when another commit wins the race.
    async fn try_escalate(&self, alert: &Alert) -> Result<Option<Incident>> {
        match self.correlate_and_commit(alert).await {
            Ok(outcome) => Ok(outcome),
            Err(Error::ClusterRace(reason)) => {
                warn!(
                    "Cluster commit for alert {} raced ({}), retrying with a fresh snapshot",
                    alert.alert_id, reason
                );
                match self.correlate_and_commit(alert).await {
                    Ok(outcome) => Ok(outcome),
                    Err(Error::ClusterRace(reason)) => {
                        debug!(
                            "Retry for alert {} raced again ({}), leaving it unescalated",
                            alert.alert_id, reason
                        );
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn correlate_and_commit(&self, alert: &Alert) -> Result<Option<Incident>> {
        let window = ChronoDuration::minutes(self.engine.config().window_minutes);
        let since = Utc::now() - window;
        let candidates = self.store.recent_unescalated_alerts(since)?;

        let members = match self.engine.correlate(alert, &candidates) {
            Some(members) => members,
            None => return Ok(None),
        };

        let incident = self.store.create_incident_with_members(
            &members,
            self.engine.config().threshold,
            Utc::now(),
        )?;

        self.bus.publish(BusEvent::IncidentCreated(IncidentCreated {
            incident_id: incident.incident_id.clone(),
            alert_ids: incident.alert_ids.clone(),
            priority: incident.priority,
            created_at: incident.created_at,
        }));
        info!(
            "Alert {} escalated into incident {} with {} members",
            alert.alert_id,
            incident.incident_id,
            incident.alert_ids.len()
        );

        Ok(Some(incident))
    }

    /// Compose the e-FIR for an incident, archive it, and anchor its hash
    /// on the ledger. The pending transaction reference is persisted on
    /// the incident immediately, so a crash before confirmation cannot
    /// lose the linkage.
    pub async fn generate_evidence(&self, incident_id: &str) -> Result<EvidenceReceipt> {
        let incident = self
            .store
            .get_incident(incident_id)?
            .ok_or_else(|| Error::NotFound(format!("Incident {} not found", incident_id)))?;

        if incident.status == IncidentStatus::Closed {
            return Err(Error::Conflict(format!(
                "Incident {} is closed and immutable",
                incident_id
            )));
        }

        let mut members = Vec::with_capacity(incident.alert_ids.len());
        for alert_id in &incident.alert_ids {
            let alert = self.store.get_alert(alert_id)?.ok_or_else(|| {
                Error::Internal(format!(
                    "Member alert {} of incident {} is missing",
                    alert_id, incident_id
                ))
            })?;
            members.push(alert);
        }

        let generated_at = Utc::now();
        let document = evidence::compose(&incident, &members, generated_at);

        let pointer = self.archive.put(incident_id, &document.bytes).await?;

        self.store.update_incident(
            incident_id,
            &IncidentPatch {
                efir_pointer: Some(pointer.clone()),
                efir_hash: Some(document.sha256_hex.clone()),
                ..Default::default()
            },
            Utc::now(),
        )?;

        let meta = LedgerMeta::AnchorEvidence {
            incident_id: incident_id.to_string(),
        };
        let tx = self.submit_with_retry(&meta, &document.sha256_hex).await?;

        self.store.update_incident(
            incident_id,
            &IncidentPatch {
                ledger_tx_id: Some(tx.tx_id.clone()),
                ..Default::default()
            },
            Utc::now(),
        )?;

        info!(
            "Evidence {} anchored for incident {} as transaction {}",
            pointer, incident_id, tx.tx_id
        );

        Ok(EvidenceReceipt {
            incident_id: incident_id.to_string(),
            efir_pointer: pointer,
            efir_hash: document.sha256_hex,
            tx_id: tx.tx_id,
        })
    }

    async fn submit_with_retry(
        &self,
        meta: &LedgerMeta,
        payload_hash: &str,
    ) -> Result<LedgerTransaction> {
        let mut backoff = BACKOFF_BASE;
        let mut attempt = 1;
        loop {
            match self.bridge.submit(meta, payload_hash).await {
                Ok(tx) => return Ok(tx),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!("Ledger submission attempt {} failed, retrying: {}", attempt, e);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
