//! Domain records for the correlation pipeline
//!
//! Field names match the wire vocabulary the mobile clients and gateway
//! adapters already speak, so JSON consumers see familiar shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-supplied alert identifier, the idempotency key for ingestion
pub type AlertId = String;

/// System-generated incident identifier
pub type IncidentId = String;

/// Ledger transaction identifier, assigned by the gateway
pub type TxId = String;

//=============================================================================
// ALERTS
//=============================================================================

/// Channel an alert arrived through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    /// Mobile application
    App,
    /// SMS gateway adapter
    Sms,
    /// IoT device (wearable, panic button)
    Iot,
}

impl AlertSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSource::App => "app",
            AlertSource::Sms => "sms",
            AlertSource::Iot => "iot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "app" => Some(AlertSource::App),
            "sms" => Some(AlertSource::Sms),
            "iot" => Some(AlertSource::Iot),
            _ => None,
        }
    }
}

/// Alert lifecycle. `Escalated` means folded into an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Received,
    Processed,
    Escalated,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Received => "received",
            AlertStatus::Processed => "processed",
            AlertStatus::Escalated => "escalated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(AlertStatus::Received),
            "processed" => Some(AlertStatus::Processed),
            "escalated" => Some(AlertStatus::Escalated),
            _ => None,
        }
    }
}

/// A single reported distress signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Caller-generated identifier, unique per alert
    pub alert_id: AlertId,
    /// Reporting entity (device/app identity), if known
    pub digital_id: Option<String>,
    /// Subject the alert concerns, if known
    pub tourist_id: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Capture time supplied by the caller; drives the clustering window
    pub timestamp: DateTime<Utc>,
    pub source: AlertSource,
    #[serde(default)]
    pub media_refs: Vec<String>,
    pub status: AlertStatus,
    /// Set once, by the incident commit that escalates this alert
    pub incident_id: Option<IncidentId>,
    /// Receipt time, set by the store
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Only alerts with both coordinates take part in clustering.
    pub fn has_coordinates(&self) -> bool {
        self.lat.is_some() && self.lng.is_some()
    }
}

/// Inbound alert submission, before the store assigns lifecycle fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    pub alert_id: AlertId,
    #[serde(default)]
    pub digital_id: Option<String>,
    #[serde(default)]
    pub tourist_id: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub source: AlertSource,
    #[serde(default)]
    pub media_refs: Vec<String>,
}

//=============================================================================
// INCIDENTS
//=============================================================================

/// Incident lifecycle, forward-only. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Received,
    Acknowledged,
    Dispatched,
    Resolved,
    Closed,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Received => "received",
            IncidentStatus::Acknowledged => "acknowledged",
            IncidentStatus::Dispatched => "dispatched",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(IncidentStatus::Received),
            "acknowledged" => Some(IncidentStatus::Acknowledged),
            "dispatched" => Some(IncidentStatus::Dispatched),
            "resolved" => Some(IncidentStatus::Resolved),
            "closed" => Some(IncidentStatus::Closed),
            _ => None,
        }
    }
}

/// A correlated group of alerts treated as one real-world event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: IncidentId,
    /// Member alerts in escalation order. Never empty.
    pub alert_ids: Vec<AlertId>,
    /// Starts at member count; operators may raise it
    pub priority: u32,
    pub assigned_unit: Option<String>,
    /// Archive key of the composed evidence document
    pub efir_pointer: Option<String>,
    /// SHA-256 of the composed evidence document
    pub efir_hash: Option<String>,
    pub ledger_tx_id: Option<TxId>,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    /// Fresh incident over the given members, status `received`,
    /// priority = member count.
    pub fn new(alert_ids: Vec<AlertId>, now: DateTime<Utc>) -> Self {
        let priority = alert_ids.len() as u32;
        Self {
            incident_id: uuid::Uuid::new_v4().to_string(),
            alert_ids,
            priority,
            assigned_unit: None,
            efir_pointer: None,
            efir_hash: None,
            ledger_tx_id: None,
            status: IncidentStatus::Received,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for mutable incident fields. `None` leaves a field alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentPatch {
    #[serde(default)]
    pub status: Option<IncidentStatus>,
    #[serde(default)]
    pub assigned_unit: Option<String>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub efir_pointer: Option<String>,
    #[serde(default)]
    pub efir_hash: Option<String>,
    #[serde(default)]
    pub ledger_tx_id: Option<TxId>,
}

//=============================================================================
// LEDGER TRANSACTIONS
//=============================================================================

/// Operations the ledger recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOp {
    /// Anchor an evidence document hash
    AnchorEvidence,
    /// Record an incident's existence
    RecordIncident,
    /// Issue a digital identity
    IssueIdentity,
    /// Append an audit log entry
    AppendAudit,
}

impl LedgerOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerOp::AnchorEvidence => "anchor_evidence",
            LedgerOp::RecordIncident => "record_incident",
            LedgerOp::IssueIdentity => "issue_identity",
            LedgerOp::AppendAudit => "append_audit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "anchor_evidence" => Some(LedgerOp::AnchorEvidence),
            "record_incident" => Some(LedgerOp::RecordIncident),
            "issue_identity" => Some(LedgerOp::IssueIdentity),
            "append_audit" => Some(LedgerOp::AppendAudit),
            _ => None,
        }
    }
}

/// Local record of one ledger submission and its confirmation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub tx_id: TxId,
    pub op_type: LedgerOp,
    /// Entity the operation concerns (incident, identity, audit entry)
    pub target_id: String,
    pub payload_hash: String,
    pub submitted_at: DateTime<Utc>,
    /// Write-once: never overwritten after first confirmation
    pub confirmed_at: Option<DateTime<Utc>>,
    pub block_ref: Option<String>,
    /// Opaque gateway response, kept for audit
    pub raw_response: Option<String>,
}

impl LedgerTransaction {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }
}

//=============================================================================
// EVENT PAYLOADS
//=============================================================================

/// Payload for the `alert.created` topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCreated {
    pub alert_id: AlertId,
    pub digital_id: Option<String>,
    pub tourist_id: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub source: AlertSource,
    pub media_refs: Vec<String>,
}

impl From<&Alert> for AlertCreated {
    fn from(alert: &Alert) -> Self {
        Self {
            alert_id: alert.alert_id.clone(),
            digital_id: alert.digital_id.clone(),
            tourist_id: alert.tourist_id.clone(),
            lat: alert.lat,
            lng: alert.lng,
            timestamp: alert.timestamp,
            source: alert.source,
            media_refs: alert.media_refs.clone(),
        }
    }
}

/// Payload for the `incident.created` topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentCreated {
    pub incident_id: IncidentId,
    pub alert_ids: Vec<AlertId>,
    pub priority: u32,
    pub created_at: DateTime<Utc>,
}

/// Payload for the `ledger.tx.confirmed` topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxConfirmed {
    pub tx_id: TxId,
    pub op_type: LedgerOp,
    pub target_id: String,
    pub block_ref: String,
    pub confirmed_at: DateTime<Utc>,
}
