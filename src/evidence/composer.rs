//! Deterministic e-FIR composition
//!
//! The e-FIR is a plain-text document with a fixed layout. Identical
//! inputs, including the generation timestamp, always produce identical
//! bytes, so the anchored SHA-256 can be recomputed from the archived
//! copy. Re-generating later yields a new evidentiary snapshot with a
//! new hash; generation is deliberately not idempotent.

use chrono::{DateTime, Utc};

use crate::model::{Alert, Incident};

use super::hash::sha256_hex;

const RULE_HEAVY: &str = "========================================";
const RULE_LIGHT: &str = "----------------------------------------";

/// Composed e-FIR plus its anchor hash
#[derive(Debug, Clone)]
pub struct EvidenceDocument {
    pub bytes: Vec<u8>,
    pub sha256_hex: String,
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_coords(lat: Option<f64>, lng: Option<f64>) -> String {
    match (lat, lng) {
        (Some(lat), Some(lng)) => format!("{:.6}, {:.6}", lat, lng),
        _ => "N/A".to_string(),
    }
}

/// Compose the e-FIR for `incident` over its member alerts.
///
/// `generated_at` is part of the hashed bytes; the caller fixes it once
/// and reuses the same instant for archival and ledger anchoring. Member
/// blocks are laid out in ascending alert_id order regardless of the
/// slice order given.
pub fn compose(
    incident: &Incident,
    members: &[Alert],
    generated_at: DateTime<Utc>,
) -> EvidenceDocument {
    let mut sorted: Vec<&Alert> = members.iter().collect();
    sorted.sort_by(|a, b| a.alert_id.cmp(&b.alert_id));

    let mut doc = String::new();
    doc.push_str(RULE_HEAVY);
    doc.push('\n');
    doc.push_str("ELECTRONIC FIRST INFORMATION REPORT\n");
    doc.push_str(RULE_HEAVY);
    doc.push_str("\n\n");

    doc.push_str(&format!("Incident ID   : {}\n", incident.incident_id));
    doc.push_str(&format!("Status        : {}\n", incident.status.as_str()));
    doc.push_str(&format!("Priority      : {}\n", incident.priority));
    doc.push_str(&format!(
        "Assigned Unit : {}\n",
        incident.assigned_unit.as_deref().unwrap_or("Not Assigned")
    ));
    doc.push_str(&format!("Opened At     : {}\n", format_ts(incident.created_at)));
    doc.push('\n');

    doc.push_str(&format!("MEMBER ALERTS ({})\n", sorted.len()));
    doc.push_str(RULE_LIGHT);
    doc.push('\n');

    for (i, alert) in sorted.iter().enumerate() {
        doc.push_str(&format!("[{}] Alert ID    : {}\n", i + 1, alert.alert_id));
        doc.push_str(&format!(
            "    Digital ID  : {}\n",
            alert.digital_id.as_deref().unwrap_or("N/A")
        ));
        doc.push_str(&format!(
            "    Tourist ID  : {}\n",
            alert.tourist_id.as_deref().unwrap_or("N/A")
        ));
        doc.push_str(&format!(
            "    Location    : {}\n",
            format_coords(alert.lat, alert.lng)
        ));
        doc.push_str(&format!("    Source      : {}\n", alert.source.as_str()));
        doc.push_str(&format!("    Status      : {}\n", alert.status.as_str()));
        doc.push_str(&format!("    Captured At : {}\n", format_ts(alert.timestamp)));
        let media = if alert.media_refs.is_empty() {
            "None".to_string()
        } else {
            alert.media_refs.join(", ")
        };
        doc.push_str(&format!("    Media Refs  : {}\n", media));
        doc.push('\n');
    }

    doc.push_str(RULE_LIGHT);
    doc.push('\n');
    doc.push_str(&format!("Generated At  : {}\n", format_ts(generated_at)));
    doc.push_str(RULE_HEAVY);
    doc.push('\n');

    let bytes = doc.into_bytes();
    let hash = sha256_hex(&bytes);
    EvidenceDocument {
        bytes,
        sha256_hex: hash,
    }
}
