//! Submission front door and confirmation queries

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::error::{Error, Result};
use crate::evidence::hash::is_sha256_hex;
use crate::model::{LedgerOp, LedgerTransaction, TxConfirmed};
use crate::store::IncidentStore;

use super::gateway::LedgerGateway;

/// What a ledger operation is about. Each variant carries the identifier
/// of the entity the operation targets.
#[derive(Debug, Clone)]
pub enum LedgerMeta {
    AnchorEvidence { incident_id: String },
    RecordIncident { incident_id: String },
    IssueIdentity { digital_id: String },
    AppendAudit { entry_id: String },
}

impl LedgerMeta {
    pub fn op(&self) -> LedgerOp {
        match self {
            LedgerMeta::AnchorEvidence { .. } => LedgerOp::AnchorEvidence,
            LedgerMeta::RecordIncident { .. } => LedgerOp::RecordIncident,
            LedgerMeta::IssueIdentity { .. } => LedgerOp::IssueIdentity,
            LedgerMeta::AppendAudit { .. } => LedgerOp::AppendAudit,
        }
    }

    pub fn target_id(&self) -> &str {
        match self {
            LedgerMeta::AnchorEvidence { incident_id } => incident_id,
            LedgerMeta::RecordIncident { incident_id } => incident_id,
            LedgerMeta::IssueIdentity { digital_id } => digital_id,
            LedgerMeta::AppendAudit { entry_id } => entry_id,
        }
    }
}

/// Confirmation state of a submitted transaction
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed {
        confirmed_at: DateTime<Utc>,
        block_ref: String,
    },
}

#[derive(Clone)]
pub struct LedgerBridge {
    gateway: Arc<dyn LedgerGateway>,
    store: IncidentStore,
    bus: EventBus,
}

impl LedgerBridge {
    pub fn new(gateway: Arc<dyn LedgerGateway>, store: IncidentStore, bus: EventBus) -> Self {
        Self { gateway, store, bus }
    }

    /// Validate and submit one operation, recording it locally as pending.
    /// The hash format is checked before any network traffic.
    pub async fn submit(&self, meta: &LedgerMeta, payload_hash: &str) -> Result<LedgerTransaction> {
        if !is_sha256_hex(payload_hash) {
            return Err(Error::InvalidArgument(format!(
                "Payload hash must be 64 lowercase hex characters, got {:?}",
                payload_hash
            )));
        }

        let op = meta.op();
        let receipt = self
            .gateway
            .submit(op, meta.target_id(), payload_hash)
            .await?;

        let tx = LedgerTransaction {
            tx_id: receipt.tx_id,
            op_type: op,
            target_id: meta.target_id().to_string(),
            payload_hash: payload_hash.to_string(),
            submitted_at: Utc::now(),
            confirmed_at: None,
            block_ref: None,
            raw_response: receipt.raw_response,
        };
        self.store.record_ledger_tx(&tx)?;

        info!(
            "Submitted {} for {} as transaction {}",
            op.as_str(),
            tx.target_id,
            tx.tx_id
        );
        Ok(tx)
    }

    /// Confirmation state of a transaction, straight from storage.
    pub fn get_status(&self, tx_id: &str) -> Result<TxStatus> {
        let tx = self
            .store
            .get_ledger_tx(tx_id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {} not found", tx_id)))?;
        match (tx.confirmed_at, tx.block_ref) {
            (Some(confirmed_at), Some(block_ref)) => Ok(TxStatus::Confirmed {
                confirmed_at,
                block_ref,
            }),
            _ => Ok(TxStatus::Pending),
        }
    }

    /// Wait for `tx_id` to confirm, for at most `wait`. Returns `None` on
    /// expiry; the transaction stays pending and can be polled later via
    /// [`LedgerBridge::get_status`].
    ///
    /// Watches the bus rather than polling storage. One storage read after
    /// subscribing covers transactions that confirmed before the call.
    pub async fn await_confirmation(
        &self,
        tx_id: &str,
        wait: Duration,
    ) -> Result<Option<TxConfirmed>> {
        let mut events = self.bus.subscribe();

        let tx = self
            .store
            .get_ledger_tx(tx_id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {} not found", tx_id)))?;
        if let (Some(confirmed_at), Some(block_ref)) = (tx.confirmed_at, tx.block_ref) {
            return Ok(Some(TxConfirmed {
                tx_id: tx.tx_id,
                op_type: tx.op_type,
                target_id: tx.target_id,
                block_ref,
                confirmed_at,
            }));
        }

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match timeout(remaining, events.recv()).await {
                Ok(Ok(BusEvent::TxConfirmed(confirmed))) if confirmed.tx_id == tx_id => {
                    return Ok(Some(confirmed));
                }
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    warn!("Confirmation watcher for {} lagged {} events", tx_id, missed);
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return Ok(None),
                Err(_) => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_maps_to_op_and_target() {
        let meta = LedgerMeta::AnchorEvidence {
            incident_id: "inc-1".to_string(),
        };
        assert_eq!(meta.op(), LedgerOp::AnchorEvidence);
        assert_eq!(meta.target_id(), "inc-1");

        let meta = LedgerMeta::IssueIdentity {
            digital_id: "did-9".to_string(),
        };
        assert_eq!(meta.op(), LedgerOp::IssueIdentity);
        assert_eq!(meta.target_id(), "did-9");
    }

    #[test]
    fn test_tx_status_serializes_with_tag() {
        let pending = serde_json::to_value(TxStatus::Pending).unwrap();
        assert_eq!(pending["status"], "pending");

        let confirmed = serde_json::to_value(TxStatus::Confirmed {
            confirmed_at: Utc::now(),
            block_ref: "block_3".to_string(),
        })
        .unwrap();
        assert_eq!(confirmed["status"], "confirmed");
        assert_eq!(confirmed["block_ref"], "block_3");
    }
}
