//! Ledger gateway backends

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{LedgerOp, TxId};

/// Gateway acknowledgement of an accepted submission
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub tx_id: TxId,
    pub raw_response: Option<String>,
}

/// A confirmation observed for a previously submitted transaction
#[derive(Debug, Clone)]
pub struct GatewayConfirmation {
    pub tx_id: TxId,
    pub block_ref: String,
    pub confirmed_at: DateTime<Utc>,
    /// Raw gateway message, kept on the transaction row for audit
    pub raw: Option<String>,
}

/// Submission side of a ledger gateway. Confirmations arrive separately
/// on the channel handed out when the gateway was built.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn submit(&self, op: LedgerOp, target_id: &str, payload_hash: &str)
        -> Result<SubmitReceipt>;
}

/// Self-confirming gateway for environments without a live ledger.
///
/// Every submission is accepted immediately and confirmed after a fixed
/// delay by a one-shot background task. Block numbers count up
/// monotonically per gateway instance.
pub struct SimulatedGateway {
    confirm_delay: Duration,
    confirm_tx: mpsc::Sender<GatewayConfirmation>,
    next_block: Arc<AtomicU64>,
}

impl SimulatedGateway {
    pub fn new(confirm_delay: Duration) -> (Self, mpsc::Receiver<GatewayConfirmation>) {
        let (confirm_tx, confirm_rx) = mpsc::channel(64);
        let gateway = Self {
            confirm_delay,
            confirm_tx,
            next_block: Arc::new(AtomicU64::new(1)),
        };
        (gateway, confirm_rx)
    }
}

#[async_trait]
impl LedgerGateway for SimulatedGateway {
    async fn submit(
        &self,
        op: LedgerOp,
        target_id: &str,
        payload_hash: &str,
    ) -> Result<SubmitReceipt> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let tx_id = format!("mock_tx_{}", &token[..16]);
        let block_no = self.next_block.fetch_add(1, Ordering::Relaxed);

        let raw = serde_json::json!({
            "tx_id": tx_id,
            "op_type": op.as_str(),
            "target_id": target_id,
            "payload_hash": payload_hash,
            "simulated": true,
        })
        .to_string();

        debug!("Accepted {} for {} as {}", op.as_str(), target_id, tx_id);

        let confirm_tx = self.confirm_tx.clone();
        let delay = self.confirm_delay;
        let pending_tx_id = tx_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let confirmation = GatewayConfirmation {
                tx_id: pending_tx_id,
                block_ref: format!("block_{}", block_no),
                confirmed_at: Utc::now(),
                raw: None,
            };
            if confirm_tx.send(confirmation).await.is_err() {
                warn!("Confirmation channel closed before simulated confirm could land");
            }
        });

        Ok(SubmitReceipt {
            tx_id,
            raw_response: Some(raw),
        })
    }
}

#[derive(Debug, Deserialize)]
struct GatewayAccepted {
    tx_id: String,
}

/// Forwards submissions to a ledger gateway service over HTTP.
/// Confirmations for this gateway arrive on the WebSocket listener.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            request_timeout,
        }
    }
}

#[async_trait]
impl LedgerGateway for HttpGateway {
    async fn submit(
        &self,
        op: LedgerOp,
        target_id: &str,
        payload_hash: &str,
    ) -> Result<SubmitReceipt> {
        let url = format!("{}/transactions", self.base_url);
        let body = serde_json::json!({
            "op_type": op.as_str(),
            "target_id": target_id,
            "payload_hash": payload_hash,
        });

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if status.is_server_error() {
                return Err(Error::Unavailable(format!(
                    "Gateway rejected submission with {}: {}",
                    status, text
                )));
            }
            return Err(Error::InvalidArgument(format!(
                "Gateway rejected submission with {}: {}",
                status, text
            )));
        }

        let accepted: GatewayAccepted = serde_json::from_str(&text)
            .map_err(|e| Error::Internal(format!("Bad gateway response: {}", e)))?;

        Ok(SubmitReceipt {
            tx_id: accepted.tx_id,
            raw_response: Some(text),
        })
    }
}
