//! Confirmation intake
//!
//! One task drains gateway confirmations, persists each write-once, and
//! publishes `ledger.tx.confirmed`. In bridged mode a second task feeds
//! that channel from the gateway's WebSocket event stream, reconnecting
//! when the stream drops.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::error::Error;
use crate::model::TxConfirmed;
use crate::store::IncidentStore;

use super::gateway::GatewayConfirmation;

/// Persist and publish confirmations until the channel closes.
pub fn spawn_confirmation_task(
    store: IncidentStore,
    bus: EventBus,
    mut confirm_rx: mpsc::Receiver<GatewayConfirmation>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(confirmation) = confirm_rx.recv().await {
            handle_confirmation(&store, &bus, confirmation);
        }
        debug!("Confirmation channel closed, intake task exiting");
    })
}

fn handle_confirmation(store: &IncidentStore, bus: &EventBus, confirmation: GatewayConfirmation) {
    let GatewayConfirmation {
        tx_id,
        block_ref,
        confirmed_at,
        raw,
    } = confirmation;

    match store.confirm_ledger_tx(&tx_id, confirmed_at, &block_ref, raw.as_deref()) {
        Ok(tx) => {
            info!("Transaction {} confirmed in {}", tx_id, block_ref);
            bus.publish(BusEvent::TxConfirmed(TxConfirmed {
                tx_id: tx.tx_id,
                op_type: tx.op_type,
                target_id: tx.target_id,
                block_ref,
                confirmed_at,
            }));
        }
        Err(Error::Conflict(_)) => {
            warn!("Duplicate confirmation for transaction {} ignored", tx_id);
        }
        Err(Error::NotFound(_)) => {
            warn!("Confirmation for unknown transaction {} ignored", tx_id);
        }
        Err(e) => {
            error!("Failed to record confirmation for {}: {}", tx_id, e);
        }
    }
}

/// WebSocket listener settings (bridged mode)
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub ws_url: String,
    pub reconnect_delay: Duration,
    /// 0 means retry forever
    pub max_reconnect_attempts: u32,
}

/// Stream confirmation events from the gateway WebSocket into
/// `confirm_tx`, reconnecting with a fixed delay when the stream drops.
pub fn spawn_gateway_listener(
    config: ListenerConfig,
    confirm_tx: mpsc::Sender<GatewayConfirmation>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut attempts: u32 = 0;
        loop {
            match connect_async(config.ws_url.as_str()).await {
                Ok((stream, _)) => {
                    info!("Connected to ledger gateway at {}", config.ws_url);
                    attempts = 0;
                    let (_write, mut read) = stream.split();
                    while let Some(message) = read.next().await {
                        match message {
                            Ok(Message::Text(text)) => {
                                if let Some(confirmation) = parse_confirmation(&text) {
                                    if confirm_tx.send(confirmation).await.is_err() {
                                        debug!("Confirmation channel closed, listener exiting");
                                        return;
                                    }
                                }
                            }
                            Ok(Message::Close(_)) => {
                                warn!("Gateway closed the confirmation stream");
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Confirmation stream error: {}", e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Cannot reach ledger gateway at {}: {}", config.ws_url, e);
                }
            }

            attempts += 1;
            if config.max_reconnect_attempts > 0 && attempts >= config.max_reconnect_attempts {
                error!("Giving up on gateway confirmations after {} attempts", attempts);
                return;
            }
            tokio::time::sleep(config.reconnect_delay).await;
        }
    })
}

/// Parse one gateway event. Returns `None` for anything that is not a
/// confirmation.
fn parse_confirmation(text: &str) -> Option<GatewayConfirmation> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!("Ignoring non-JSON gateway message: {}", e);
            return None;
        }
    };

    let kind = value
        .get("type")
        .or_else(|| value.get("event"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if kind != "tx_confirmed" && kind != "confirmation" {
        return None;
    }

    let tx_id = value.get("tx_id").and_then(|v| v.as_str())?.to_string();

    // Gateways disagree on the block field: some send a numeric height,
    // some an opaque reference string.
    let block_ref = match value.get("block_ref").or_else(|| value.get("block_no")) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => format!("block_{}", n),
        _ => return None,
    };

    let confirmed_at = value
        .get("confirmed_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(GatewayConfirmation {
        tx_id,
        block_ref,
        confirmed_at,
        raw: Some(text.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_confirmation_with_string_block_ref() {
        let confirmation = parse_confirmation(
            r#"{"type":"tx_confirmed","tx_id":"tx-9","block_ref":"0xabc123","confirmed_at":"2026-08-24T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(confirmation.tx_id, "tx-9");
        assert_eq!(confirmation.block_ref, "0xabc123");
        assert_eq!(
            confirmation.confirmed_at,
            DateTime::parse_from_rfc3339("2026-08-24T10:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_parses_numeric_block_height() {
        let confirmation = parse_confirmation(
            r#"{"event":"confirmation","tx_id":"tx-3","block_no":42}"#,
        )
        .unwrap();
        assert_eq!(confirmation.block_ref, "block_42");
        assert!(confirmation.raw.is_some());
    }

    #[test]
    fn test_ignores_non_confirmation_events() {
        assert!(parse_confirmation(r#"{"type":"heartbeat"}"#).is_none());
        assert!(parse_confirmation(r#"{"type":"tx_confirmed","block_no":1}"#).is_none());
        assert!(parse_confirmation(r#"{"type":"tx_confirmed","tx_id":"tx-1"}"#).is_none());
        assert!(parse_confirmation("not json at all").is_none());
    }
}
