//! Ledger anchoring
//!
//! Submissions go out through a [`LedgerGateway`]; confirmations come
//! back on a channel drained by the confirmation task, which persists
//! them write-once and announces them on the event bus. The simulated
//! and bridged gateways share that contract, so everything above them
//! is mode-agnostic.

pub mod bridge;
pub mod gateway;
pub mod listener;

pub use bridge::{LedgerBridge, LedgerMeta, TxStatus};
pub use gateway::{GatewayConfirmation, HttpGateway, LedgerGateway, SimulatedGateway, SubmitReceipt};
pub use listener::{spawn_confirmation_task, spawn_gateway_listener, ListenerConfig};
