//! Node configuration
//!
//! Loaded from a TOML file at startup. Every field has a default so an
//! empty file (or no file at all) yields a working simulated-mode node.

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Human-readable node name, shown in health output
    #[serde(default = "default_node_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory evidence documents are archived under
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
}

/// How ledger submissions reach a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMode {
    /// Local simulation: transactions confirm after a fixed delay
    Simulated,
    /// Real gateway over HTTP, confirmations over WebSocket
    Bridged,
}

impl LedgerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerMode::Simulated => "simulated",
            LedgerMode::Bridged => "bridged",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_mode")]
    pub mode: LedgerMode,

    /// Gateway base URL for submissions (bridged mode)
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Gateway WebSocket URL for confirmations (bridged mode)
    #[serde(default = "default_gateway_ws_url")]
    pub gateway_ws_url: String,

    /// Simulated confirmation delay in milliseconds
    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,

    /// Per-request timeout for gateway submissions, seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Delay between WebSocket reconnect attempts, seconds
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Reconnect attempts before giving up (0 = retry forever)
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP listen port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Event bus capacity per subscriber
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

// Defaults
fn default_node_name() -> String { "vigil-node".to_string() }
fn default_db_path() -> String { "vigil.db".to_string() }
fn default_archive_dir() -> String { "efir_archive".to_string() }
fn default_ledger_mode() -> LedgerMode { LedgerMode::Simulated }
fn default_gateway_url() -> String { "http://localhost:4010".to_string() }
fn default_gateway_ws_url() -> String { "ws://localhost:4010/events".to_string() }
fn default_confirm_delay_ms() -> u64 { 2000 }
fn default_request_timeout_secs() -> u64 { 10 }
fn default_reconnect_delay_secs() -> u64 { 5 }
fn default_api_port() -> u16 { 8090 }
fn default_bus_capacity() -> usize { 1000 }

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            archive_dir: default_archive_dir(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: default_ledger_mode(),
            gateway_url: default_gateway_url(),
            gateway_ws_url: default_gateway_ws_url(),
            confirm_delay_ms: default_confirm_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_reconnect_attempts: 0,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.api.port, 8090);
        assert_eq!(config.storage.db_path, "vigil.db");
        assert_eq!(config.ledger.mode, LedgerMode::Simulated);
        assert_eq!(config.ledger.confirm_delay_ms, 2000);
        assert_eq!(config.cluster.radius_km, 2.0);
        assert_eq!(config.cluster.window_minutes, 120);
        assert_eq!(config.cluster.threshold, 3);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ledger]
            mode = "bridged"
            gateway_url = "http://ledger.example:4010"

            [cluster]
            radius_km = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger.mode, LedgerMode::Bridged);
        assert_eq!(config.ledger.gateway_url, "http://ledger.example:4010");
        assert_eq!(config.ledger.confirm_delay_ms, 2000);
        assert_eq!(config.cluster.radius_km, 0.5);
        assert_eq!(config.cluster.threshold, 3);
        assert_eq!(config.api.port, 8090);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let parsed: Result<Config, _> = toml::from_str(
            r#"
            [ledger]
            mode = "paper"
            "#,
        );
        assert!(parsed.is_err());
    }
}
