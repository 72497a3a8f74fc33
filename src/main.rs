//! vigil-node: Always-on incident correlation and evidence anchoring runtime
//!
//! This daemon receives SOS alerts from field clients (app, SMS gateway,
//! IoT devices), correlates them into incidents, and anchors e-FIR
//! evidence hashes on an external ledger. It provides:
//! - Alert ingestion with spatiotemporal clustering
//! - Incident lifecycle management for operator consoles
//! - Deterministic e-FIR composition and archival
//! - Ledger anchoring with asynchronous confirmation tracking

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use vigil_node::api::{self, AppState};
use vigil_node::bus::EventBus;
use vigil_node::cluster::ClusterEngine;
use vigil_node::config::{Config, LedgerMode};
use vigil_node::evidence::EvidenceArchive;
use vigil_node::ingest::IngestionCoordinator;
use vigil_node::ledger::{
    spawn_confirmation_task, spawn_gateway_listener, HttpGateway, LedgerBridge, LedgerGateway,
    ListenerConfig, SimulatedGateway,
};
use vigil_node::store::IncidentStore;

#[derive(Parser)]
#[command(name = "vigil-node")]
#[command(about = "Always-on incident correlation and evidence anchoring runtime")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "vigil-node.toml")]
    config: String,

    /// HTTP API port (overrides config file)
    #[arg(long, env = "VIGIL_PORT")]
    port: Option<u16>,

    /// SQLite database path (overrides config file)
    #[arg(long, env = "VIGIL_DB_PATH")]
    db_path: Option<String>,

    /// Evidence archive directory (overrides config file)
    #[arg(long, env = "VIGIL_ARCHIVE_DIR")]
    archive_dir: Option<String>,

    /// Ledger mode: simulated or bridged (overrides config file)
    #[arg(long, env = "VIGIL_LEDGER_MODE")]
    ledger_mode: Option<String>,

    /// Ledger gateway base URL for bridged mode (overrides config file)
    #[arg(long, env = "VIGIL_GATEWAY_URL")]
    gateway_url: Option<String>,

    /// Simulated confirmation delay in milliseconds (overrides config file)
    #[arg(long, env = "VIGIL_CONFIRM_DELAY_MS")]
    confirm_delay_ms: Option<u64>,

    /// Clustering radius in kilometers (overrides config file)
    #[arg(long, env = "VIGIL_CLUSTER_RADIUS_KM")]
    cluster_radius_km: Option<f64>,

    /// Clustering window in minutes (overrides config file)
    #[arg(long, env = "VIGIL_CLUSTER_WINDOW_MIN")]
    cluster_window_min: Option<i64>,

    /// Minimum cluster size that opens an incident (overrides config file)
    #[arg(long, env = "VIGIL_CLUSTER_THRESHOLD")]
    cluster_threshold: Option<usize>,

    /// Log level for this node's own spans
    #[arg(long, env = "VIGIL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("vigil_node={}", cli.log_level).parse()?),
        )
        .init();

    info!("Starting vigil-node");
    info!("Config file: {}", cli.config);

    // Load or create default config
    let mut config = if std::path::Path::new(&cli.config).exists() {
        let content = std::fs::read_to_string(&cli.config)?;
        toml::from_str::<Config>(&content)?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(port) = cli.port {
        config.api.port = port;
    }
    if let Some(db_path) = cli.db_path {
        config.storage.db_path = db_path;
    }
    if let Some(archive_dir) = cli.archive_dir {
        config.storage.archive_dir = archive_dir;
    }
    if let Some(mode) = cli.ledger_mode.as_deref() {
        config.ledger.mode = match mode {
            "simulated" => LedgerMode::Simulated,
            "bridged" => LedgerMode::Bridged,
            other => anyhow::bail!("Unknown ledger mode: {}", other),
        };
    }
    if let Some(url) = cli.gateway_url {
        config.ledger.gateway_url = url;
    }
    if let Some(ms) = cli.confirm_delay_ms {
        config.ledger.confirm_delay_ms = ms;
    }
    if let Some(km) = cli.cluster_radius_km {
        config.cluster.radius_km = km;
    }
    if let Some(minutes) = cli.cluster_window_min {
        config.cluster.window_minutes = minutes;
    }
    if let Some(size) = cli.cluster_threshold {
        config.cluster.threshold = size;
    }

    info!("Node: {}", config.node.name);
    info!("Database: {}", config.storage.db_path);
    info!("Ledger mode: {}", config.ledger.mode.as_str());

    let store = IncidentStore::open(&config.storage.db_path)?;
    let bus = EventBus::new(config.api.bus_capacity);
    let archive = EvidenceArchive::new(config.storage.archive_dir.clone()).await?;

    // Both gateway modes feed the same confirmation channel, so the rest
    // of the pipeline is mode-agnostic.
    let (gateway, confirm_rx): (Arc<dyn LedgerGateway>, _) = match config.ledger.mode {
        LedgerMode::Simulated => {
            let (gateway, confirm_rx) =
                SimulatedGateway::new(Duration::from_millis(config.ledger.confirm_delay_ms));
            (Arc::new(gateway), confirm_rx)
        }
        LedgerMode::Bridged => {
            let (confirm_tx, confirm_rx) = tokio::sync::mpsc::channel(64);
            spawn_gateway_listener(
                ListenerConfig {
                    ws_url: config.ledger.gateway_ws_url.clone(),
                    reconnect_delay: Duration::from_secs(config.ledger.reconnect_delay_secs),
                    max_reconnect_attempts: config.ledger.max_reconnect_attempts,
                },
                confirm_tx,
            );
            let gateway = HttpGateway::new(
                config.ledger.gateway_url.clone(),
                Duration::from_secs(config.ledger.request_timeout_secs),
            );
            (Arc::new(gateway), confirm_rx)
        }
    };

    spawn_confirmation_task(store.clone(), bus.clone(), confirm_rx);

    let bridge = LedgerBridge::new(gateway, store.clone(), bus.clone());
    let engine = ClusterEngine::new(config.cluster.clone());
    let coordinator = Arc::new(IngestionCoordinator::new(
        store.clone(),
        engine,
        bus.clone(),
        bridge.clone(),
        archive,
    ));

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let state = AppState {
        store,
        coordinator,
        bridge,
        started_at: chrono::Utc::now(),
        ledger_mode: config.ledger.mode.as_str().to_string(),
        host,
    };

    api::serve(state, config.api.port).await?;

    Ok(())
}
