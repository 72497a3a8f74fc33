//! HTTP API
//!
//! Thin handlers over the coordinator, store, and bridge. Request and
//! response shapes live next to their handlers in [`routes`].

mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{Error, Result};
use crate::ingest::IngestionCoordinator;
use crate::ledger::LedgerBridge;
use crate::store::IncidentStore;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: IncidentStore,
    pub coordinator: Arc<IngestionCoordinator>,
    pub bridge: LedgerBridge,
    pub started_at: DateTime<Utc>,
    pub ledger_mode: String,
    pub host: String,
}

/// Build the router with all API routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Alert ingestion
        .route("/alerts/sos", post(routes::submit_alert))
        .route("/alerts", get(routes::list_alerts))
        .route("/alerts/:alert_id", get(routes::get_alert))
        // Incident management
        .route("/incidents", get(routes::list_incidents))
        .route(
            "/incidents/:incident_id",
            get(routes::get_incident).put(routes::update_incident),
        )
        .route("/incidents/:incident_id/efir", post(routes::generate_efir))
        // Ledger transactions
        .route("/transactions", get(routes::list_transactions))
        .route("/transactions/:tx_id", get(routes::get_transaction))
        // Health
        .route("/health", get(routes::health))
        .with_state(state)
}

/// Bind and serve the API on `port`.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let router = create_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Unavailable(format!("Cannot bind {}: {}", addr, e)))?;
    info!("HTTP API listening on {}", addr);
    axum::serve(listener, router)
        .await
        .map_err(|e| Error::Internal(format!("HTTP server error: {}", e)))?;
    Ok(())
}
