//! API route handlers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Error;
use crate::ingest::EvidenceReceipt;
use crate::ledger::TxStatus;
use crate::model::{Alert, Incident, IncidentPatch, IncidentStatus, LedgerOp, NewAlert};

use super::AppState;

/// Map a pipeline error onto an HTTP response.
fn reject(e: Error) -> (StatusCode, String) {
    let status = match &e {
        Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::ClusterRace(_) => StatusCode::CONFLICT,
        Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

// === Alert Routes ===

#[derive(Debug, Serialize)]
pub struct SubmitAlertResponse {
    pub alert: Alert,
    pub created: bool,
    pub incident_id: Option<String>,
}

/// POST /alerts/sos
pub async fn submit_alert(
    State(state): State<AppState>,
    Json(new_alert): Json<NewAlert>,
) -> Result<Json<SubmitAlertResponse>, (StatusCode, String)> {
    let outcome = state
        .coordinator
        .ingest_alert(&new_alert)
        .await
        .map_err(reject)?;
    Ok(Json(SubmitAlertResponse {
        incident_id: outcome.alert.incident_id.clone(),
        alert: outcome.alert,
        created: outcome.created,
    }))
}

/// GET /alerts
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let alerts = state
        .store
        .list_alerts(page.limit, page.offset)
        .map_err(reject)?;
    let count = alerts.len();
    Ok(Json(json!({
        "alerts": alerts,
        "count": count,
    })))
}

/// GET /alerts/:alert_id
pub async fn get_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
) -> Result<Json<Alert>, (StatusCode, String)> {
    match state.store.get_alert(&alert_id).map_err(reject)? {
        Some(alert) => Ok(Json(alert)),
        None => Err((
            StatusCode::NOT_FOUND,
            format!("Alert {} not found", alert_id),
        )),
    }
}

// === Incident Routes ===

#[derive(Debug, Deserialize)]
pub struct IncidentQuery {
    #[serde(default)]
    pub status: Option<IncidentStatus>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

/// GET /incidents
pub async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<IncidentQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let incidents = state
        .store
        .list_incidents(query.status, query.limit, query.offset)
        .map_err(reject)?;
    let count = incidents.len();
    Ok(Json(json!({
        "incidents": incidents,
        "count": count,
    })))
}

/// GET /incidents/:incident_id
pub async fn get_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> Result<Json<Incident>, (StatusCode, String)> {
    match state.store.get_incident(&incident_id).map_err(reject)? {
        Some(incident) => Ok(Json(incident)),
        None => Err((
            StatusCode::NOT_FOUND,
            format!("Incident {} not found", incident_id),
        )),
    }
}

/// Operator-facing incident update. Evidence and ledger fields are
/// pipeline-owned and not accepted here.
#[derive(Debug, Deserialize)]
pub struct UpdateIncidentRequest {
    #[serde(default)]
    pub status: Option<IncidentStatus>,
    #[serde(default)]
    pub assigned_unit: Option<String>,
    #[serde(default)]
    pub priority: Option<u32>,
}

/// PUT /incidents/:incident_id
pub async fn update_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
    Json(request): Json<UpdateIncidentRequest>,
) -> Result<Json<Incident>, (StatusCode, String)> {
    let patch = IncidentPatch {
        status: request.status,
        assigned_unit: request.assigned_unit,
        priority: request.priority,
        ..Default::default()
    };
    let incident = state
        .store
        .update_incident(&incident_id, &patch, chrono::Utc::now())
        .map_err(reject)?;
    Ok(Json(incident))
}

/// POST /incidents/:incident_id/efir
pub async fn generate_efir(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> Result<Json<EvidenceReceipt>, (StatusCode, String)> {
    let receipt = state
        .coordinator
        .generate_evidence(&incident_id)
        .await
        .map_err(reject)?;
    Ok(Json(receipt))
}

// === Transaction Routes ===

#[derive(Debug, Deserialize)]
pub struct TxQuery {
    #[serde(default)]
    pub op_type: Option<LedgerOp>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

/// GET /transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TxQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let transactions = state
        .store
        .list_ledger_txs(query.op_type, query.target_id.as_deref(), query.limit, query.offset)
        .map_err(reject)?;
    let count = transactions.len();
    Ok(Json(json!({
        "transactions": transactions,
        "count": count,
    })))
}

/// GET /transactions/:tx_id
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(tx_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let transaction = match state.store.get_ledger_tx(&tx_id).map_err(reject)? {
        Some(tx) => tx,
        None => {
            return Err((
                StatusCode::NOT_FOUND,
                format!("Transaction {} not found", tx_id),
            ))
        }
    };
    let status = state.bridge.get_status(&tx_id).map_err(reject)?;
    let status_text = match status {
        TxStatus::Pending => "pending",
        TxStatus::Confirmed { .. } => "confirmed",
    };
    Ok(Json(json!({
        "transaction": transaction,
        "status": status_text,
    })))
}

// === Health ===

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = (chrono::Utc::now() - state.started_at).num_seconds();
    Json(json!({
        "service": "vigil-node",
        "version": env!("CARGO_PKG_VERSION"),
        "ledger_mode": state.ledger_mode,
        "uptime_seconds": uptime,
        "host": state.host,
    }))
}
