//! REST API handlers

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lighthouse_core::StoreError;
use lighthouse_discovery::{NetworkError, PresenceService, ProbeError, ScanError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }

    fn response(status: StatusCode, msg: impl Into<String>) -> Response {
        (status, Json(Self::new(msg))).into_response()
    }
}

fn store_failure(e: StoreError) -> Response {
    warn!(error = %e, "Store query failed");
    ApiError::response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn task_failure(e: JoinError) -> Response {
    warn!(error = %e, "Store task failed");
    ApiError::response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Run a blocking store read off the async workers
async fn read_store<T, F>(state: &AppState, read: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&PresenceService) -> Result<T, StoreError> + Send + 'static,
{
    let presence = state.presence.clone();
    tokio::task::spawn_blocking(move || read(presence.as_ref()))
        .await
        .map_err(task_failure)?
        .map_err(store_failure)
}

/// List all devices, after marking stale ones offline
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Response {
    match read_store(&state, PresenceService::devices).await {
        Ok(devices) => {
            debug!(count = devices.len(), "Listing devices");
            Json(devices).into_response()
        }
        Err(response) => response,
    }
}

/// Device counts, after marking stale ones offline
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Response {
    match read_store(&state, PresenceService::stats).await {
        Ok(stats) => {
            debug!(
                total = stats.total,
                online = stats.online,
                offline = stats.offline,
                "Computed stats"
            );
            Json(stats).into_response()
        }
        Err(response) => response,
    }
}

/// List local networks available for scanning
pub async fn list_networks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let networks = state.presence.networks();
    debug!(count = networks.len(), "Listing networks");
    Json(networks)
}

/// Scan request body; an absent body scans the primary network
#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub network: Option<String>,
}

/// Trigger a discovery scan
pub async fn trigger_scan(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: ScanRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ScanRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => {
                return ApiError::response(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid scan request: {}", e),
                )
            }
        }
    };

    info!(network = ?req.network, "Manual scan triggered");

    match state.presence.try_scan(req.network.as_deref()).await {
        Ok(report) => Json(serde_json::json!({
            "status": "completed",
            "network": report.target.cidr,
            "devices_found": report.observations.len(),
            "saved": report.import.saved,
            "created": report.import.created,
            "failures": report.import.failures,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Scan failed");
            ApiError::response(scan_status(&e), format!("Scan failed: {}", e))
        }
    }
}

fn scan_status(e: &ScanError) -> StatusCode {
    match e {
        ScanError::Network(NetworkError::NoNetworkFound) => StatusCode::NOT_FOUND,
        ScanError::Probe(ProbeError::InvalidTarget(_)) => StatusCode::BAD_REQUEST,
        ScanError::Probe(_) => StatusCode::BAD_GATEWAY,
        ScanError::InProgress => StatusCode::CONFLICT,
        ScanError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
