use axum::{Json, extract::State};
use serde::Serialize;
use zenkey_core::{DevicePresence, ScanSession};

use crate::infra::{app_state::AppState, errors::AppResult};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub device: DevicePresence,
    pub scan: ScanSession,
    pub connections: usize,
}

pub async fn health_handler(
    State(state): State<AppState>,
) -> AppResult<Json<HealthResponse>> {
    let snapshot = state.scan_service.snapshot().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        device: snapshot.device,
        scan: snapshot.scan,
        connections: state.websocket_manager.connection_count(),
    }))
}
