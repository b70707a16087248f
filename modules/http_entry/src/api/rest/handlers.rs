use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use rkboot::{get_app_info_entry, Entry, EntryRegistry, ShutdownHandle, Signal};

use crate::api::rest::dto::{EntriesResponse, HealthyResponse, PingResponse, ShutdownResponse};

/// Shared by the common service handlers of one http entry.
#[derive(Clone)]
pub struct CommonState {
    pub registry: Arc<EntryRegistry>,
    pub shutdown: ShutdownHandle,
    pub entry_name: String,
}

pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        message: "pong".to_string(),
    })
}

pub async fn healthy() -> Json<HealthyResponse> {
    Json(HealthyResponse { healthy: true })
}

/// App info of the process; 404 when no `app` entry is registered.
pub async fn app_info(
    State(state): State<CommonState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    get_app_info_entry(&state.registry)
        .map(|app| Json(app.info()))
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn entries(State(state): State<CommonState>) -> Json<EntriesResponse> {
    let mut out: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
    for (entry_type, by_name) in state.registry.list_all() {
        let mut names: Vec<_> = by_name.into_iter().collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        out.insert(entry_type, names.into_iter().map(|(_, e)| e.info()).collect());
    }
    Json(EntriesResponse { entries: out })
}

/// Ask the orchestrator to begin a graceful shutdown.
pub async fn shutdown(State(state): State<CommonState>) -> Json<ShutdownResponse> {
    let sig = Signal::Requested(format!("http:{}", state.entry_name));
    info!(entry = %state.entry_name, "shutdown requested over HTTP");
    let accepted = state.shutdown.trigger(sig.clone());
    Json(ShutdownResponse {
        accepted,
        signal: sig.to_string(),
    })
}
