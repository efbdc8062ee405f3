use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub conversation_store: HealthCheck,
    pub websocket_connections: usize,
    pub checked_at: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let conversation_store = match state.runtime.store().ping().await {
        Ok(()) => HealthCheck { status: "ready", detail: "conversation store reachable".to_string() },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("conversation store unreachable: {error}"),
        },
    };
    let ready = conversation_store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "awxchat-server runtime initialized".to_string(),
        },
        conversation_store,
        websocket_connections: state.connections.current(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
