use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use awxchat_agent::{EventSink, TurnOutcome, TurnRequest};
use awxchat_core::{ApplicationError, DomainError, InterfaceError};

use crate::state::AppState;
use crate::ws::{CHAT, HISTORY};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub request_type: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ChatResponse {
    pub status: &'static str,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/chat", post(chat))
}

/// Non-streaming twin of the WebSocket chat: one request, one terminal answer.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> (StatusCode, Json<ChatResponse>) {
    let ChatRequest { user_id, content, request_type } = request;

    match request_type.as_deref().unwrap_or(CHAT) {
        CHAT => {}
        HISTORY => {
            if user_id.trim().is_empty() {
                return bad_request(user_id, DomainError::EmptyUserId);
            }
            let history = state.runtime.history(&user_id).await;
            return (
                StatusCode::OK,
                Json(ChatResponse {
                    status: "success",
                    user_id,
                    response: Some(json!(history)),
                    message: "conversation history".to_string(),
                }),
            );
        }
        other => {
            let message = format!("Unknown request_type received: {other}");
            return (
                StatusCode::BAD_REQUEST,
                Json(ChatResponse { status: "error", user_id, response: None, message }),
            );
        }
    }

    let turn = match TurnRequest::new(user_id.clone(), content) {
        Ok(turn) => turn,
        Err(error) => return bad_request(user_id, error),
    };
    let correlation_id = turn.correlation_id.clone();

    match state.runtime.handle_turn(turn, &EventSink::disabled()).await {
        Ok(TurnOutcome::Blocked { reply, .. }) => (
            StatusCode::OK,
            Json(ChatResponse {
                status: "blocked",
                user_id,
                message: reply.explanation.clone(),
                response: Some(json!({ "explanation": reply.explanation })),
            }),
        ),
        Ok(outcome) => (
            StatusCode::OK,
            Json(ChatResponse {
                status: "success",
                user_id,
                response: Some(json!(outcome.reply())),
                message: "ok".to_string(),
            }),
        ),
        Err(error) => error_response(user_id, error.into_application().into_interface(correlation_id)),
    }
}

fn bad_request(user_id: String, error: DomainError) -> (StatusCode, Json<ChatResponse>) {
    let interface = ApplicationError::from(error).into_interface(Uuid::new_v4().to_string());
    error_response(user_id, interface)
}

fn error_response(user_id: String, error: InterfaceError) -> (StatusCode, Json<ChatResponse>) {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "http.chat.failed",
        correlation_id = %error.correlation_id(),
        user_id = %user_id,
        error = %error,
        "chat request failed"
    );
    (
        status,
        Json(ChatResponse {
            status: "error",
            user_id,
            response: None,
            message: error.user_message().to_string(),
        }),
    )
}
