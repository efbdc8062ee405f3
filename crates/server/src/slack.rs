//! Slack Events API and interactivity endpoints, plus the adapters that
//! connect the Slack handlers to the agent runtime and AWX.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use awxchat_agent::tools::awx::AwxClient;
use awxchat_agent::tools::ToolError;
use awxchat_agent::{AgentRuntime, EventSink, TurnRequest};
use awxchat_core::AgentReply;
use awxchat_slack::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use awxchat_slack::{
    awx_user_id, parse_event_callback, parse_events_payload, parse_interaction, ChatTurnService,
    CredentialVerifier, EventContext, EventHandlerError, EventsApiPayload, LoginError,
    SlackEnvelope, SlackEvent,
};

use crate::state::{AppState, SlackState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/slack/events", post(events))
        .route("/slack/interactions", post(interactions))
}

#[derive(Debug, Deserialize)]
struct InteractionForm {
    payload: String,
}

async fn events(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let slack = match authorize(&state, &headers, &body) {
        Ok(slack) => slack,
        Err(response) => return response,
    };

    match parse_events_payload(&body) {
        Ok(EventsApiPayload::UrlVerification { challenge }) => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        Ok(EventsApiPayload::EventCallback { event_id, event }) => {
            let envelope = SlackEnvelope {
                envelope_id: event_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                event: parse_event_callback(&event),
            };
            acknowledge(slack, envelope)
        }
        Ok(EventsApiPayload::Unsupported) => StatusCode::OK.into_response(),
        Err(error) => (StatusCode::BAD_REQUEST, error.to_string()).into_response(),
    }
}

async fn interactions(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let slack = match authorize(&state, &headers, &body) {
        Ok(slack) => slack,
        Err(response) => return response,
    };

    // The signature covers the raw body, so the form is decoded only afterwards.
    let request = Request::builder()
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body));
    let Ok(request) = request else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let Form(form) = match Form::<InteractionForm>::from_request(request, &()).await {
        Ok(form) => form,
        Err(rejection) => return rejection.into_response(),
    };

    match parse_interaction(&form.payload) {
        Ok(event) => {
            let envelope = SlackEnvelope { envelope_id: Uuid::new_v4().to_string(), event };
            acknowledge(slack, envelope)
        }
        Err(error) => (StatusCode::BAD_REQUEST, error.to_string()).into_response(),
    }
}

fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Arc<SlackState>, Response> {
    let Some(slack) = state.slack.clone() else {
        return Err(StatusCode::NOT_FOUND.into_response());
    };
    if let Some(verifier) = &slack.verifier {
        let header_value = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
        if let Err(error) =
            verifier.verify(header_value(TIMESTAMP_HEADER), header_value(SIGNATURE_HEADER), body)
        {
            warn!(event_name = "slack.request.rejected", error = %error, "slack signature check failed");
            return Err(StatusCode::UNAUTHORIZED.into_response());
        }
    }
    Ok(slack)
}

/// Slack wants an answer within three seconds; the work happens afterwards.
fn acknowledge(slack: Arc<SlackState>, envelope: SlackEnvelope) -> Response {
    if matches!(envelope.event, SlackEvent::Unsupported { .. }) {
        return StatusCode::OK.into_response();
    }

    tokio::spawn(async move {
        let ctx = EventContext { correlation_id: Uuid::new_v4().to_string() };
        if let Err(error) = slack.bot.process(&envelope, &ctx).await {
            warn!(
                event_name = "slack.event.failed",
                correlation_id = %ctx.correlation_id,
                envelope_id = %envelope.envelope_id,
                error = %error,
                "slack event processing failed"
            );
        }
    });
    StatusCode::OK.into_response()
}

/// Runs Slack messages through the shared turn pipeline.
pub struct RuntimeChatService {
    runtime: Arc<AgentRuntime>,
}

impl RuntimeChatService {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl ChatTurnService for RuntimeChatService {
    async fn run_turn(
        &self,
        user_id: &str,
        text: &str,
        ctx: &EventContext,
    ) -> Result<AgentReply, EventHandlerError> {
        let request = TurnRequest::new(user_id, text)
            .map_err(|error| EventHandlerError::ChatTurn(error.to_string()))?
            .with_correlation_id(ctx.correlation_id.clone());
        let outcome = self
            .runtime
            .handle_turn(request, &EventSink::disabled())
            .await
            .map_err(|error| EventHandlerError::ChatTurn(error.to_string()))?;
        Ok(outcome.reply().clone())
    }
}

/// Checks AWX credentials with `GET /api/v2/me/` as the submitted user.
pub struct AwxCredentialVerifier {
    client: AwxClient,
}

impl AwxCredentialVerifier {
    pub fn new(client: AwxClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialVerifier for AwxCredentialVerifier {
    async fn verify(
        &self,
        username: &str,
        password: SecretString,
    ) -> Result<Option<String>, LoginError> {
        match self.client.with_credentials(username, password).current_user().await {
            Ok(me) => {
                let user_id = awx_user_id(&me);
                info!(
                    event_name = "slack.login.awx_checked",
                    found = user_id.is_some(),
                    "awx accepted credentials"
                );
                Ok(user_id)
            }
            Err(ToolError::Status { status: 401 | 403, .. }) => Ok(None),
            Err(error) => Err(LoginError::Unavailable(error.to_string())),
        }
    }
}
