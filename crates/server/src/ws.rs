//! `/ws/{user_id}`: streaming chat over WebSocket.
//!
//! Every client frame is `{request_type, content}`; every server frame has
//! the same shape. Each chat turn runs in its own task, so a client may have
//! several turns in flight on one connection.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use awxchat_agent::{EventSink, StreamEvent, TurnOutcome, TurnRequest};

use crate::state::AppState;

pub const CHAT: &str = "awx-chat";
pub const CHAT_TOKEN: &str = "awx-chat-token";
pub const HISTORY: &str = "conversation-history";
pub const ERROR: &str = "error";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServerFrame {
    pub request_type: &'static str,
    pub content: Value,
}

impl ServerFrame {
    fn new(request_type: &'static str, content: impl Into<Value>) -> Self {
        Self { request_type, content: content.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ERROR, message.into())
    }

    pub fn tool_notice(tool: &str) -> Self {
        Self::new(
            CHAT,
            format!(
                "I will use the `{tool}` tool to perform your request, please wait for the result"
            ),
        )
    }

    fn from_stream(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Token(token) => Self::new(CHAT_TOKEN, token),
            StreamEvent::ToolCall { tool, .. } => Self::tool_notice(&tool),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(default)]
    request_type: Option<String>,
    #[serde(default)]
    content: Value,
}

pub type Outbound = mpsc::UnboundedSender<ServerFrame>;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/{user_id}", get(upgrade))
}

async fn upgrade(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state, user_id))
}

async fn serve_socket(socket: WebSocket, state: AppState, user_id: String) {
    let _connection = state.connections.open();
    info!(event_name = "ws.connection.opened", user_id = %user_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    let (outbound, mut frames) = mpsc::unbounded_channel::<ServerFrame>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(error) => {
                    warn!(event_name = "ws.frame.encode_failed", error = %error, "dropping frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle_frame(&state, &user_id, text.as_str(), &outbound).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                let _ = outbound.send(ServerFrame::error("Binary frames are not supported."));
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(error) => {
                debug!(event_name = "ws.receive.failed", user_id = %user_id, error = %error);
                break;
            }
        }
    }

    // Turns already spawned keep running and persist; their output is dropped.
    drop(outbound);
    writer.abort();
    info!(event_name = "ws.connection.closed", user_id = %user_id, "websocket disconnected");
}

/// Dispatches one client frame. Chat turns are spawned; everything else is
/// answered inline.
pub async fn handle_frame(state: &AppState, user_id: &str, text: &str, outbound: &Outbound) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            let _ = outbound.send(ServerFrame::error(format!("Invalid JSON message: {error}")));
            return;
        }
    };

    match frame.request_type.as_deref().unwrap_or(CHAT) {
        CHAT => {
            let content = match frame.content {
                Value::String(content) => content,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            let state = state.clone();
            let user_id = user_id.to_string();
            let outbound = outbound.clone();
            tokio::spawn(async move { run_chat_turn(state, user_id, content, outbound).await });
        }
        HISTORY => {
            let history = state.runtime.history(user_id).await;
            let _ = outbound.send(ServerFrame::new(HISTORY, json!(history)));
        }
        other => {
            let _ = outbound
                .send(ServerFrame::error(format!("Unknown request_type received: {other}")));
        }
    }
}

async fn run_chat_turn(state: AppState, user_id: String, content: String, outbound: Outbound) {
    let request = match TurnRequest::new(user_id, content) {
        Ok(request) => request,
        Err(error) => {
            let _ = outbound.send(ServerFrame::error(error.to_string()));
            return;
        }
    };
    let correlation_id = request.correlation_id.clone();

    let (events, mut stream) = EventSink::channel();
    let forward_to = outbound.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            let _ = forward_to.send(ServerFrame::from_stream(event));
        }
    });

    let result = state.runtime.handle_turn(request, &events).await;
    drop(events);
    let _ = forwarder.await;

    let terminal = match result {
        Ok(TurnOutcome::Blocked { reply, .. }) => {
            ServerFrame::new(CHAT, json!({ "explanation": reply.explanation }))
        }
        Ok(outcome) => ServerFrame::new(CHAT, json!(outcome.reply())),
        Err(error) => {
            let interface = error.into_application().into_interface(correlation_id);
            ServerFrame::error(interface.user_message())
        }
    };
    let _ = outbound.send(terminal);
}
