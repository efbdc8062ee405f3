use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use awxchat_core::AgentReply;

use crate::{
    api::{SlackApi, SlackApiError},
    blocks::{
        login_modal, login_prompt, MessageTemplate, ModalView, LOGIN_ACTION_ID, LOGIN_CALLBACK_ID,
        PASSWORD_ACTION_ID, PASSWORD_BLOCK_ID, USERNAME_ACTION_ID, USERNAME_BLOCK_ID,
    },
    login::{LoginService, LoginSubmission},
};

pub const ERROR_REPLY: &str = "Sorry, an error occurred while processing your request.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    BlockAction(BlockActionEvent),
    ViewSubmission(ViewSubmissionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::ViewSubmission(_) => SlackEventType::ViewSubmission,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    BlockAction,
    ViewSubmission,
    Unsupported,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Message,
    AppMention,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub kind: MessageKind,
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub trigger_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub action_id: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewSubmissionEvent {
    pub callback_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub username: String,
    pub password: String,
}

/// Top-level body of `POST /slack/events`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventsApiPayload {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        #[serde(default)]
        event_id: Option<String>,
        event: Value,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid slack payload: {0}")]
    Json(String),
    #[error("slack payload is missing `{0}`")]
    MissingField(&'static str),
}

pub fn parse_events_payload(body: &[u8]) -> Result<EventsApiPayload, ParseError> {
    serde_json::from_slice(body).map_err(|error| ParseError::Json(error.to_string()))
}

/// Turns an Events API `event` object into a [`SlackEvent`]. Bot messages
/// and message subtypes (edits, joins, deletions) are unsupported.
pub fn parse_event_callback(event: &Value) -> SlackEvent {
    let event_type = text_field(event, "type").unwrap_or_default();
    let kind = match event_type.as_str() {
        "message" => MessageKind::Message,
        "app_mention" => MessageKind::AppMention,
        _ => return SlackEvent::Unsupported { event_type },
    };

    if event.get("bot_id").is_some_and(|bot| !bot.is_null()) {
        return SlackEvent::Unsupported { event_type: "bot_message".to_string() };
    }
    if let Some(subtype) = text_field(event, "subtype") {
        return SlackEvent::Unsupported { event_type: format!("message.{subtype}") };
    }

    let (Some(channel_id), Some(user_id)) = (text_field(event, "channel"), text_field(event, "user"))
    else {
        return SlackEvent::Unsupported { event_type };
    };
    let text = text_field(event, "text").unwrap_or_default();
    let text = match kind {
        MessageKind::AppMention => strip_leading_mentions(&text),
        MessageKind::Message => text.trim().to_string(),
    };

    SlackEvent::Message(MessageEvent { kind, channel_id, user_id, text })
}

/// Parses the JSON carried in the `payload` form field of `POST /slack/interactions`.
pub fn parse_interaction(payload: &str) -> Result<SlackEvent, ParseError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|error| ParseError::Json(error.to_string()))?;
    let user_id = pointer_text(&value, "/user/id").ok_or(ParseError::MissingField("user.id"))?;

    match text_field(&value, "type").as_deref() {
        Some("block_actions") => {
            let action = value
                .get("actions")
                .and_then(|actions| actions.get(0))
                .ok_or(ParseError::MissingField("actions"))?;
            Ok(SlackEvent::BlockAction(BlockActionEvent {
                trigger_id: text_field(&value, "trigger_id")
                    .ok_or(ParseError::MissingField("trigger_id"))?,
                channel_id: pointer_text(&value, "/channel/id")
                    .or_else(|| pointer_text(&value, "/container/channel_id"))
                    .unwrap_or_default(),
                user_id,
                action_id: text_field(action, "action_id")
                    .ok_or(ParseError::MissingField("actions[0].action_id"))?,
                value: text_field(action, "value"),
            }))
        }
        Some("view_submission") => {
            let view = value.get("view").ok_or(ParseError::MissingField("view"))?;
            let input = |block: &str, action: &str| {
                pointer_text(view, &format!("/state/values/{block}/{action}/value"))
                    .unwrap_or_default()
            };
            Ok(SlackEvent::ViewSubmission(ViewSubmissionEvent {
                callback_id: text_field(view, "callback_id").unwrap_or_default(),
                user_id,
                channel_id: text_field(view, "private_metadata").unwrap_or_default(),
                username: input(USERNAME_BLOCK_ID, USERNAME_ACTION_ID),
                password: input(PASSWORD_BLOCK_ID, PASSWORD_ACTION_ID),
            }))
        }
        other => Ok(SlackEvent::Unsupported {
            event_type: other.unwrap_or("interaction").to_string(),
        }),
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn pointer_text(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

fn strip_leading_mentions(text: &str) -> String {
    let mut rest = text.trim_start();
    while let Some(after) = rest.strip_prefix("<@") {
        match after.find('>') {
            Some(end) => rest = after[end + 1..].trim_start(),
            None => break,
        }
    }
    rest.trim().to_string()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Reply { channel_id: String, message: MessageTemplate },
    OpenView { trigger_id: String, view: ModalView },
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("identity lookup failed: {0}")]
    Identity(String),
    #[error("chat turn failed: {0}")]
    ChatTurn(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
    #[error(transparent)]
    Delivery(#[from] SlackApiError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Runs one chat turn for an already-resolved internal user.
#[async_trait]
pub trait ChatTurnService: Send + Sync {
    async fn run_turn(
        &self,
        user_id: &str,
        text: &str,
        ctx: &EventContext,
    ) -> Result<AgentReply, EventHandlerError>;
}

/// Standard handler set: chat messages, the login button, and the login form.
pub fn chat_dispatcher(chat: Arc<dyn ChatTurnService>, login: Arc<LoginService>) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ChatMessageHandler::new(chat, login.clone()));
    dispatcher.register(LoginActionHandler);
    dispatcher.register(LoginSubmissionHandler::new(login));
    dispatcher
}

pub struct ChatMessageHandler {
    chat: Arc<dyn ChatTurnService>,
    login: Arc<LoginService>,
}

impl ChatMessageHandler {
    pub fn new(chat: Arc<dyn ChatTurnService>, login: Arc<LoginService>) -> Self {
        Self { chat, login }
    }
}

#[async_trait]
impl EventHandler for ChatMessageHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.text.is_empty() {
            return Ok(HandlerResult::Ignored);
        }

        let user_id = self
            .login
            .resolve(&event.user_id)
            .await
            .map_err(|error| EventHandlerError::Identity(error.to_string()))?;
        let Some(user_id) = user_id else {
            info!(
                event_name = "slack.message.unlinked",
                correlation_id = %ctx.correlation_id,
                slack_user_id = %event.user_id,
                "prompting slack user to log in"
            );
            return Ok(HandlerResult::Reply {
                channel_id: event.channel_id.clone(),
                message: login_prompt(&event.user_id),
            });
        };

        let text = match self.chat.run_turn(&user_id, &event.text, ctx).await {
            Ok(reply) => reply.display_text(),
            Err(error) => {
                warn!(
                    event_name = "slack.message.failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = %user_id,
                    error = %error,
                    "chat turn failed"
                );
                ERROR_REPLY.to_string()
            }
        };
        let text = match event.kind {
            MessageKind::AppMention => format!("Hi <@{}>, {text}", event.user_id),
            MessageKind::Message => text,
        };

        Ok(HandlerResult::Reply {
            channel_id: event.channel_id.clone(),
            message: MessageTemplate::text(text),
        })
    }
}

pub struct LoginActionHandler;

#[async_trait]
impl EventHandler for LoginActionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.action_id != LOGIN_ACTION_ID {
            return Ok(HandlerResult::Ignored);
        }

        Ok(HandlerResult::OpenView {
            trigger_id: event.trigger_id.clone(),
            view: login_modal(&event.channel_id),
        })
    }
}

pub struct LoginSubmissionHandler {
    login: Arc<LoginService>,
}

impl LoginSubmissionHandler {
    pub fn new(login: Arc<LoginService>) -> Self {
        Self { login }
    }
}

#[async_trait]
impl EventHandler for LoginSubmissionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ViewSubmission
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ViewSubmission(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.callback_id != LOGIN_CALLBACK_ID {
            return Ok(HandlerResult::Ignored);
        }

        let submission = LoginSubmission {
            slack_user_id: event.user_id.clone(),
            channel_id: event.channel_id.clone(),
            username: event.username.clone(),
            password: event.password.clone(),
        };
        let outcome = self.login.complete(&submission, &ctx.correlation_id).await;
        if event.channel_id.is_empty() {
            return Ok(HandlerResult::Processed);
        }

        Ok(HandlerResult::Reply {
            channel_id: event.channel_id.clone(),
            message: MessageTemplate::text(outcome.message()),
        })
    }
}

/// Dispatches envelopes and delivers whatever the handlers produce.
pub struct SlackBot {
    dispatcher: EventDispatcher,
    api: Arc<dyn SlackApi>,
}

impl SlackBot {
    pub fn new(dispatcher: EventDispatcher, api: Arc<dyn SlackApi>) -> Self {
        Self { dispatcher, api }
    }

    pub async fn process(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let result = self.dispatcher.dispatch(envelope, ctx).await?;
        match &result {
            HandlerResult::Reply { channel_id, message } => {
                self.api.post_message(channel_id, message).await?;
            }
            HandlerResult::OpenView { trigger_id, view } => {
                self.api.open_view(trigger_id, view).await?;
            }
            HandlerResult::Processed | HandlerResult::Ignored => {}
        }
        Ok(result)
    }
}
