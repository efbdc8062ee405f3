//! Slack interface for the AWX assistant.
//!
//! - **Signature** (`signature`) - `X-Slack-Signature` verification for inbound requests
//! - **Events** (`events`) - Events API / interaction parsing and the handler dispatcher
//! - **Login** (`login`) - links a Slack user to an AWX account
//! - **Block Kit** (`blocks`) - login prompt, login modal, plain replies
//! - **Web API** (`api`) - `chat.postMessage` and `views.open`
//!
//! ```text
//! HTTP request → SignatureVerifier → parse → EventDispatcher → Handler → ChatTurnService
//!                                                                  ↓
//!                                                       SlackApi ← HandlerResult
//! ```

pub mod api;
pub mod blocks;
pub mod events;
pub mod login;
pub mod signature;

pub use api::{SlackApi, SlackApiError, SlackWebClient};
pub use events::{
    chat_dispatcher, parse_event_callback, parse_events_payload, parse_interaction,
    ChatTurnService, DispatchError, EventContext, EventDispatcher, EventHandlerError,
    EventsApiPayload, HandlerResult, SlackBot, SlackEnvelope, SlackEvent,
};
pub use login::{awx_user_id, CredentialVerifier, LoginError, LoginService};
pub use signature::{SignatureError, SignatureVerifier};
