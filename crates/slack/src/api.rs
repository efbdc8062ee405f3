use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use awxchat_core::config::SlackConfig;

use crate::blocks::{MessageTemplate, ModalView};

#[derive(Debug, Error)]
pub enum SlackApiError {
    #[error("slack request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("slack returned HTTP {0}")]
    Status(u16),
    #[error("slack rejected {method}: {error}")]
    Api { method: &'static str, error: String },
}

/// Outbound Slack Web API calls the bot needs.
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn post_message(
        &self,
        channel: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;

    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError>;
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackWebClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn from_config(config: &SlackConfig) -> Result<Self, SlackApiError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    async fn call(&self, method: &'static str, payload: Value) -> Result<(), SlackApiError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SlackApiError::Status(status.as_u16()));
        }

        let body: SlackResponse = response.json().await?;
        if !body.ok {
            return Err(SlackApiError::Api {
                method,
                error: body.error.unwrap_or_else(|| "unknown_error".to_string()),
            });
        }
        debug!(event_name = "slack.api.called", method, "slack api call succeeded");
        Ok(())
    }
}

#[async_trait]
impl SlackApi for SlackWebClient {
    async fn post_message(
        &self,
        channel: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        self.call("chat.postMessage", message_payload(channel, message)).await
    }

    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError> {
        self.call("views.open", json!({ "trigger_id": trigger_id, "view": view })).await
    }
}

pub fn message_payload(channel: &str, message: &MessageTemplate) -> Value {
    let mut payload = json!({ "channel": channel, "text": message.fallback_text });
    if !message.blocks.is_empty() {
        payload["blocks"] = json!(message.blocks);
    }
    payload
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::message_payload;
    use crate::blocks::{login_prompt, MessageTemplate};

    #[test]
    fn plain_message_payload_is_text_only() {
        let payload = message_payload("C1", &MessageTemplate::text("Hi <@U1>, done"));
        assert_eq!(payload, json!({ "channel": "C1", "text": "Hi <@U1>, done" }));
    }

    #[test]
    fn block_message_payload_keeps_fallback_text() {
        let payload = message_payload("C1", &login_prompt("U9"));
        assert_eq!(payload["blocks"].as_array().map(Vec::len), Some(2));
        assert!(payload["text"].as_str().is_some_and(|text| text.contains("<@U9>")));
    }
}
