//! Links Slack accounts to AWX users through a credential check.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use awxchat_db::{RepositoryError, SlackIdentityRepository};

pub const LOGIN_SUCCEEDED: &str = "Login successful, you can now use the AWX assistant.";
pub const LOGIN_FAILED: &str = "Login failed, please try again.";

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("credential check could not be completed: {0}")]
    Unavailable(String),
}

/// Exchanges a username and password for the AWX user id they belong to.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(None)` means the credentials were refused.
    async fn verify(&self, username: &str, password: SecretString)
        -> Result<Option<String>, LoginError>;
}

/// Extracts the user id from an AWX `/api/v2/me/` response, which is a
/// one-element result page.
pub fn awx_user_id(me: &Value) -> Option<String> {
    let user = me.get("results").and_then(|results| results.get(0)).unwrap_or(me);
    match user.get("id")? {
        Value::Number(id) => Some(id.to_string()),
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginSubmission {
    pub slack_user_id: String,
    pub channel_id: String,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    Linked { user_id: String },
    Rejected,
    Failed,
}

impl LoginOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Linked { .. } => LOGIN_SUCCEEDED,
            Self::Rejected | Self::Failed => LOGIN_FAILED,
        }
    }
}

pub struct LoginService {
    identities: Arc<dyn SlackIdentityRepository>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl LoginService {
    pub fn new(
        identities: Arc<dyn SlackIdentityRepository>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self { identities, verifier }
    }

    /// Internal user id linked to `slack_user_id`, if any.
    pub async fn resolve(&self, slack_user_id: &str) -> Result<Option<String>, RepositoryError> {
        self.identities.find_user_id(slack_user_id).await
    }

    pub async fn complete(&self, submission: &LoginSubmission, correlation_id: &str) -> LoginOutcome {
        let username = submission.username.trim();
        if username.is_empty() || submission.password.is_empty() {
            return LoginOutcome::Rejected;
        }

        let password = SecretString::from(submission.password.clone());
        let user_id = match self.verifier.verify(username, password).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => {
                info!(
                    event_name = "slack.login.rejected",
                    correlation_id,
                    slack_user_id = %submission.slack_user_id,
                    "credentials refused"
                );
                return LoginOutcome::Rejected;
            }
            Err(error) => {
                warn!(
                    event_name = "slack.login.unavailable",
                    correlation_id,
                    slack_user_id = %submission.slack_user_id,
                    error = %error,
                    "credential check failed"
                );
                return LoginOutcome::Failed;
            }
        };

        if let Err(error) = self.identities.link(&submission.slack_user_id, &user_id).await {
            warn!(
                event_name = "slack.login.link_failed",
                correlation_id,
                slack_user_id = %submission.slack_user_id,
                error = %error,
                "could not store identity link"
            );
            return LoginOutcome::Failed;
        }

        info!(
            event_name = "slack.login.linked",
            correlation_id,
            slack_user_id = %submission.slack_user_id,
            user_id = %user_id,
            "slack account linked"
        );
        LoginOutcome::Linked { user_id }
    }
}
