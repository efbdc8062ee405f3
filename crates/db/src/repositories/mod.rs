use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod conversation;
pub mod memory;
pub mod slack_identity;

pub use conversation::SqlConversationRepository;
pub use memory::{InMemoryConversationRepository, InMemorySlackIdentityRepository};
pub use slack_identity::SqlSlackIdentityRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// A user's serialized turn list together with its write version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationRecord {
    pub user_id: String,
    pub payload: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapOutcome {
    Committed { version: i64 },
    /// Another writer changed the record after the caller observed it.
    Conflict,
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<ConversationRecord>, RepositoryError>;

    /// Replaces the payload only if the stored version still equals
    /// `expected_version`; `None` means the record must not exist yet.
    async fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: Option<i64>,
        payload: &str,
    ) -> Result<SwapOutcome, RepositoryError>;

    async fn ping(&self) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SlackIdentityRepository: Send + Sync {
    async fn find_user_id(&self, slack_user_id: &str) -> Result<Option<String>, RepositoryError>;

    /// Links (or relinks) a Slack account to an internal user id.
    async fn link(&self, slack_user_id: &str, user_id: &str) -> Result<(), RepositoryError>;
}
