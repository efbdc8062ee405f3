use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    ConversationRecord, ConversationRepository, RepositoryError, SlackIdentityRepository,
    SwapOutcome,
};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    records: RwLock<HashMap<String, ConversationRecord>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn load(&self, user_id: &str) -> Result<Option<ConversationRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(user_id).cloned())
    }

    async fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: Option<i64>,
        payload: &str,
    ) -> Result<SwapOutcome, RepositoryError> {
        let mut records = self.records.write().await;
        let current = records.get(user_id).map(|record| record.version);
        if current != expected_version {
            return Ok(SwapOutcome::Conflict);
        }

        let version = current.unwrap_or(0) + 1;
        records.insert(
            user_id.to_string(),
            ConversationRecord {
                user_id: user_id.to_string(),
                payload: payload.to_string(),
                version,
                updated_at: Utc::now(),
            },
        );
        Ok(SwapOutcome::Committed { version })
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySlackIdentityRepository {
    links: RwLock<HashMap<String, String>>,
}

#[async_trait::async_trait]
impl SlackIdentityRepository for InMemorySlackIdentityRepository {
    async fn find_user_id(&self, slack_user_id: &str) -> Result<Option<String>, RepositoryError> {
        let links = self.links.read().await;
        Ok(links.get(slack_user_id).cloned())
    }

    async fn link(&self, slack_user_id: &str, user_id: &str) -> Result<(), RepositoryError> {
        let mut links = self.links.write().await;
        links.insert(slack_user_id.to_string(), user_id.to_string());
        Ok(())
    }
}
