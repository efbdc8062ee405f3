use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use super::{ConversationRecord, ConversationRepository, RepositoryError, SwapOutcome};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn load(&self, user_id: &str) -> Result<Option<ConversationRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, turns_json, version, updated_at
             FROM conversation_history
             WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    async fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: Option<i64>,
        payload: &str,
    ) -> Result<SwapOutcome, RepositoryError> {
        let now = Utc::now();
        let (result, next_version) = match expected_version {
            None => {
                let result = sqlx::query(
                    "INSERT INTO conversation_history (user_id, turns_json, version, updated_at)
                     VALUES (?, ?, 1, ?)
                     ON CONFLICT(user_id) DO NOTHING",
                )
                .bind(user_id)
                .bind(payload)
                .bind(now)
                .execute(&self.pool)
                .await?;
                (result, 1)
            }
            Some(version) => {
                let result = sqlx::query(
                    "UPDATE conversation_history
                     SET turns_json = ?, version = version + 1, updated_at = ?
                     WHERE user_id = ? AND version = ?",
                )
                .bind(payload)
                .bind(now)
                .bind(user_id)
                .bind(version)
                .execute(&self.pool)
                .await?;
                (result, version + 1)
            }
        };

        if result.rows_affected() == 1 {
            Ok(SwapOutcome::Committed { version: next_version })
        } else {
            Ok(SwapOutcome::Conflict)
        }
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        crate::connection::ping(&self.pool).await.map_err(RepositoryError::from)
    }
}

fn record_from_row(row: SqliteRow) -> Result<ConversationRecord, RepositoryError> {
    Ok(ConversationRecord {
        user_id: row.try_get("user_id")?,
        payload: row.try_get("turns_json")?,
        version: row.try_get("version")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::SqlConversationRepository;
    use crate::repositories::{ConversationRepository, SwapOutcome};
    use crate::{connect_with_settings, migrations::run_pending};

    async fn repository() -> SqlConversationRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlConversationRepository::new(pool)
    }

    #[tokio::test]
    async fn first_write_creates_record_at_version_one() {
        let repo = repository().await;

        let outcome = repo.compare_and_swap("alice", None, "[]").await.expect("swap");
        let record = repo.load("alice").await.expect("load").expect("record exists");

        assert_eq!(outcome, SwapOutcome::Committed { version: 1 });
        assert_eq!(record.version, 1);
        assert_eq!(record.payload, "[]");
    }

    #[tokio::test]
    async fn stale_version_is_reported_as_conflict() {
        let repo = repository().await;
        repo.compare_and_swap("alice", None, "[1]").await.expect("create");
        repo.compare_and_swap("alice", Some(1), "[1,2]").await.expect("advance");

        let stale = repo.compare_and_swap("alice", Some(1), "[9]").await.expect("stale swap");
        let record = repo.load("alice").await.expect("load").expect("record exists");

        assert_eq!(stale, SwapOutcome::Conflict);
        assert_eq!(record.version, 2);
        assert_eq!(record.payload, "[1,2]");
    }

    #[tokio::test]
    async fn create_races_resolve_to_single_winner() {
        let repo = repository().await;

        let first = repo.compare_and_swap("bob", None, "[\"a\"]").await.expect("first");
        let second = repo.compare_and_swap("bob", None, "[\"b\"]").await.expect("second");

        assert_eq!(first, SwapOutcome::Committed { version: 1 });
        assert_eq!(second, SwapOutcome::Conflict);
    }

    #[tokio::test]
    async fn missing_user_loads_none_and_ping_succeeds() {
        let repo = repository().await;

        assert!(repo.load("nobody").await.expect("load").is_none());
        repo.ping().await.expect("ping");
    }
}
