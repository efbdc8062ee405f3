use chrono::Utc;
use sqlx::Row;

use super::{RepositoryError, SlackIdentityRepository};
use crate::DbPool;

pub struct SqlSlackIdentityRepository {
    pool: DbPool,
}

impl SqlSlackIdentityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SlackIdentityRepository for SqlSlackIdentityRepository {
    async fn find_user_id(&self, slack_user_id: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT user_id FROM slack_identity WHERE slack_user_id = ?")
            .bind(slack_user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.try_get::<String, _>("user_id")).transpose()?)
    }

    async fn link(&self, slack_user_id: &str, user_id: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO slack_identity (slack_user_id, user_id, linked_at)
             VALUES (?, ?, ?)
             ON CONFLICT(slack_user_id) DO UPDATE SET
                user_id = excluded.user_id,
                linked_at = excluded.linked_at",
        )
        .bind(slack_user_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SqlSlackIdentityRepository;
    use crate::repositories::SlackIdentityRepository;
    use crate::{connect_with_settings, migrations::run_pending};

    #[tokio::test]
    async fn link_then_relink_resolves_latest_user() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        let repo = SqlSlackIdentityRepository::new(pool);

        assert_eq!(repo.find_user_id("U123").await.expect("find"), None);

        repo.link("U123", "7").await.expect("link");
        repo.link("U123", "12").await.expect("relink");

        assert_eq!(repo.find_user_id("U123").await.expect("find"), Some("12".to_string()));
    }
}
