use chrono::Utc;
use sqlx::Row;

use tripcover_core::domain::conversation::{ConversationState, STATE_VERSION};

use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<ConversationState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT version, state_json FROM conversation_state WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_state(r)?)),
            None => Ok(None),
        }
    }
}

fn row_to_state(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationState, RepositoryError> {
    let version: i64 = row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    if version != i64::from(STATE_VERSION) {
        return Err(RepositoryError::Decode(format!(
            "unsupported conversation state version {version}"
        )));
    }
    let state_json: String =
        row.try_get("state_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    serde_json::from_str(&state_json).map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, RepositoryError> {
        let state = self.fetch(session_id).await?;
        if state.is_some() {
            sqlx::query("UPDATE conversation_state SET last_accessed_at = ? WHERE session_id = ?")
                .bind(Utc::now().to_rfc3339())
                .bind(session_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(state)
    }

    async fn peek(&self, session_id: &str) -> Result<Option<ConversationState>, RepositoryError> {
        self.fetch(session_id).await
    }

    async fn save(&self, state: &ConversationState) -> Result<(), RepositoryError> {
        let state_json =
            serde_json::to_string(state).map_err(|e| RepositoryError::Encode(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO conversation_state (session_id, version, state_json, created_at,
                                             updated_at, last_accessed_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                 version = excluded.version,
                 state_json = excluded.state_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&state.session_id)
        .bind(i64::from(state.version))
        .bind(&state_json)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use tripcover_core::domain::conversation::ConversationState;

    use super::SqlConversationRepository;
    use crate::migrations::run_pending;
    use crate::repositories::{ConversationRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        pool
    }

    async fn last_accessed(pool: &DbPool, session_id: &str) -> String {
        sqlx::query("SELECT last_accessed_at FROM conversation_state WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(pool)
            .await
            .expect("row")
            .get::<String, _>("last_accessed_at")
    }

    #[tokio::test]
    async fn save_then_load_round_trips_full_state() {
        let repo = SqlConversationRepository::new(pool().await);
        let mut state = ConversationState::new("sess-1");
        state.push_user("two weeks in Japan");
        state.trip.destination = Some("Japan".to_owned());
        state.travelers.set_ages(vec![31.0, 4.0]);

        repo.save(&state).await.expect("save");
        let loaded = repo.load("sess-1").await.expect("load");

        assert_eq!(loaded, Some(state));
        assert_eq!(repo.load("missing").await.expect("load"), None);
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let repo = SqlConversationRepository::new(pool().await);
        let mut state = ConversationState::new("sess-2");
        repo.save(&state).await.expect("first save");

        state.push_assistant("Where to?");
        repo.save(&state).await.expect("second save");

        let loaded = repo.peek("sess-2").await.expect("peek").expect("present");
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn peek_does_not_touch_access_time() {
        let pool = pool().await;
        let repo = SqlConversationRepository::new(pool.clone());
        repo.save(&ConversationState::new("sess-3")).await.expect("save");
        sqlx::query("UPDATE conversation_state SET last_accessed_at = 'epoch' WHERE session_id = ?")
            .bind("sess-3")
            .execute(&pool)
            .await
            .expect("reset");

        repo.peek("sess-3").await.expect("peek");
        assert_eq!(last_accessed(&pool, "sess-3").await, "epoch");

        repo.load("sess-3").await.expect("load");
        assert_ne!(last_accessed(&pool, "sess-3").await, "epoch");
    }

    #[tokio::test]
    async fn corrupt_snapshot_surfaces_decode_error() {
        let pool = pool().await;
        sqlx::query(
            "INSERT INTO conversation_state VALUES ('bad', 1, '{not json', 'now', 'now', 'now')",
        )
        .execute(&pool)
        .await
        .expect("insert");

        let error = SqlConversationRepository::new(pool).peek("bad").await.expect_err("decode");
        assert!(matches!(error, RepositoryError::Decode(_)));
    }
}
