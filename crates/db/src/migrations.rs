use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of known migrations that have not been applied successfully.
pub async fn pending_count(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let history_tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    let applied: Vec<i64> = if history_tables == 0 {
        Vec::new()
    } else {
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
    };

    Ok(MIGRATOR
        .iter()
        .filter(|migration| !migration.migration_type.is_down_migration())
        .filter(|migration| !applied.contains(&migration.version))
        .count())
}

#[cfg(test)]
mod tests {
    use super::{pending_count, run_pending, MIGRATOR};
    use crate::{connect_with_settings, DbPool};

    /// Tables and indexes owned by the migrations, with their DDL.
    async fn schema(pool: &DbPool) -> Vec<(String, String)> {
        sqlx::query_as(
            "SELECT name, IFNULL(sql, '') FROM sqlite_master
             WHERE type IN ('table', 'index')
               AND (name LIKE 'conversation_state%' OR name LIKE 'issued_policy%'
                    OR name LIKE 'idx_%')
             ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("schema")
    }

    #[tokio::test]
    async fn baseline_creates_session_and_policy_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let names: Vec<String> = schema(&pool).await.into_iter().map(|(name, _)| name).collect();
        assert!(names.contains(&"conversation_state".to_owned()));
        assert!(names.contains(&"issued_policy".to_owned()));
    }

    #[tokio::test]
    async fn pending_count_drops_to_zero_after_running() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        assert!(pending_count(&pool).await.expect("pending before") > 0);

        run_pending(&pool).await.expect("run migrations");
        assert_eq!(pending_count(&pool).await.expect("pending after"), 0);
    }

    #[tokio::test]
    async fn undo_then_redo_restores_the_same_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        let applied = schema(&pool).await;
        assert_eq!(applied.len(), 4);

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(schema(&pool).await.is_empty());
        assert_eq!(pending_count(&pool).await.expect("pending"), 2);

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(schema(&pool).await, applied);
    }
}
