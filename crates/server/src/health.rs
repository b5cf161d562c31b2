use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use tripcover_db::{migrations, DbPool};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub readiness: Readiness,
    pub detail: String,
}

impl Probe {
    fn ready(detail: impl Into<String>) -> Self {
        Self { readiness: Readiness::Ready, detail: detail.into() }
    }

    fn degraded(probe: &'static str, detail: String) -> Self {
        warn!(
            event_name = "system.health.degraded",
            correlation_id = "health",
            probe,
            detail = %detail,
            "health probe degraded"
        );
        Self { readiness: Readiness::Degraded, detail }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub readiness: Readiness,
    pub session_store: Probe,
    pub schema: Probe,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// Ready only when the session store answers and every migration is applied.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let session_store = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.db_pool)
        .await
    {
        Ok(_) => Probe::ready("session store reachable"),
        Err(error) => {
            Probe::degraded("session_store", format!("session store query failed: {error}"))
        }
    };
    let schema = match migrations::pending_count(&state.db_pool).await {
        Ok(0) => Probe::ready("schema current"),
        Ok(pending) => Probe::degraded("schema", format!("{pending} migration(s) pending")),
        Err(error) => Probe::degraded("schema", format!("migration history unreadable: {error}")),
    };

    let ready = [&session_store, &schema].iter().all(|probe| probe.readiness == Readiness::Ready);
    let report = HealthReport {
        readiness: if ready { Readiness::Ready } else { Readiness::Degraded },
        session_store,
        schema,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use tripcover_db::{connect_with_settings, migrations};

    use crate::health::{health, HealthState, Readiness};

    #[tokio::test]
    async fn ready_once_migrations_are_applied() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrate");

        let (status, Json(report)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.readiness, Readiness::Ready);
        assert_eq!(report.schema.readiness, Readiness::Ready);
        pool.close().await;
    }

    #[tokio::test]
    async fn pending_migrations_degrade_readiness() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");

        let (status, Json(report)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.session_store.readiness, Readiness::Ready);
        assert_eq!(report.schema.readiness, Readiness::Degraded);
        assert!(report.schema.detail.contains("pending"));
        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_reports_session_store_degraded() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        pool.close().await;

        let (status, Json(report)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.readiness, Readiness::Degraded);
        assert_eq!(report.session_store.readiness, Readiness::Degraded);
    }
}
