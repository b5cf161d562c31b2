use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use tripcover_agent::integrations::SandboxPaymentGateway;
use tripcover_agent::llm::LlmNlu;
use tripcover_agent::runtime::{AgentRuntime, RuntimeSettings};
use tripcover_core::config::{AppConfig, ConfigError, LlmProvider};
use tripcover_db::{
    connect_with_settings, migrations, DbPool, SqlConversationRepository, SqlPolicyRepository,
};

use crate::audit::TracingAuditSink;
use crate::ollama::OllamaClient;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent_runtime: Arc<AgentRuntime>,
    pub payment_gateway: Arc<SandboxPaymentGateway>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    LlmClient(String),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let payment_gateway = Arc::new(SandboxPaymentGateway::new(&config.payment.checkout_base_url));
    let mut runtime = AgentRuntime::new(
        Arc::new(SqlConversationRepository::new(db_pool.clone())),
        Arc::new(SqlPolicyRepository::new(db_pool.clone())),
        RuntimeSettings::from_config(&config),
    )
    .with_payment_gateway(payment_gateway.clone())
    .with_audit_sink(Arc::new(TracingAuditSink));

    if config.llm.provider == LlmProvider::Ollama {
        let client = OllamaClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::LlmClient(error.to_string()))?;
        let nlu = Arc::new(LlmNlu::new(client));
        runtime = runtime.with_classifier(nlu.clone()).with_extractor(nlu);
    }
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        loop_budget = config.conversation.loop_budget,
        "agent runtime wired"
    );

    Ok(Application {
        config,
        db_pool,
        agent_runtime: Arc::new(runtime),
        payment_gateway,
    })
}

#[cfg(test)]
mod tests {
    use tripcover_agent::runtime::InboundMessage;
    use tripcover_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_loop_budget() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                loop_budget: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("loop_budget"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_runs_a_turn_against_sqlite() {
        let app = bootstrap(overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with defaults");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('conversation_state', 'issued_policy')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 2);

        let turn = app
            .agent_runtime
            .send_message("boot-1", InboundMessage::text("I'm going to Japan"))
            .await
            .expect("turn");
        assert_eq!(turn.state_summary.destination.as_deref(), Some("Japan"));

        let summary = app.agent_runtime.session_summary("boot-1").await.expect("summary");
        assert!(summary.is_some());

        app.db_pool.close().await;
    }
}
