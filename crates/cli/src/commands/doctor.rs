use serde::Serialize;
use serde_json::json;
use tripcover_core::config::{AppConfig, LlmProvider};
use tripcover_db::{connect_with_settings, migrations};

use crate::commands::{block_on, load_config};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

impl CheckStatus {
    fn marker(self) -> &'static str {
        match self {
            Self::Pass => "ok",
            Self::Fail => "fail",
            Self::Skipped => "skip",
        }
    }
}

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl Check {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    overall_status: CheckStatus,
    summary: &'static str,
    checks: Vec<Check>,
}

impl Report {
    fn from_checks(checks: Vec<Check>) -> Self {
        let healthy = checks.iter().all(|check| check.status == CheckStatus::Pass);
        Self {
            overall_status: if healthy { CheckStatus::Pass } else { CheckStatus::Fail },
            summary: if healthy {
                "doctor: all readiness checks passed"
            } else {
                "doctor: one or more readiness checks failed"
            },
            checks,
        }
    }

    fn render(&self) -> String {
        std::iter::once(self.summary.to_owned())
            .chain(self.checks.iter().map(|check| {
                format!("- [{}] {}: {}", check.status.marker(), check.name, check.details)
            }))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn run(json_output: bool) -> String {
    let report = Report::from_checks(run_checks());
    if !json_output {
        return report.render();
    }
    serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
        json!({
            "overall_status": CheckStatus::Fail,
            "summary": "doctor serialization failed",
            "error": error.to_string(),
        })
        .to_string()
    })
}

/// Checks after config only run when the config loads.
fn run_checks() -> Vec<Check> {
    let config = match load_config() {
        Ok(config) => config,
        Err(failure) => {
            let skipped = |name| Check {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_owned(),
            };
            return vec![
                Check::fail("config_validation", failure.message),
                skipped("language_model"),
                skipped("database"),
            ];
        }
    };

    vec![
        Check::pass("config_validation", "configuration loaded and validated"),
        language_model(&config),
        database(&config),
    ]
}

fn language_model(config: &AppConfig) -> Check {
    let llm = &config.llm;
    match llm.provider {
        LlmProvider::Keyword => Check::pass("language_model", "keyword intent rules, no model calls"),
        LlmProvider::Ollama => Check::pass(
            "language_model",
            format!(
                "ollama model `{}` at {} ({} retries, {}s timeout)",
                llm.model,
                llm.base_url.as_deref().unwrap_or("<unset>"),
                llm.max_retries,
                llm.timeout_secs
            ),
        ),
    }
}

/// Pending migrations fail the check; `tripcover migrate` applies them.
fn database(config: &AppConfig) -> Check {
    let probe = block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;
        let pending = migrations::pending_count(&pool)
            .await
            .map_err(|error| format!("failed to read migration history: {error}"));
        pool.close().await;
        pending
    });

    match probe {
        Err(failure) => Check::fail("database", failure.message),
        Ok(Err(details)) => Check::fail("database", details),
        Ok(Ok(0)) => Check::pass(
            "database",
            format!("connected using `{}`, schema is current", config.database.url),
        ),
        Ok(Ok(pending)) => {
            Check::fail("database", format!("{pending} pending migration(s); run `tripcover migrate`"))
        }
    }
}
