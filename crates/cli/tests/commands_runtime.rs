use std::env;
use std::sync::{Mutex, OnceLock};

use chrono::NaiveDate;
use serde_json::Value;
use tempfile::TempDir;
use tripcover_cli::commands::quote::QuoteArgs;
use tripcover_cli::commands::{doctor, migrate, quote};

#[test]
fn migrate_applies_pending_migrations_once() {
    let dir = TempDir::new().expect("tempdir");
    let database_url = file_database(&dir);

    with_env(&[("TRIPCOVER_DATABASE_URL", database_url.as_str())], || {
        let first = migrate::run();
        assert_eq!(first.exit_code, 0, "expected successful migrate run");
        let payload = parse_payload(&first.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or_default().starts_with("applied"));

        let second = migrate::run();
        assert_eq!(second.exit_code, 0);
        assert_eq!(parse_payload(&second.output)["message"], "schema already current");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_overrides() {
    with_env(&[("TRIPCOVER_CONVERSATION_LOOP_BUDGET", "0")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_flags_pending_migrations_until_migrate_runs() {
    let dir = TempDir::new().expect("tempdir");
    let database_url = file_database(&dir);

    with_env(&[("TRIPCOVER_DATABASE_URL", database_url.as_str())], || {
        let before: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(before["overall_status"], "fail");
        let database = check(&before, "database");
        assert_eq!(database["status"], "fail");
        assert!(database["details"].as_str().unwrap_or_default().contains("tripcover migrate"));

        assert_eq!(migrate::run().exit_code, 0);

        let after: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(after["overall_status"], "pass");
        assert_eq!(check(&after, "language_model")["status"], "pass");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("TRIPCOVER_LLM_PROVIDER", "telepathy")], || {
        let report = doctor::run(false);
        assert!(report.starts_with("doctor: one or more readiness checks failed"));
        assert!(report.contains("- [fail] config_validation"));
        assert!(report.contains("- [skip] database"));
    });
}

#[test]
fn quote_prints_all_tiers_with_standard_recommended() {
    with_env(&[], || {
        let result = quote::run(&japan_trip(false, Some("usd")));
        assert_eq!(result.exit_code, 0, "expected a priced quote");

        let payload = parse_payload(&result.output);
        let tiers = payload["quote"]["tiers"].as_object().expect("tiers");
        assert_eq!(tiers.len(), 3);
        assert_eq!(payload["quote"]["recommended_tier"], "standard");
        assert_eq!(tiers["elite"]["currency"], "USD");
        assert!(payload.get("trace").is_none());
    });
}

#[test]
fn adventure_quote_drops_standard_and_explains_pricing() {
    with_env(&[], || {
        let mut args = japan_trip(true, Some("USD"));
        args.explain = true;

        let payload = parse_payload(&quote::run(&args).output);

        let tiers = payload["quote"]["tiers"].as_object().expect("tiers");
        assert!(!tiers.contains_key("standard"));
        assert_eq!(payload["quote"]["recommended_tier"], "elite");
        let stages = payload["trace"]
            .as_array()
            .expect("trace")
            .iter()
            .filter_map(|step| step["stage"].as_str())
            .collect::<Vec<_>>();
        assert_eq!(stages.first(), Some(&"area"));
        assert_eq!(stages.iter().filter(|stage| **stage == "traveler").count(), 2);
    });
}

#[test]
fn quote_uses_configured_currency_when_none_is_given() {
    with_env(&[("TRIPCOVER_PRICING_CURRENCY", "EUR")], || {
        let payload = parse_payload(&quote::run(&japan_trip(false, None)).output);
        assert_eq!(payload["quote"]["tiers"]["premier"]["currency"], "EUR");
    });
}

#[test]
fn quote_reports_pricing_rule_violations() {
    with_env(&[], || {
        let mut args = japan_trip(false, Some("USD"));
        args.return_date = date(2026, 12, 1);

        let result = quote::run(&args);

        assert_eq!(result.exit_code, 6);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "trip_too_long");
    });
}

fn japan_trip(adventure: bool, currency: Option<&str>) -> QuoteArgs {
    QuoteArgs {
        destination: "Japan".to_owned(),
        depart: date(2026, 3, 1),
        return_date: date(2026, 3, 10),
        ages: vec![35.0, 8.0],
        adventure,
        currency: currency.map(str::to_owned),
        explain: false,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

fn file_database(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("tripcover.db").display())
}

fn check<'a>(report: &'a Value, name: &str) -> &'a Value {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .expect("check present")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TRIPCOVER_DATABASE_URL",
        "TRIPCOVER_DATABASE_MAX_CONNECTIONS",
        "TRIPCOVER_DATABASE_TIMEOUT_SECS",
        "TRIPCOVER_LLM_PROVIDER",
        "TRIPCOVER_LLM_API_KEY",
        "TRIPCOVER_LLM_BASE_URL",
        "TRIPCOVER_LLM_MODEL",
        "TRIPCOVER_CONVERSATION_LOOP_BUDGET",
        "TRIPCOVER_PRICING_CURRENCY",
        "TRIPCOVER_PRICING_USE_INSURER_REFERENCE",
        "TRIPCOVER_PAYMENT_CHECKOUT_BASE_URL",
        "TRIPCOVER_LOGGING_LEVEL",
        "TRIPCOVER_LOGGING_FORMAT",
        "TRIPCOVER_LOG_LEVEL",
        "TRIPCOVER_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
