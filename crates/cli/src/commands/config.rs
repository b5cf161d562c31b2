use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use toml::Value;
use tripcover_core::config::{AppConfig, LoadOptions};

/// One effective setting with the environment variable that can override it.
struct Entry {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

impl Entry {
    fn new(key: &'static str, value: impl ToString, env_key: &'static str) -> Self {
        Self { key, value: value.to_string(), env_key }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(
            entry.key,
            entry.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }
    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    vec![
        Entry::new("database.url", &config.database.url, "TRIPCOVER_DATABASE_URL"),
        Entry::new(
            "database.max_connections",
            config.database.max_connections,
            "TRIPCOVER_DATABASE_MAX_CONNECTIONS",
        ),
        Entry::new(
            "database.timeout_secs",
            config.database.timeout_secs,
            "TRIPCOVER_DATABASE_TIMEOUT_SECS",
        ),
        Entry::new("llm.provider", config.llm.provider.as_str(), "TRIPCOVER_LLM_PROVIDER"),
        Entry::new("llm.model", &config.llm.model, "TRIPCOVER_LLM_MODEL"),
        Entry::new(
            "llm.base_url",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
            "TRIPCOVER_LLM_BASE_URL",
        ),
        Entry::new("llm.api_key", redact(config.llm.api_key.as_ref()), "TRIPCOVER_LLM_API_KEY"),
        Entry::new("llm.timeout_secs", config.llm.timeout_secs, "TRIPCOVER_LLM_TIMEOUT_SECS"),
        Entry::new("llm.max_retries", config.llm.max_retries, "TRIPCOVER_LLM_MAX_RETRIES"),
        Entry::new(
            "server.bind_address",
            &config.server.bind_address,
            "TRIPCOVER_SERVER_BIND_ADDRESS",
        ),
        Entry::new("server.port", config.server.port, "TRIPCOVER_SERVER_PORT"),
        Entry::new(
            "conversation.loop_budget",
            config.conversation.loop_budget,
            "TRIPCOVER_CONVERSATION_LOOP_BUDGET",
        ),
        Entry::new(
            "conversation.low_confidence_threshold",
            config.conversation.low_confidence_threshold,
            "TRIPCOVER_CONVERSATION_LOW_CONFIDENCE_THRESHOLD",
        ),
        Entry::new(
            "conversation.history_window",
            config.conversation.history_window,
            "TRIPCOVER_CONVERSATION_HISTORY_WINDOW",
        ),
        Entry::new(
            "conversation.default_departure_country",
            &config.conversation.default_departure_country,
            "TRIPCOVER_CONVERSATION_DEFAULT_DEPARTURE_COUNTRY",
        ),
        Entry::new("pricing.currency", &config.pricing.currency, "TRIPCOVER_PRICING_CURRENCY"),
        Entry::new(
            "pricing.use_insurer_reference",
            config.pricing.use_insurer_reference,
            "TRIPCOVER_PRICING_USE_INSURER_REFERENCE",
        ),
        Entry::new(
            "payment.checkout_base_url",
            &config.payment.checkout_base_url,
            "TRIPCOVER_PAYMENT_CHECKOUT_BASE_URL",
        ),
        Entry::new("logging.level", &config.logging.level, "TRIPCOVER_LOGGING_LEVEL"),
        Entry::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            "TRIPCOVER_LOGGING_FORMAT",
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["tripcover.toml", "config/tripcover.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a short prefix such as `sk-` or `pk_` so operators can tell which
/// key is loaded without printing it.
fn redact(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    match trimmed.find(['-', '_']) {
        Some(index) if index <= 4 => format!("{}***", &trimmed[..=index]),
        _ => "<redacted>".to_string(),
    }
}
