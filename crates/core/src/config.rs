use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flows::DEFAULT_LOOP_BUDGET;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub conversation: ConversationConfig,
    pub pricing: PricingConfig,
    pub payment: PaymentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub loop_budget: u32,
    pub low_confidence_threshold: f32,
    pub history_window: usize,
    pub default_departure_country: String,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub currency: String,
    pub use_insurer_reference: bool,
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub checkout_base_url: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Deterministic keyword classification, no model calls.
    Keyword,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub loop_budget: Option<u32>,
    pub currency: Option<String>,
    pub use_insurer_reference: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tripcover.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Keyword,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            conversation: ConversationConfig {
                loop_budget: DEFAULT_LOOP_BUDGET,
                low_confidence_threshold: 0.4,
                history_window: 6,
                default_departure_country: "SG".to_string(),
            },
            pricing: PricingConfig { currency: "USD".to_string(), use_insurer_reference: false },
            payment: PaymentConfig {
                checkout_base_url: "https://checkout.sandbox.tripcover.local/pay".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Ollama => "ollama",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected keyword|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Layers defaults, then the config file, then `TRIPCOVER_*` variables,
    /// then explicit overrides, and validates the result.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => read_patch(&path)?.apply(&mut config),
            None if options.require_file => {
                return Err(ConfigError::MissingConfigFile(
                    options.config_path.unwrap_or_else(|| PathBuf::from("tripcover.toml")),
                ));
            }
            None => {}
        }

        config.apply_env()?;
        options.overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        let database = &mut self.database;
        set(&mut database.url, env_text("TRIPCOVER_DATABASE_URL"));
        set(&mut database.max_connections, env_parsed("TRIPCOVER_DATABASE_MAX_CONNECTIONS")?);
        set(&mut database.timeout_secs, env_parsed("TRIPCOVER_DATABASE_TIMEOUT_SECS")?);

        let llm = &mut self.llm;
        if let Some(provider) = env_text("TRIPCOVER_LLM_PROVIDER") {
            llm.provider = provider.parse()?;
        }
        set_some(&mut llm.api_key, env_text("TRIPCOVER_LLM_API_KEY").map(SecretString::from));
        set_some(&mut llm.base_url, env_text("TRIPCOVER_LLM_BASE_URL"));
        set(&mut llm.model, env_text("TRIPCOVER_LLM_MODEL"));
        set(&mut llm.timeout_secs, env_parsed("TRIPCOVER_LLM_TIMEOUT_SECS")?);
        set(&mut llm.max_retries, env_parsed("TRIPCOVER_LLM_MAX_RETRIES")?);

        let server = &mut self.server;
        set(&mut server.bind_address, env_text("TRIPCOVER_SERVER_BIND_ADDRESS"));
        set(&mut server.port, env_parsed("TRIPCOVER_SERVER_PORT")?);
        set(
            &mut server.graceful_shutdown_secs,
            env_parsed("TRIPCOVER_SERVER_GRACEFUL_SHUTDOWN_SECS")?,
        );

        let conversation = &mut self.conversation;
        set(&mut conversation.loop_budget, env_parsed("TRIPCOVER_CONVERSATION_LOOP_BUDGET")?);
        set(
            &mut conversation.low_confidence_threshold,
            env_parsed("TRIPCOVER_CONVERSATION_LOW_CONFIDENCE_THRESHOLD")?,
        );
        set(
            &mut conversation.history_window,
            env_parsed("TRIPCOVER_CONVERSATION_HISTORY_WINDOW")?,
        );
        set(
            &mut conversation.default_departure_country,
            env_text("TRIPCOVER_CONVERSATION_DEFAULT_DEPARTURE_COUNTRY"),
        );

        set(&mut self.pricing.currency, env_text("TRIPCOVER_PRICING_CURRENCY"));
        set(
            &mut self.pricing.use_insurer_reference,
            env_parsed("TRIPCOVER_PRICING_USE_INSURER_REFERENCE")?,
        );

        set(&mut self.payment.checkout_base_url, env_text("TRIPCOVER_PAYMENT_CHECKOUT_BASE_URL"));

        // The short LOG_* spellings are accepted as aliases.
        set(
            &mut self.logging.level,
            env_text("TRIPCOVER_LOGGING_LEVEL").or_else(|| env_text("TRIPCOVER_LOG_LEVEL")),
        );
        if let Some(format) =
            env_text("TRIPCOVER_LOGGING_FORMAT").or_else(|| env_text("TRIPCOVER_LOG_FORMAT"))
        {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let database_url = self.database.url.trim();
        require(
            database_url.starts_with("sqlite://")
                || database_url.starts_with("sqlite::")
                || database_url == ":memory:",
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        )?;
        require(
            self.database.max_connections > 0,
            "database.max_connections must be greater than zero",
        )?;
        require(
            (1..=300).contains(&self.database.timeout_secs),
            "database.timeout_secs must be in range 1..=300",
        )?;

        require(
            (1..=300).contains(&self.llm.timeout_secs),
            "llm.timeout_secs must be in range 1..=300",
        )?;
        if self.llm.provider == LlmProvider::Ollama {
            require(
                self.llm.base_url.as_deref().is_some_and(|url| !url.trim().is_empty()),
                "llm.base_url is required for ollama provider",
            )?;
            require(
                !self.llm.model.trim().is_empty(),
                "llm.model is required for ollama provider",
            )?;
        }

        require(self.server.port > 0, "server.port must be greater than zero")?;
        require(
            self.server.graceful_shutdown_secs > 0,
            "server.graceful_shutdown_secs must be greater than zero",
        )?;

        require(
            (1..=100).contains(&self.conversation.loop_budget),
            "conversation.loop_budget must be in range 1..=100",
        )?;
        require(
            (0.0..=1.0).contains(&self.conversation.low_confidence_threshold),
            "conversation.low_confidence_threshold must be between 0.0 and 1.0",
        )?;
        require(
            is_code(&self.conversation.default_departure_country, 2, |c| c.is_ascii_alphabetic()),
            "conversation.default_departure_country must be a two-letter ISO code",
        )?;

        require(
            is_code(&self.pricing.currency, 3, |c| c.is_ascii_uppercase()),
            "pricing.currency must be a three-letter uppercase ISO code",
        )?;

        let checkout = self.payment.checkout_base_url.trim();
        require(
            checkout.starts_with("http://") || checkout.starts_with("https://"),
            "payment.checkout_base_url must start with http:// or https://",
        )?;

        require(
            matches!(
                self.logging.level.trim().to_ascii_lowercase().as_str(),
                "trace" | "debug" | "info" | "warn" | "error"
            ),
            "logging.level must be one of trace|debug|info|warn|error",
        )
    }
}

impl ConfigOverrides {
    fn apply(self, config: &mut AppConfig) {
        set(&mut config.database.url, self.database_url);
        set(&mut config.logging.level, self.log_level);
        set(&mut config.llm.provider, self.llm_provider);
        set(&mut config.llm.model, self.llm_model);
        set(&mut config.conversation.loop_budget, self.loop_budget);
        set(&mut config.pricing.currency, self.currency);
        set(&mut config.pricing.use_insurer_reference, self.use_insurer_reference);
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn require(holds: bool, message: &str) -> Result<(), ConfigError> {
    if holds {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.to_owned()))
    }
}

fn is_code(value: &str, len: usize, accept: fn(char) -> bool) -> bool {
    let value = value.trim();
    value.len() == len && value.chars().all(accept)
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => ["tripcover.toml", "config/tripcover.toml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|path| path.exists()),
    }
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&interpolate(&raw)?)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Expands `${NAME}` from the process environment.
fn interpolate(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        output.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &after[..close];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_owned() })?;
        output.push_str(&value);
        rest = &after[close + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn env_text(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    env_text(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_owned(), value })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    conversation: Option<ConversationPatch>,
    pricing: Option<PricingPatch>,
    payment: Option<PaymentPatch>,
    logging: Option<LoggingPatch>,
}

impl ConfigPatch {
    fn apply(self, config: &mut AppConfig) {
        if let Some(database) = self.database {
            set(&mut config.database.url, database.url);
            set(&mut config.database.max_connections, database.max_connections);
            set(&mut config.database.timeout_secs, database.timeout_secs);
        }
        if let Some(llm) = self.llm {
            set(&mut config.llm.provider, llm.provider);
            set_some(&mut config.llm.api_key, llm.api_key.map(SecretString::from));
            set_some(&mut config.llm.base_url, llm.base_url);
            set(&mut config.llm.model, llm.model);
            set(&mut config.llm.timeout_secs, llm.timeout_secs);
            set(&mut config.llm.max_retries, llm.max_retries);
        }
        if let Some(server) = self.server {
            set(&mut config.server.bind_address, server.bind_address);
            set(&mut config.server.port, server.port);
            set(&mut config.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }
        if let Some(conversation) = self.conversation {
            let target = &mut config.conversation;
            set(&mut target.loop_budget, conversation.loop_budget);
            set(&mut target.low_confidence_threshold, conversation.low_confidence_threshold);
            set(&mut target.history_window, conversation.history_window);
            set(&mut target.default_departure_country, conversation.default_departure_country);
        }
        if let Some(pricing) = self.pricing {
            set(&mut config.pricing.currency, pricing.currency);
            set(&mut config.pricing.use_insurer_reference, pricing.use_insurer_reference);
        }
        if let Some(payment) = self.payment {
            set(&mut config.payment.checkout_base_url, payment.checkout_base_url);
        }
        if let Some(logging) = self.logging {
            set(&mut config.logging.level, logging.level);
            set(&mut config.logging.format, logging.format);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    loop_budget: Option<u32>,
    low_confidence_threshold: Option<f32>,
    history_window: Option<usize>,
    default_departure_country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    currency: Option<String>,
    use_insurer_reference: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentPatch {
    checkout_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
