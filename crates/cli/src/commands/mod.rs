pub mod config;
pub mod doctor;
pub mod migrate;
pub mod quote;

use std::future::Future;

use serde::Serialize;
use serde_json::json;
use tripcover_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// Why a command stopped. `class` is the stable code scripts match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl CommandFailure {
    pub fn new(class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { class, message: message.into(), exit_code }
    }
}

impl CommandResult {
    /// Wraps a one-line status message in the JSON envelope.
    pub fn from_outcome(command: &str, outcome: Result<String, CommandFailure>) -> Self {
        match outcome {
            Ok(message) => Self::success(command, message),
            Err(failure) => Self::failure(command, failure),
        }
    }

    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let envelope = json!({
            "command": command,
            "status": "ok",
            "message": message.into(),
        });
        Self { exit_code: 0, output: envelope.to_string() }
    }

    pub fn failure(command: &str, failure: CommandFailure) -> Self {
        let envelope = json!({
            "command": command,
            "status": "error",
            "error_class": failure.class,
            "message": failure.message,
        });
        Self { exit_code: failure.exit_code, output: envelope.to_string() }
    }

    /// Prints a structured payload as pretty JSON.
    pub fn payload<T: Serialize>(command: &str, payload: &T) -> Self {
        match serde_json::to_string_pretty(payload) {
            Ok(output) => Self { exit_code: 0, output },
            Err(error) => {
                Self::failure(command, CommandFailure::new("serialization", error.to_string(), 7))
            }
        }
    }
}

pub(crate) fn load_config() -> Result<AppConfig, CommandFailure> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandFailure::new("config_validation", format!("configuration issue: {error}"), 2)
    })
}

/// Commands are synchronous; database work runs on a throwaway runtime.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output, CommandFailure> {
    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandFailure::new(
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;
    Ok(runtime.block_on(future))
}
