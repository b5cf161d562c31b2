use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;
use tripcover_agent::llm::LlmClient;
use tripcover_core::config::LlmConfig;

const RETRY_BACKOFF_MS: u64 = 250;

/// `LlmClient` over the Ollama generate endpoint, asking for JSON output.
pub struct OllamaClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow!("llm.base_url is required for the ollama provider"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build ollama http client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, AttemptError> {
        let body = GenerateRequest { model: &self.model, prompt, stream: false, format: "json" };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| AttemptError::Retryable(format!("ollama request failed: {error}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::Retryable(format!("ollama returned {status}")));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(format!("ollama returned {status}")));
        }

        let payload: GenerateResponse = response.json().await.map_err(|error| {
            AttemptError::Fatal(format!("failed to decode ollama response: {error}"))
        })?;
        Ok(payload.response)
    }
}

enum AttemptError {
    Retryable(String),
    Fatal(String),
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.generate_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(AttemptError::Fatal(detail)) => bail!(detail),
                Err(AttemptError::Retryable(detail)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.ollama.retry",
                        correlation_id = "llm",
                        attempt,
                        error = %detail,
                        "retrying ollama request"
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt)))
                        .await;
                }
                Err(AttemptError::Retryable(detail)) => bail!(detail),
            }
        }
    }
}
