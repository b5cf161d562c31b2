use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tripcover_core::domain::trip::TripSlots;
use tripcover_core::flows::{ClassifiedIntent, Intent};
use tripcover_core::{Message, Role};

use crate::conversation::KeywordIntentClassifier;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Error)]
pub enum NluError {
    #[error("language model call failed: {0}")]
    Llm(String),
    #[error("language model returned unusable output: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        message: &str,
        recent_history: &[Message],
    ) -> Result<ClassifiedIntent, NluError>;
}

/// Best-effort slot values pulled from one utterance. Dates stay as text so
/// the collector validates them with the same parser it uses for raw input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTrip {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub departure_date: Option<String>,
    #[serde(default)]
    pub return_date: Option<String>,
    #[serde(default)]
    pub traveler_ages: Option<Vec<f64>>,
    #[serde(default)]
    pub adventure_sports: Option<bool>,
}

impl ExtractedTrip {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[async_trait]
pub trait TripExtractor: Send + Sync {
    async fn extract(&self, message: &str, current: &TripSlots) -> Result<ExtractedTrip, NluError>;
}

/// Offline extractor. Returns nothing so the slot collector relies on its
/// own deterministic parsing of the raw utterance.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTripExtractor;

#[async_trait]
impl TripExtractor for NoopTripExtractor {
    async fn extract(
        &self,
        _message: &str,
        _current: &TripSlots,
    ) -> Result<ExtractedTrip, NluError> {
        Ok(ExtractedTrip::default())
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(
        &self,
        message: &str,
        _recent_history: &[Message],
    ) -> Result<ClassifiedIntent, NluError> {
        Ok(self.classify_text(message))
    }
}

/// Intent classification and slot extraction through a language model that
/// answers in JSON. The model only translates text; it never decides prices
/// or policy outcomes.
pub struct LlmNlu<C> {
    client: C,
}

#[derive(Deserialize)]
struct IntentReply {
    intent: String,
    #[serde(default)]
    confidence: f32,
}

impl<C> LlmNlu<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn intent_prompt(message: &str, recent_history: &[Message]) -> String {
        let labels = Intent::ALL.iter().map(Intent::as_str).collect::<Vec<_>>().join(", ");
        let history = recent_history
            .iter()
            .map(|entry| {
                let speaker = match entry.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                format!("{speaker}: {}", entry.text)
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You classify messages sent to a travel insurance assistant.\n\
             Allowed intents: {labels}.\n\
             Conversation so far:\n{history}\n\
             Latest user message: {message}\n\
             Answer with JSON only: {{\"intent\": \"<label>\", \"confidence\": <0..1>}}"
        )
    }

    fn extraction_prompt(message: &str, current: &TripSlots) -> String {
        let known = serde_json::to_string(current).unwrap_or_else(|_| "{}".to_owned());
        format!(
            "Extract travel details from the user's message for an insurance quote.\n\
             Already known: {known}\n\
             Message: {message}\n\
             Answer with JSON only, omitting unknown fields: {{\"destination\": string, \
             \"departure_date\": string, \"return_date\": string, \"traveler_ages\": [number], \
             \"adventure_sports\": bool}}"
        )
    }
}

#[async_trait]
impl<C> IntentClassifier for LlmNlu<C>
where
    C: LlmClient,
{
    async fn classify(
        &self,
        message: &str,
        recent_history: &[Message],
    ) -> Result<ClassifiedIntent, NluError> {
        let raw = self
            .client
            .complete(&Self::intent_prompt(message, recent_history))
            .await
            .map_err(|error| NluError::Llm(error.to_string()))?;
        let reply: IntentReply = parse_json_object(&raw)?;
        Ok(ClassifiedIntent::new(Intent::from_label(&reply.intent), reply.confidence))
    }
}

#[async_trait]
impl<C> TripExtractor for LlmNlu<C>
where
    C: LlmClient,
{
    async fn extract(&self, message: &str, current: &TripSlots) -> Result<ExtractedTrip, NluError> {
        let raw = self
            .client
            .complete(&Self::extraction_prompt(message, current))
            .await
            .map_err(|error| NluError::Llm(error.to_string()))?;
        parse_json_object(&raw)
    }
}

/// Models often wrap JSON in prose or code fences; only the outermost object
/// is decoded.
fn parse_json_object<T>(raw: &str) -> Result<T, NluError>
where
    T: for<'de> Deserialize<'de>,
{
    let start = raw.find('{');
    let end = raw.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => return Err(NluError::Malformed(format!("no JSON object in `{}`", raw.trim()))),
    };
    serde_json::from_str(body).map_err(|error| NluError::Malformed(error.to_string()))
}
