//! Conversational runtime for the travel insurance assistant.
//!
//! Each inbound message runs a bounded loop: classify the intent, route on
//! the persisted conversation state, run one capability node, checkpoint,
//! and route again until the turn ends or a human is needed.
//!
//! Language models only translate text into intents and slot candidates.
//! Prices, eligibility and policy outcomes are decided by deterministic code
//! in `tripcover-core`.

pub mod conversation;
pub mod documents;
pub mod guardrails;
pub mod integrations;
pub mod llm;
pub mod payment;
pub mod runtime;

pub use runtime::{
    AgentRuntime, Attachment, Clock, FixedClock, InboundMessage, NodeOutcome, RuntimeSettings,
    SystemClock, TurnResponse,
};
