use serde::{Deserialize, Serialize};

/// User intent, decoded once per inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    ProvideTripInfo,
    Confirm,
    Deny,
    Purchase,
    ModifyTrip,
    PaymentStatus,
    Cancel,
    DocumentUpload,
    PolicyQuestion,
    Claims,
    Handoff,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 13] = [
        Intent::Greeting,
        Intent::ProvideTripInfo,
        Intent::Confirm,
        Intent::Deny,
        Intent::Purchase,
        Intent::ModifyTrip,
        Intent::PaymentStatus,
        Intent::Cancel,
        Intent::DocumentUpload,
        Intent::PolicyQuestion,
        Intent::Claims,
        Intent::Handoff,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::ProvideTripInfo => "provide_trip_info",
            Self::Confirm => "confirm",
            Self::Deny => "deny",
            Self::Purchase => "purchase",
            Self::ModifyTrip => "modify_trip",
            Self::PaymentStatus => "payment_status",
            Self::Cancel => "cancel",
            Self::DocumentUpload => "document_upload",
            Self::PolicyQuestion => "policy_question",
            Self::Claims => "claims",
            Self::Handoff => "handoff",
            Self::Unknown => "unknown",
        }
    }

    /// Decodes a classifier label. Anything unrecognised becomes `Unknown`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "greeting" | "greet" | "hello" => Self::Greeting,
            "provide_trip_info" | "trip_info" | "quote" | "get_quote" | "new_quote" => {
                Self::ProvideTripInfo
            }
            "confirm" | "affirm" | "yes" => Self::Confirm,
            "deny" | "negate" | "no" => Self::Deny,
            "purchase" | "buy" | "checkout" | "retry_payment" => Self::Purchase,
            "modify_trip" | "change_trip" | "update_trip" => Self::ModifyTrip,
            "payment_status" | "payment_complete" | "paid" => Self::PaymentStatus,
            "cancel" | "cancel_payment" => Self::Cancel,
            "document_upload" | "upload_document" | "document" => Self::DocumentUpload,
            "policy_question" | "policy_explanation" | "coverage_question" | "faq" => {
                Self::PolicyQuestion
            }
            "claims" | "claim" | "claims_guidance" => Self::Claims,
            "handoff" | "human" | "human_handoff" | "escalate" | "agent" => Self::Handoff,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    pub intent: Intent,
    pub confidence: f32,
}

impl ClassifiedIntent {
    pub fn new(intent: Intent, confidence: f32) -> Self {
        Self { intent, confidence: confidence.clamp(0.0, 1.0) }
    }

    pub fn unknown() -> Self {
        Self::new(Intent::Unknown, 0.0)
    }
}

/// Per-turn inputs to the router that do not live in the conversation state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteSignals {
    pub intent: Intent,
    pub confidence: f32,
    pub low_confidence: bool,
}

impl RouteSignals {
    /// An `Unknown` intent is never treated as low confidence; it falls
    /// through to a clarification instead of a handoff.
    pub fn new(classified: ClassifiedIntent, low_confidence_threshold: f32) -> Self {
        Self {
            intent: classified.intent,
            confidence: classified.confidence,
            low_confidence: classified.intent != Intent::Unknown
                && classified.confidence < low_confidence_threshold,
        }
    }
}

impl Default for RouteSignals {
    fn default() -> Self {
        Self { intent: Intent::Unknown, confidence: 0.0, low_confidence: false }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SlotCollector,
    GeoMapper,
    Pricing,
    Payment,
    Document,
    PolicyQa,
    Claims,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlotCollector => "slot_collector",
            Self::GeoMapper => "geo_mapper",
            Self::Pricing => "pricing",
            Self::Payment => "payment",
            Self::Document => "document",
            Self::PolicyQa => "policy_qa",
            Self::Claims => "claims",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    LoopBudgetExhausted,
    LowConfidence,
    HandoffRequested,
    PricingFailure,
    PaymentFailure,
    RepeatedFailure,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoopBudgetExhausted => "loop_budget_exhausted",
            Self::LowConfidence => "low_confidence",
            Self::HandoffRequested => "handoff_requested",
            Self::PricingFailure => "pricing_failure",
            Self::PaymentFailure => "payment_failure",
            Self::RepeatedFailure => "repeated_failure",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "target")]
pub enum RouteDecision {
    Dispatch(Capability),
    Escalate(EscalationReason),
    EndOfTurn,
}

impl RouteDecision {
    pub fn label(&self) -> String {
        match self {
            Self::Dispatch(capability) => capability.as_str().to_owned(),
            Self::Escalate(reason) => format!("escalate:{}", reason.as_str()),
            Self::EndOfTurn => "end_of_turn".to_owned(),
        }
    }
}
