use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::document::DocumentExtraction;
use crate::domain::payment::{PaymentPhase, PaymentSession};
use crate::domain::policy::IssuedPolicy;
use crate::domain::quote::{Quote, Tier};
use crate::domain::trip::{Preferences, Question, Slot, Travelers, TripSlots};
use crate::errors::DomainError;
use crate::geo::AreaAssignment;

pub const STATE_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueState {
    pub current_question: Option<Question>,
    pub awaiting_confirmation: bool,
    pub confirmation_received: bool,
    #[serde(default)]
    pub failed_attempts: BTreeMap<Slot, u32>,
}

impl DialogueState {
    pub fn ask(&mut self, slot: Slot) {
        self.current_question = Some(Question::Slot(slot));
        self.awaiting_confirmation = false;
    }

    pub fn ask_confirmation(&mut self) {
        self.current_question = Some(Question::Confirmation);
        self.awaiting_confirmation = true;
        self.confirmation_received = false;
    }

    pub fn clear_question(&mut self) {
        self.current_question = None;
        self.awaiting_confirmation = false;
    }

    pub fn pending_slot(&self) -> Option<Slot> {
        self.current_question.and_then(|question| question.slot())
    }

    pub fn has_pending_question(&self) -> bool {
        self.current_question.is_some() || self.awaiting_confirmation
    }

    pub fn record_failure(&mut self, slot: Slot) -> u32 {
        let attempts = self.failed_attempts.entry(slot).or_insert(0);
        *attempts += 1;
        *attempts
    }

    pub fn failures(&self, slot: Slot) -> u32 {
        self.failed_attempts.get(&slot).copied().unwrap_or(0)
    }

    pub fn reset_failures(&mut self, slot: Slot) {
        self.failed_attempts.remove(&slot);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub ready_for_pricing: bool,
    pub pricing_complete: bool,
    pub policy_created: bool,
    pub awaiting_payment_confirmation: bool,
    pub payment_failed: bool,
    pub checkout_url_sent: bool,
    pub document_merged: bool,
    pub escalated: bool,
}

/// Session-scoped dialogue record. Owned by the orchestration layer and
/// checkpointed after every node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub version: u32,
    pub session_id: String,
    pub messages: Vec<Message>,
    pub trip: TripSlots,
    pub travelers: Travelers,
    pub preferences: Preferences,
    pub dialogue: DialogueState,
    pub loop_count: u32,
    pub flags: Flags,
    pub area: Option<AreaAssignment>,
    pub quote: Option<Quote>,
    pub payment: PaymentSession,
    pub policy: Option<IssuedPolicy>,
    pub pending_document: Option<DocumentExtraction>,
    #[serde(default)]
    pub documents: Vec<DocumentExtraction>,
    pub pending_impossibility_notice: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION,
            session_id: session_id.into(),
            messages: Vec::new(),
            trip: TripSlots::default(),
            travelers: Travelers::default(),
            preferences: Preferences::default(),
            dialogue: DialogueState::default(),
            loop_count: 0,
            flags: Flags::default(),
            area: None,
            quote: None,
            payment: PaymentSession::default(),
            policy: None,
            pending_document: None,
            documents: Vec::new(),
            pending_impossibility_notice: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message { role: Role::User, text: text.into() });
    }

    /// Appends an assistant reply, prefixed by any queued impossibility notice.
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        let text = text.into();
        let text = match self.pending_impossibility_notice.take() {
            Some(notice) => format!("{notice}\n\n{text}"),
            None => text,
        };
        self.messages.push(Message { role: Role::Assistant, text });
    }

    pub fn last_message_is_assistant(&self) -> bool {
        matches!(self.messages.last(), Some(Message { role: Role::Assistant, .. }))
    }

    /// The gateway settled the payment but no policy is on record yet.
    pub fn issuance_outstanding(&self) -> bool {
        self.payment.phase == PaymentPhase::Completed && self.policy.is_none()
    }

    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.text.as_str())
    }

    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(|message| message.text.as_str())
    }

    pub fn recent_history(&self, window: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(window);
        &self.messages[start..]
    }

    /// Required slots still empty, in asking order.
    pub fn missing_required_slots(&self) -> Vec<Slot> {
        Slot::REQUIRED
            .into_iter()
            .filter(|slot| match slot {
                Slot::Destination => self.trip.destination.is_none(),
                Slot::DepartureDate => self.trip.departure_date.is_none(),
                Slot::ReturnDate => self.trip.return_date.is_none(),
                Slot::TravelerAges => self.travelers.is_empty(),
                Slot::AdventureSports => self.preferences.adventure_sports.is_none(),
            })
            .collect()
    }

    /// True once the user has started giving trip details and no quote has
    /// been produced yet.
    pub fn is_mid_quote(&self) -> bool {
        let started = !self.trip.is_empty()
            || !self.travelers.is_empty()
            || self.dialogue.has_pending_question();
        started && !self.flags.pricing_complete
    }

    /// Drops the priced snapshot after a trip detail changed. A completed
    /// payment is never rolled back.
    pub fn supersede_quote(&mut self) {
        self.quote = None;
        self.area = None;
        self.flags.pricing_complete = false;
        self.flags.ready_for_pricing = false;
        self.dialogue.confirmation_received = false;
        if self.payment.phase != PaymentPhase::Completed {
            self.payment = PaymentSession::default();
            self.flags.awaiting_payment_confirmation = false;
            self.flags.checkout_url_sent = false;
            self.flags.payment_failed = false;
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.flags.pricing_complete && self.quote.is_none() {
            return Err(DomainError::InvariantViolation(
                "pricing marked complete without a quote".to_owned(),
            ));
        }
        if !self.travelers.is_empty() && self.travelers.adults_count == 0 {
            return Err(DomainError::InvariantViolation(
                "travelers present without an adult".to_owned(),
            ));
        }
        if let (Some(departure), Some(return_date)) =
            (self.trip.departure_date, self.trip.return_date)
        {
            if return_date <= departure {
                return Err(DomainError::InvariantViolation(format!(
                    "return date {return_date} is not after departure {departure}"
                )));
            }
        }
        let confirmation_question = self.dialogue.current_question == Some(Question::Confirmation);
        if confirmation_question != self.dialogue.awaiting_confirmation {
            return Err(DomainError::InvariantViolation(
                "confirmation question and awaiting flag disagree".to_owned(),
            ));
        }
        if self.flags.policy_created && self.policy.is_none() {
            return Err(DomainError::InvariantViolation(
                "policy flagged as created but missing".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn summary(&self) -> StateSummary {
        StateSummary {
            session_id: self.session_id.clone(),
            destination: self.trip.destination.clone(),
            departure_date: self.trip.departure_date,
            return_date: self.trip.return_date,
            traveler_ages: self.travelers.ages.clone(),
            adults_count: self.travelers.adults_count,
            children_count: self.travelers.children_count,
            adventure_sports: self.preferences.adventure_sports,
            missing_slots: self.missing_required_slots(),
            awaiting_confirmation: self.dialogue.awaiting_confirmation,
            pricing_complete: self.flags.pricing_complete,
            prices: self
                .quote
                .as_ref()
                .map(|quote| {
                    quote.tiers.iter().map(|(tier, priced)| (*tier, priced.price)).collect()
                })
                .unwrap_or_default(),
            recommended_tier: self.quote.as_ref().map(|quote| quote.recommended_tier),
            payment_phase: self.payment.phase,
            policy_number: self.policy.as_ref().map(|policy| policy.policy_number.0.clone()),
            escalated: self.flags.escalated,
        }
    }
}

/// Client-facing projection of the state returned with every turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub session_id: String,
    pub destination: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub traveler_ages: Vec<f64>,
    pub adults_count: u32,
    pub children_count: u32,
    pub adventure_sports: Option<bool>,
    pub missing_slots: Vec<Slot>,
    pub awaiting_confirmation: bool,
    pub pricing_complete: bool,
    pub prices: BTreeMap<Tier, Decimal>,
    pub recommended_tier: Option<Tier>,
    pub payment_phase: PaymentPhase,
    pub policy_number: Option<String>,
    pub escalated: bool,
}
