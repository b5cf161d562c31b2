use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use tripcover_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, NoopAuditSink};
use tripcover_core::config::AppConfig;
use tripcover_core::dates::format_display;
use tripcover_core::domain::document::DocumentType;
use tripcover_core::domain::trip::{Question, Slot, Travelers};
use tripcover_core::errors::{ApplicationError, DomainError};
use tripcover_core::flows::{
    Capability, ClassifiedIntent, EscalationReason, Intent, PriorityRouting, RouteDecision,
    RouteSignals, Router, RoutingPolicy,
};
use tripcover_core::geo;
use tripcover_core::pricing::{self, price_from_reference, PricingError, PricingRequest};
use tripcover_core::{ConversationState, PaymentStatus, Role, StateSummary, Tier};
use tripcover_db::repositories::{ConversationRepository, PolicyRepository, RepositoryError};

use crate::conversation::{
    first_prompt, KeywordIntentClassifier, SlotCollector, SlotInput, CONFIRMATION_QUESTION,
};
use crate::integrations::{
    DocumentExtractor, InsurerClient, OfflineInsurer, PaymentGateway, SandboxPaymentGateway,
    UnavailableDocumentExtractor,
};
use crate::llm::{ExtractedTrip, IntentClassifier, NoopTripExtractor, TripExtractor};
use crate::payment::{PaymentNegotiator, PolicyIssuer};

/// Pricing validation failures on the same slot before a human takes over.
const MAX_PRICING_FAILURES: u32 = 2;

/// What a capability node asks the loop to do next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeOutcome {
    /// The assistant has spoken; the turn ends.
    Reply,
    /// State changed without a reply; route again.
    Continue,
    Escalate { reason: EscalationReason, message: Option<String> },
}

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub loop_budget: u32,
    pub low_confidence_threshold: f32,
    pub history_window: usize,
    pub currency: String,
    pub use_insurer_reference: bool,
    pub default_departure_country: String,
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            loop_budget: config.conversation.loop_budget,
            low_confidence_threshold: config.conversation.low_confidence_threshold,
            history_window: config.conversation.history_window,
            currency: config.pricing.currency.clone(),
            use_insurer_reference: config.pricing.use_insurer_reference,
            default_departure_country: config.conversation.default_departure_country.clone(),
        }
    }
}

/// Same values as an empty configuration file.
impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub type_hint: Option<DocumentType>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl InboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), attachment: None }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnResponse {
    pub session_id: String,
    pub assistant_text: String,
    pub state_summary: StateSummary,
    pub requires_human: bool,
    pub decisions: Vec<RouteDecision>,
}

/// Per-turn scratch space shared by the nodes of one turn.
struct TurnContext {
    text: String,
    intent: Intent,
    confidence: f32,
    attachment: Option<Attachment>,
    extracted: Option<ExtractedTrip>,
    extractor_called: bool,
}

/// Hands out one lock per session so a turn and a payment notification for
/// the same conversation never work on separate copies of its state.
#[derive(Default)]
struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(session_id.to_owned()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Drives one conversation turn: classify, route, run capability nodes and
/// checkpoint the state after every node.
pub struct AgentRuntime<P = PriorityRouting> {
    conversations: Arc<dyn ConversationRepository>,
    policies: Arc<dyn PolicyRepository>,
    classifier: Arc<dyn IntentClassifier>,
    extractor: Arc<dyn TripExtractor>,
    insurer: Arc<dyn InsurerClient>,
    gateway: Arc<dyn PaymentGateway>,
    documents: Arc<dyn DocumentExtractor>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    router: Router<P>,
    slots: SlotCollector,
    settings: RuntimeSettings,
    sessions: Arc<SessionLocks>,
}

impl AgentRuntime<PriorityRouting> {
    /// Runtime wired with the offline collaborators.
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        policies: Arc<dyn PolicyRepository>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            conversations,
            policies,
            classifier: Arc::new(KeywordIntentClassifier::new()),
            extractor: Arc::new(NoopTripExtractor),
            insurer: Arc::new(OfflineInsurer::default()),
            gateway: Arc::new(SandboxPaymentGateway::new("https://checkout.invalid/pay")),
            documents: Arc::new(UnavailableDocumentExtractor),
            audit: Arc::new(NoopAuditSink),
            clock: Arc::new(SystemClock),
            router: Router::with_budget(settings.loop_budget),
            slots: SlotCollector::new(settings.default_departure_country.clone()),
            settings,
            sessions: Arc::default(),
        }
    }
}

impl<P> AgentRuntime<P>
where
    P: RoutingPolicy,
{
    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TripExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_insurer(mut self, insurer: Arc<dyn InsurerClient>) -> Self {
        self.insurer = insurer;
        self
    }

    pub fn with_payment_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_document_extractor(mut self, documents: Arc<dyn DocumentExtractor>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_routing<Q>(self, router: Router<Q>) -> AgentRuntime<Q>
    where
        Q: RoutingPolicy,
    {
        AgentRuntime {
            conversations: self.conversations,
            policies: self.policies,
            classifier: self.classifier,
            extractor: self.extractor,
            insurer: self.insurer,
            gateway: self.gateway,
            documents: self.documents,
            audit: self.audit,
            clock: self.clock,
            router,
            slots: self.slots,
            settings: self.settings,
            sessions: self.sessions,
        }
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Handles one inbound user message and returns the assistant's reply.
    pub async fn send_message(
        &self,
        session_id: &str,
        message: InboundMessage,
    ) -> Result<TurnResponse, ApplicationError> {
        let _session = self.sessions.acquire(session_id).await;
        let mut state = match self.conversations.load(session_id).await.map_err(persistence)? {
            Some(state) => state,
            None => ConversationState::new(session_id),
        };
        state.loop_count = 0;
        let audit = AuditContext::new(session_id, Uuid::new_v4().to_string(), "assistant");

        let classified = self.classify(&state, &message).await;
        self.audit.emit(
            audit
                .event("turn.received", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("intent", classified.intent.as_str())
                .with_metadata("confidence", format!("{:.2}", classified.confidence)),
        );

        let mut ctx = TurnContext {
            text: message.text,
            intent: classified.intent,
            confidence: classified.confidence,
            attachment: message.attachment,
            extracted: None,
            extractor_called: false,
        };
        state.push_user(ctx.text.clone());
        let first_reply = state.messages.len();
        self.checkpoint(&mut state, &audit).await?;

        let mut decisions = Vec::new();
        let mut requires_human = false;
        loop {
            state.loop_count += 1;
            let signals = RouteSignals::new(
                ClassifiedIntent::new(ctx.intent, ctx.confidence),
                self.settings.low_confidence_threshold,
            );
            let decision =
                self.router.route_with_audit(&state, &signals, self.audit.as_ref(), &audit);
            decisions.push(decision);

            let outcome = match decision {
                RouteDecision::EndOfTurn => break,
                RouteDecision::Escalate(reason) => {
                    NodeOutcome::Escalate { reason, message: None }
                }
                RouteDecision::Dispatch(capability) => {
                    let outcome = self.dispatch(capability, &mut state, &mut ctx, &audit).await?;
                    state.validate()?;
                    self.checkpoint(&mut state, &audit).await?;
                    outcome
                }
            };

            match outcome {
                NodeOutcome::Continue => continue,
                NodeOutcome::Reply => break,
                NodeOutcome::Escalate { reason, message } => {
                    self.escalate(&mut state, reason, message, &audit);
                    requires_human = true;
                    break;
                }
            }
        }

        let replied = state.messages[first_reply..].iter().any(|entry| entry.role == Role::Assistant);
        if !replied {
            let fallback = fallback_reply(&state);
            state.push_assistant(fallback);
        }
        self.checkpoint(&mut state, &audit).await?;

        let assistant_text = state.messages[first_reply..]
            .iter()
            .filter(|entry| entry.role == Role::Assistant)
            .map(|entry| entry.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        info!(
            event_name = "agent.turn.completed",
            session_id = %session_id,
            correlation_id = %audit.correlation_id,
            intent = ctx.intent.as_str(),
            decisions = decisions.len(),
            requires_human,
            "conversation turn completed"
        );

        Ok(TurnResponse {
            session_id: session_id.to_owned(),
            assistant_text,
            state_summary: state.summary(),
            requires_human,
            decisions,
        })
    }

    /// Applies a payment status pushed by the gateway. Repeated deliveries of
    /// the same status are harmless.
    pub async fn record_payment_notification(
        &self,
        session_id: &str,
        payment_reference_id: &str,
        status: PaymentStatus,
    ) -> Result<TurnResponse, ApplicationError> {
        let _session = self.sessions.acquire(session_id).await;
        let mut state = self
            .conversations
            .peek(session_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| invariant(format!("unknown session `{session_id}`")))?;
        if state.payment.reference_id.as_deref() != Some(payment_reference_id) {
            return Err(invariant(format!(
                "payment reference `{payment_reference_id}` does not belong to session \
                 `{session_id}`"
            )));
        }

        let audit = AuditContext::new(session_id, Uuid::new_v4().to_string(), "payment_gateway");
        self.audit.emit(
            audit
                .event("payment.notification", AuditCategory::Payment, AuditOutcome::Success)
                .with_metadata("payment_reference_id", payment_reference_id)
                .with_metadata("status", status.as_str()),
        );

        let first_reply = state.messages.len();
        let mut requires_human = false;
        let outcome = self.payments().apply_notification(&mut state, status).await?;
        if let NodeOutcome::Escalate { reason, message } = outcome {
            self.escalate(&mut state, reason, message, &audit);
            requires_human = true;
        }
        state.validate()?;
        self.checkpoint(&mut state, &audit).await?;

        let assistant_text = state.messages[first_reply..]
            .iter()
            .map(|entry| entry.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(TurnResponse {
            session_id: session_id.to_owned(),
            assistant_text,
            state_summary: state.summary(),
            requires_human,
            decisions: Vec::new(),
        })
    }

    pub async fn session_summary(
        &self,
        session_id: &str,
    ) -> Result<Option<StateSummary>, ApplicationError> {
        let state = self.conversations.peek(session_id).await.map_err(persistence)?;
        Ok(state.map(|state| state.summary()))
    }

    async fn classify(&self, state: &ConversationState, message: &InboundMessage) -> ClassifiedIntent {
        if message.attachment.is_some() {
            return ClassifiedIntent::new(Intent::DocumentUpload, 1.0);
        }

        let history = state.recent_history(self.settings.history_window);
        match self.classifier.classify(&message.text, history).await {
            Ok(classified) => classified,
            Err(error) => {
                warn!(
                    event_name = "agent.nlu.fallback",
                    session_id = %state.session_id,
                    error = %error,
                    "intent classifier failed, using keyword rules"
                );
                KeywordIntentClassifier::new().classify_text(&message.text)
            }
        }
    }

    async fn checkpoint(
        &self,
        state: &mut ConversationState,
        audit: &AuditContext,
    ) -> Result<(), ApplicationError> {
        state.touch();
        if let Err(error) = self.conversations.save(state).await {
            self.audit.emit(
                audit
                    .event("state.checkpoint", AuditCategory::Persistence, AuditOutcome::Failed)
                    .with_metadata("error", error.to_string()),
            );
            return Err(persistence(error));
        }
        Ok(())
    }

    fn payments(&self) -> PaymentNegotiator {
        PaymentNegotiator::new(
            self.gateway.clone(),
            PolicyIssuer::new(self.insurer.clone(), self.policies.clone()),
        )
    }

    async fn dispatch(
        &self,
        capability: Capability,
        state: &mut ConversationState,
        ctx: &mut TurnContext,
        audit: &AuditContext,
    ) -> Result<NodeOutcome, ApplicationError> {
        match capability {
            Capability::SlotCollector => Ok(self.collect_slots(state, ctx, audit).await),
            Capability::GeoMapper => Ok(self.map_destination(state)),
            Capability::Pricing => Ok(self.price_trip(state, audit).await),
            Capability::Payment => self.payments().negotiate(state, ctx.intent, &ctx.text).await,
            Capability::Document => Ok(self.read_document(state, ctx, audit).await),
            Capability::PolicyQa => Ok(self.answer_policy_question(state, &ctx.text)),
            Capability::Claims => Ok(self.explain_claims(state)),
        }
    }

    async fn collect_slots(
        &self,
        state: &mut ConversationState,
        ctx: &mut TurnContext,
        audit: &AuditContext,
    ) -> NodeOutcome {
        if !ctx.extractor_called {
            ctx.extractor_called = true;
            match self.extractor.extract(&ctx.text, &state.trip).await {
                Ok(extracted) if !extracted.is_empty() => ctx.extracted = Some(extracted),
                Ok(_) => {}
                Err(error) => warn!(
                    event_name = "agent.nlu.extraction_failed",
                    session_id = %state.session_id,
                    error = %error,
                    "slot extraction failed, parsing raw text only"
                ),
            }
        }

        let snapshot = state.clone();
        let input = SlotInput {
            text: &ctx.text,
            intent: ctx.intent,
            extracted: ctx.extracted.as_ref(),
            today: self.clock.today(),
        };
        match self.slots.collect(state, &input) {
            Ok(outcome) => {
                if state.trip != snapshot.trip
                    || state.travelers != snapshot.travelers
                    || state.preferences != snapshot.preferences
                {
                    let summary = state.summary();
                    self.audit.emit(
                        audit
                            .event("slots.updated", AuditCategory::Slots, AuditOutcome::Success)
                            .with_metadata("missing_slots", summary.missing_slots.len().to_string())
                            .with_metadata(
                                "awaiting_confirmation",
                                summary.awaiting_confirmation.to_string(),
                            ),
                    );
                }
                outcome
            }
            Err(error) => {
                warn!(
                    event_name = "agent.slots.rejected",
                    session_id = %state.session_id,
                    error = %error,
                    "slot update rolled back"
                );
                self.audit.emit(
                    audit
                        .event("slots.updated", AuditCategory::Slots, AuditOutcome::Rejected)
                        .with_metadata("error", error.to_string()),
                );
                *state = snapshot;
                state.push_assistant("Sorry, I couldn't make sense of that. Could you rephrase?");
                NodeOutcome::Reply
            }
        }
    }

    fn map_destination(&self, state: &mut ConversationState) -> NodeOutcome {
        let destination = state.trip.destination.clone().unwrap_or_default();
        state.area = Some(geo::assign_area(&destination));
        if state.trip.arrival_country_code.is_none() {
            state.trip.arrival_country_code =
                geo::lookup(&destination).map(|profile| profile.country_code.to_owned());
        }
        if state.trip.departure_country_code.is_none() {
            state.trip.departure_country_code =
                Some(self.settings.default_departure_country.clone());
        }
        NodeOutcome::Continue
    }

    async fn price_trip(&self, state: &mut ConversationState, audit: &AuditContext) -> NodeOutcome {
        let Some(request) = pricing_request(state, &self.settings.currency) else {
            state.flags.ready_for_pricing = false;
            state.dialogue.confirmation_received = false;
            state.area = None;
            return NodeOutcome::Continue;
        };

        let priced = match self.reference_quote(&request).await {
            Some(quote) => Ok(quote),
            None => pricing::price(&request),
        };

        match priced {
            Ok(quote) => {
                self.audit.emit(
                    audit
                        .event("pricing.quote_created", AuditCategory::Pricing, AuditOutcome::Success)
                        .with_metadata("quote_id", quote.id.0.clone())
                        .with_metadata("recommended_tier", quote.recommended_tier.as_str()),
                );
                let text = present_quote(state, &quote);
                state.quote = Some(quote);
                state.flags.pricing_complete = true;
                state.dialogue.reset_failures(Slot::ReturnDate);
                state.dialogue.reset_failures(Slot::TravelerAges);
                state.push_assistant(text);
                NodeOutcome::Reply
            }
            Err(error) => {
                self.audit.emit(
                    audit
                        .event("pricing.rejected", AuditCategory::Pricing, AuditOutcome::Rejected)
                        .with_metadata("code", error.code()),
                );
                warn!(
                    event_name = "agent.pricing.rejected",
                    session_id = %state.session_id,
                    code = error.code(),
                    "trip failed pricing validation"
                );
                self.recover_from_pricing_error(state, &error)
            }
        }
    }

    async fn reference_quote(&self, request: &PricingRequest) -> Option<tripcover_core::Quote> {
        if !self.settings.use_insurer_reference {
            return None;
        }
        let reference = match self.insurer.quote(request).await {
            Ok(reference) => reference,
            Err(error) => {
                warn!(
                    event_name = "agent.pricing.reference_unavailable",
                    error = %error,
                    "insurer reference price unavailable, using area table"
                );
                return None;
            }
        };
        price_from_reference(request, &reference.into()).ok()
    }

    fn recover_from_pricing_error(
        &self,
        state: &mut ConversationState,
        error: &PricingError,
    ) -> NodeOutcome {
        let (slot, explanation) = match error {
            PricingError::TripTooLong { max, .. } => {
                (Slot::ReturnDate, format!("I can only cover trips of up to {max} days."))
            }
            PricingError::InvalidDates { .. } => {
                (Slot::ReturnDate, "Your return date needs to be after departure.".to_owned())
            }
            PricingError::TravelerCount { max, .. } => {
                (Slot::TravelerAges, format!("One policy covers between 1 and {max} travelers."))
            }
            PricingError::InvalidAge { age } => {
                (Slot::TravelerAges, format!("{age} isn't an age I can cover."))
            }
            PricingError::InvalidReferencePrice(_) => (
                Slot::ReturnDate,
                "I couldn't get a valid price for these dates.".to_owned(),
            ),
        };

        match slot {
            Slot::TravelerAges => state.travelers = Travelers::default(),
            _ => state.trip.return_date = None,
        }
        state.flags.ready_for_pricing = false;
        state.dialogue.confirmation_received = false;
        state.area = None;

        let failures = state.dialogue.record_failure(slot);
        if failures >= MAX_PRICING_FAILURES {
            return NodeOutcome::Escalate {
                reason: EscalationReason::PricingFailure,
                message: Some(format!(
                    "{explanation} I still can't price this trip automatically, so I'm passing \
                     you to a member of our team who can help."
                )),
            };
        }

        state.dialogue.ask(slot);
        state.push_assistant(format!("{explanation} {}", first_prompt(slot)));
        NodeOutcome::Reply
    }

    async fn read_document(
        &self,
        state: &mut ConversationState,
        ctx: &mut TurnContext,
        audit: &AuditContext,
    ) -> NodeOutcome {
        let Some(attachment) = ctx.attachment.take() else {
            state.push_assistant(
                "Please attach your flight booking, hotel confirmation, visa or itinerary and \
                 I'll read the trip details from it.",
            );
            return NodeOutcome::Reply;
        };

        match self.documents.extract_structured(&attachment.bytes, attachment.type_hint).await {
            Ok(mut extraction) => {
                extraction.received_at = Some(Utc::now());
                self.audit.emit(
                    audit
                        .event("document.extracted", AuditCategory::Document, AuditOutcome::Success)
                        .with_metadata("document_type", extraction.document_type.as_str())
                        .with_metadata("fields", extraction.fields.len().to_string()),
                );
                state.pending_document = Some(extraction);
                state.flags.document_merged = true;
                ctx.intent = Intent::ProvideTripInfo;
                NodeOutcome::Continue
            }
            Err(error) => {
                warn!(
                    event_name = "agent.document.extraction_failed",
                    session_id = %state.session_id,
                    error = %error,
                    "document could not be structured"
                );
                self.audit.emit(
                    audit.event("document.extracted", AuditCategory::Document, AuditOutcome::Failed),
                );
                let text = with_pending_question(
                    state,
                    "I couldn't read that document. Could you type the details instead?",
                );
                state.push_assistant(text);
                NodeOutcome::Reply
            }
        }
    }

    fn answer_policy_question(&self, state: &mut ConversationState, text: &str) -> NodeOutcome {
        let answer = coverage_answer(text, &self.settings.currency);
        let text = with_pending_question(state, &answer);
        state.push_assistant(text);
        NodeOutcome::Reply
    }

    fn explain_claims(&self, state: &mut ConversationState) -> NodeOutcome {
        let steps = "To make a claim:\n\
                     1. Keep receipts, medical reports and any police or airline reports.\n\
                     2. Submit the claim within 30 days of returning home, quoting your policy \
                     number.\n\
                     3. For emergencies abroad, call the 24/7 assistance line on your policy \
                     documents first.";
        let text = with_pending_question(state, steps);
        state.push_assistant(text);
        NodeOutcome::Reply
    }

    fn escalate(
        &self,
        state: &mut ConversationState,
        reason: EscalationReason,
        message: Option<String>,
        audit: &AuditContext,
    ) {
        state.flags.escalated = true;
        self.audit.emit(
            audit
                .event("turn.escalated", AuditCategory::Escalation, AuditOutcome::Rejected)
                .with_metadata("reason", reason.as_str()),
        );
        warn!(
            event_name = "agent.turn.escalated",
            session_id = %state.session_id,
            reason = reason.as_str(),
            loop_count = state.loop_count,
            "conversation handed to a human"
        );

        let text = message.unwrap_or_else(|| escalation_message(reason).to_owned());
        state.push_assistant(text);
    }
}

fn escalation_message(reason: EscalationReason) -> &'static str {
    match reason {
        EscalationReason::HandoffRequested => {
            "Of course. I'm connecting you with a member of our team now, and they'll see our \
             conversation so far."
        }
        EscalationReason::LowConfidence => {
            "I want to be sure you get the right help, so I'm connecting you with a member of \
             our team."
        }
        EscalationReason::LoopBudgetExhausted => {
            "I'm having trouble with this request, so I'm bringing in a member of our team to \
             help you finish."
        }
        EscalationReason::PricingFailure => {
            "I couldn't price this trip automatically. A member of our team will follow up with \
             a quote."
        }
        EscalationReason::PaymentFailure => {
            "Our payment system isn't responding right now. Your quote is saved and a member of \
             our team will follow up to complete your purchase."
        }
        EscalationReason::RepeatedFailure => {
            "I'm struggling to understand, so I'm connecting you with a member of our team who \
             can help."
        }
    }
}

fn fallback_reply(state: &ConversationState) -> String {
    if let Some(policy) = &state.policy {
        return format!(
            "Your policy {} is active. Is there anything else I can help with?",
            policy.policy_number.0
        );
    }
    if state.flags.pricing_complete {
        return "Your quote is ready. Say buy with a plan name when you'd like to check out, or \
                tell me what to change."
            .to_owned();
    }
    "Sorry, I didn't quite get that. Could you rephrase?".to_owned()
}

fn with_pending_question(state: &ConversationState, answer: &str) -> String {
    match state.dialogue.current_question {
        Some(Question::Slot(slot)) => format!("{answer}\n\n{}", first_prompt(slot)),
        Some(Question::Confirmation) => format!("{answer}\n\n{CONFIRMATION_QUESTION}"),
        None => answer.to_owned(),
    }
}

fn pricing_request(state: &ConversationState, currency: &str) -> Option<PricingRequest> {
    Some(PricingRequest {
        destination: state.trip.destination.clone()?,
        departure_date: state.trip.departure_date?,
        return_date: state.trip.return_date?,
        ages: state.travelers.ages.clone(),
        adventure_sports: state.preferences.adventure_sports.unwrap_or(false),
        currency: currency.to_owned(),
    })
}

fn present_quote(state: &ConversationState, quote: &tripcover_core::Quote) -> String {
    let destination = state.trip.destination.as_deref().unwrap_or("your trip");
    let dates = match (state.trip.departure_date, state.trip.return_date) {
        (Some(departure), Some(return_date)) => {
            format!(" ({} to {})", format_display(departure), format_display(return_date))
        }
        _ => String::new(),
    };

    let mut lines = vec![format!("Here are your plans for {destination}{dates}:")];
    for (tier, priced) in &quote.tiers {
        let marker = if *tier == quote.recommended_tier { " (recommended)" } else { "" };
        lines.push(format!(
            "- {}: {} {}, medical cover up to {}{marker}",
            tier.label(),
            priced.price,
            priced.currency,
            priced.coverage.medical_expenses
        ));
    }
    if !quote.offers(Tier::Standard) {
        lines.push("Standard isn't offered because it doesn't cover adventure sports.".to_owned());
    }
    lines.push("Say \"buy\" with a plan name to check out, for example \"buy elite\".".to_owned());
    lines.join("\n")
}

fn coverage_answer(text: &str, currency: &str) -> String {
    let lowered = text.to_ascii_lowercase();
    let has = |words: &[&str]| words.iter().any(|word| lowered.contains(word));
    let row = |label: &str, pick: fn(&tripcover_core::domain::quote::CoverageTable) -> String| {
        let values = Tier::ALL
            .iter()
            .map(|tier| format!("{} {}", tier.label(), pick(&tier.coverage())))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{label}: {values}.")
    };

    if has(&["adventure", "ski", "scuba", "diving", "surf", "sport", "trek", "bungee"]) {
        return "Adventure sports are covered by Elite and Premier. Standard does not include \
                them."
            .to_owned();
    }
    if has(&["medical", "hospital", "doctor"]) {
        return row(&format!("Medical expenses ({currency})"), |c| c.medical_expenses.to_string());
    }
    if has(&["evacuation", "repatriation"]) {
        return row(&format!("Emergency evacuation ({currency})"), |c| {
            c.emergency_evacuation.to_string()
        });
    }
    if has(&["cancellation", "cancelled", "canceled"]) {
        return row(&format!("Trip cancellation ({currency})"), |c| c.trip_cancellation.to_string());
    }
    if has(&["baggage", "luggage", "belongings"]) {
        return row(&format!("Baggage loss ({currency})"), |c| c.baggage_loss.to_string());
    }
    if has(&["delay", "delayed", "missed"]) {
        return row(&format!("Travel delay ({currency})"), |c| c.travel_delay.to_string());
    }

    let overview = Tier::ALL
        .iter()
        .map(|tier| {
            let coverage = tier.coverage();
            format!(
                "- {}: medical {}, evacuation {}, cancellation {}, baggage {}, adventure sports {}",
                tier.label(),
                coverage.medical_expenses,
                coverage.emergency_evacuation,
                coverage.trip_cancellation,
                coverage.baggage_loss,
                if coverage.adventure_sports { "yes" } else { "no" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("Here's what each plan covers ({currency}):\n{overview}")
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn invariant(message: String) -> ApplicationError {
    ApplicationError::Domain(DomainError::InvariantViolation(message))
}
