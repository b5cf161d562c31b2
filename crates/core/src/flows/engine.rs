use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::conversation::ConversationState;
use crate::flows::states::{Capability, EscalationReason, Intent, RouteDecision, RouteSignals};

pub const DEFAULT_LOOP_BUDGET: u32 = 20;

pub trait RoutingPolicy {
    fn route(&self, state: &ConversationState, signals: &RouteSignals) -> RouteDecision;
}

/// Guarded priority routing for the quote-to-policy conversation. The first
/// matching rule wins and every input yields a decision.
#[derive(Clone, Copy, Debug)]
pub struct PriorityRouting {
    pub loop_budget: u32,
}

impl Default for PriorityRouting {
    fn default() -> Self {
        Self { loop_budget: DEFAULT_LOOP_BUDGET }
    }
}

impl RoutingPolicy for PriorityRouting {
    fn route(&self, state: &ConversationState, signals: &RouteSignals) -> RouteDecision {
        use Capability::{Claims, Document, GeoMapper, Payment, PolicyQa, Pricing, SlotCollector};
        use RouteDecision::{Dispatch, EndOfTurn, Escalate};

        let flags = &state.flags;
        let dialogue = &state.dialogue;

        if state.loop_count > self.loop_budget {
            return Escalate(EscalationReason::LoopBudgetExhausted);
        }

        if flags.policy_created {
            return EndOfTurn;
        }

        if state.issuance_outstanding() {
            if state.last_message_is_assistant() {
                return EndOfTurn;
            }
            return Dispatch(Payment);
        }

        if flags.awaiting_payment_confirmation && !flags.payment_failed {
            if flags.checkout_url_sent && state.last_message_is_assistant() {
                return EndOfTurn;
            }
            return Dispatch(Payment);
        }

        if flags.document_merged {
            return Dispatch(SlotCollector);
        }

        match signals.intent {
            Intent::DocumentUpload => return Dispatch(Document),
            Intent::PolicyQuestion => return Dispatch(PolicyQa),
            Intent::Claims => return Dispatch(Claims),
            Intent::Handoff if !state.is_mid_quote() => {
                return Escalate(EscalationReason::HandoffRequested)
            }
            _ => {}
        }

        if flags.pricing_complete {
            return match signals.intent {
                Intent::Purchase => Dispatch(Payment),
                Intent::ModifyTrip | Intent::ProvideTripInfo => Dispatch(SlotCollector),
                _ => EndOfTurn,
            };
        }

        if signals.low_confidence && !state.is_mid_quote() {
            return Escalate(EscalationReason::LowConfidence);
        }

        let pending = dialogue.has_pending_question();
        if pending && state.last_message_is_assistant() {
            return EndOfTurn;
        }
        if pending {
            return Dispatch(SlotCollector);
        }
        if flags.ready_for_pricing && dialogue.confirmation_received {
            return match (&state.area, &state.quote) {
                (None, _) => Dispatch(GeoMapper),
                (Some(_), None) => Dispatch(Pricing),
                (Some(_), Some(_)) => Dispatch(SlotCollector),
            };
        }
        Dispatch(SlotCollector)
    }
}

pub struct Router<P> {
    policy: P,
}

impl<P> Router<P>
where
    P: RoutingPolicy,
{
    pub fn new(policy: P) -> Self {
        Self { policy }
    }

    pub fn route(&self, state: &ConversationState, signals: &RouteSignals) -> RouteDecision {
        self.policy.route(state, signals)
    }

    pub fn route_with_audit<S>(
        &self,
        state: &ConversationState,
        signals: &RouteSignals,
        sink: &S,
        audit: &AuditContext,
    ) -> RouteDecision
    where
        S: AuditSink + ?Sized,
    {
        let decision = self.route(state, signals);
        let outcome = match decision {
            RouteDecision::Escalate(_) => AuditOutcome::Rejected,
            _ => AuditOutcome::Success,
        };
        sink.emit(
            audit
                .event("routing.decision", AuditCategory::Routing, outcome)
                .with_metadata("decision", decision.label())
                .with_metadata("intent", signals.intent.as_str())
                .with_metadata("loop_count", state.loop_count.to_string()),
        );
        decision
    }
}

impl Router<PriorityRouting> {
    pub fn with_budget(loop_budget: u32) -> Self {
        Self::new(PriorityRouting { loop_budget })
    }
}

impl Default for Router<PriorityRouting> {
    fn default() -> Self {
        Self::new(PriorityRouting::default())
    }
}
