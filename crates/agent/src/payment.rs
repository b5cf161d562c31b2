//! Checkout negotiation and policy issuance.
//!
//! The payment phase only moves along the transitions `PaymentSession`
//! allows. A settled payment is turned into exactly one policy, keyed by the
//! gateway's payment reference.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use tripcover_core::domain::quote::Tier;
use tripcover_core::errors::{ApplicationError, DomainError};
use tripcover_core::flows::{EscalationReason, Intent};
use tripcover_core::{ConversationState, IssuedPolicy, PaymentPhase, PaymentStatus};
use tripcover_db::repositories::{PolicyRepository, RepositoryError};

use crate::conversation::{normalize_text, tokenize};
use crate::integrations::{CheckoutCustomer, InsurerClient, IntegrationError, PaymentGateway};
use crate::runtime::NodeOutcome;

const COMPLETION_WORDS: &[&str] = &["paid", "done", "finished", "completed", "complete"];

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("no priced quote to pay for")]
    MissingQuote,
}

/// Issues policies for settled payments, at most once per payment reference.
#[derive(Clone)]
pub struct PolicyIssuer {
    insurer: Arc<dyn InsurerClient>,
    policies: Arc<dyn PolicyRepository>,
}

impl PolicyIssuer {
    pub fn new(insurer: Arc<dyn InsurerClient>, policies: Arc<dyn PolicyRepository>) -> Self {
        Self { insurer, policies }
    }

    pub async fn issue(&self, state: &ConversationState) -> Result<IssuedPolicy, PaymentError> {
        let reference = state.payment.reference_id.clone().ok_or_else(|| {
            DomainError::InvariantViolation("settled payment has no reference".to_owned())
        })?;
        if let Some(existing) = self.policies.find_by_payment_reference(&reference).await? {
            return Ok(existing);
        }

        let quote = state.quote.as_ref().ok_or(PaymentError::MissingQuote)?;
        let tier = state.payment.selected_tier.unwrap_or(quote.recommended_tier);
        let priced = quote.tier(tier).ok_or(PaymentError::MissingQuote)?;
        let confirmation =
            self.insurer.purchase(&quote.purchase_reference_ids, tier, &state.travelers).await?;

        let policy = IssuedPolicy {
            policy_number: confirmation.policy_number,
            payment_reference_id: reference,
            session_id: state.session_id.clone(),
            tier,
            premium: priced.price,
            currency: priced.currency.clone(),
            coverage: confirmation.coverage,
            issued_at: Utc::now(),
        };
        Ok(self.policies.save(policy).await?)
    }
}

#[derive(Clone)]
pub struct PaymentNegotiator {
    gateway: Arc<dyn PaymentGateway>,
    issuer: PolicyIssuer,
}

impl PaymentNegotiator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, issuer: PolicyIssuer) -> Self {
        Self { gateway, issuer }
    }

    /// Runs one payment step for the user's message. Partner failures mark
    /// the payment as failed and hand over to a human; storage failures are
    /// returned to the caller.
    pub async fn negotiate(
        &self,
        state: &mut ConversationState,
        intent: Intent,
        text: &str,
    ) -> Result<NodeOutcome, ApplicationError> {
        let result = self.step(state, intent, text).await;
        self.settle_result(state, result)
    }

    /// Applies a gateway status that arrived outside a user turn.
    pub async fn apply_notification(
        &self,
        state: &mut ConversationState,
        status: PaymentStatus,
    ) -> Result<NodeOutcome, ApplicationError> {
        let result = self.apply_status(state, status).await;
        self.settle_result(state, result)
    }

    fn settle_result(
        &self,
        state: &mut ConversationState,
        result: Result<NodeOutcome, PaymentError>,
    ) -> Result<NodeOutcome, ApplicationError> {
        match result {
            Ok(outcome) => Ok(outcome),
            Err(PaymentError::Integration(error)) => {
                warn!(
                    event_name = "agent.payment.integration_failed",
                    session_id = %state.session_id,
                    error = %error,
                    "payment partner call failed"
                );
                state.flags.payment_failed = true;
                let message = state.issuance_outstanding().then(|| {
                    "Your payment went through, but I couldn't finalise the policy with the \
                     insurer just yet. I'm passing this to a colleague, and you can ask me to \
                     check again at any time. You won't be charged twice."
                        .to_owned()
                });
                Ok(NodeOutcome::Escalate { reason: EscalationReason::PaymentFailure, message })
            }
            Err(PaymentError::MissingQuote) => {
                state.flags.awaiting_payment_confirmation = false;
                state.push_assistant(
                    "I need a current quote before I can take payment. Let's go over your trip \
                     details again.",
                );
                Ok(NodeOutcome::Reply)
            }
            Err(PaymentError::Repository(error)) => {
                Err(ApplicationError::Persistence(error.to_string()))
            }
            Err(PaymentError::Domain(error)) => Err(ApplicationError::Domain(error)),
        }
    }

    async fn step(
        &self,
        state: &mut ConversationState,
        intent: Intent,
        text: &str,
    ) -> Result<NodeOutcome, PaymentError> {
        // Settled payments never get a second checkout; only issuance is retried.
        if state.issuance_outstanding() {
            return self.apply_status(state, PaymentStatus::Completed).await;
        }

        let tokens = tokenize(&normalize_text(text));

        if state.payment.phase == PaymentPhase::CheckoutSent {
            if intent == Intent::Cancel {
                state.payment.cancel()?;
                state.flags.awaiting_payment_confirmation = false;
                state.flags.checkout_url_sent = false;
                state.push_assistant(
                    "I've cancelled that checkout. Your quote is still here whenever you're \
                     ready.",
                );
                return Ok(NodeOutcome::Reply);
            }

            let claims_done =
                tokens.iter().any(|token| COMPLETION_WORDS.contains(&token.as_str()));
            if intent == Intent::PaymentStatus || claims_done {
                let reference = state.payment.reference_id.clone().ok_or_else(|| {
                    DomainError::InvariantViolation("checkout has no reference".to_owned())
                })?;
                let status = self.gateway.status(&reference).await?;
                return self.apply_status(state, status).await;
            }

            if intent != Intent::Purchase {
                let url = state.payment.checkout_url.clone().unwrap_or_default();
                state.push_assistant(format!(
                    "Your checkout link is still open: {url}\nLet me know once you've paid, or \
                     say cancel to stop."
                ));
                return Ok(NodeOutcome::Reply);
            }
        }

        if intent == Intent::Purchase {
            return self.start_checkout(state, &tokens).await;
        }

        state.push_assistant("Just say buy when you'd like to check out.");
        Ok(NodeOutcome::Reply)
    }

    async fn start_checkout(
        &self,
        state: &mut ConversationState,
        tokens: &[String],
    ) -> Result<NodeOutcome, PaymentError> {
        let phase = state.payment.phase;
        if phase != PaymentPhase::CheckoutSent
            && !state.payment.can_transition_to(PaymentPhase::CheckoutSent)
        {
            warn!(
                event_name = "agent.payment.checkout_refused",
                session_id = %state.session_id,
                phase = ?phase,
                "checkout requested from a phase that cannot start one"
            );
            state.push_assistant(
                "This trip has already been paid for, so there's nothing more to check out.",
            );
            return Ok(NodeOutcome::Reply);
        }

        state.flags.payment_failed = false;
        let quote = state.quote.as_ref().ok_or(PaymentError::MissingQuote)?;

        let named = tokens.iter().find_map(|token| Tier::parse(token));
        let tier = match named {
            Some(tier) if !quote.offers(tier) => {
                state.push_assistant(format!(
                    "The {} plan isn't available for this trip because it doesn't include \
                     adventure sports cover. Would you like Elite or Premier instead?",
                    tier.label()
                ));
                return Ok(NodeOutcome::Reply);
            }
            Some(tier) => tier,
            None => state
                .payment
                .selected_tier
                .filter(|tier| quote.offers(*tier))
                .unwrap_or(quote.recommended_tier),
        };
        let priced = quote.tier(tier).ok_or(PaymentError::MissingQuote)?;
        let (amount, currency) = (priced.price, priced.currency.clone());

        let customer = CheckoutCustomer {
            session_id: state.session_id.clone(),
            traveler_count: state.travelers.count(),
            destination: state.trip.destination.clone(),
        };
        let checkout = self.gateway.create_checkout(amount, &currency, &customer).await?;

        if state.payment.phase == PaymentPhase::CheckoutSent {
            state.payment.cancel()?;
        }
        state.payment.start_checkout(
            checkout.payment_reference_id.clone(),
            checkout.checkout_url.clone(),
            tier,
        )?;
        state.flags.awaiting_payment_confirmation = true;
        state.flags.checkout_url_sent = true;

        info!(
            event_name = "agent.payment.checkout_created",
            session_id = %state.session_id,
            payment_reference_id = %checkout.payment_reference_id,
            tier = tier.as_str(),
            "checkout link issued"
        );
        state.push_assistant(format!(
            "Great choice! Here's your secure checkout link for the {} plan ({amount} \
             {currency}):\n{}\nLet me know once you've paid.",
            tier.label(),
            checkout.checkout_url
        ));
        Ok(NodeOutcome::Reply)
    }

    async fn apply_status(
        &self,
        state: &mut ConversationState,
        status: PaymentStatus,
    ) -> Result<NodeOutcome, PaymentError> {
        if state.payment.phase == PaymentPhase::Completed && status != PaymentStatus::Completed {
            return Ok(NodeOutcome::Reply);
        }
        match status {
            PaymentStatus::Pending => {
                state.push_assistant(
                    "I haven't had confirmation from the payment provider yet. Once checkout is \
                     complete, just let me know.",
                );
            }
            PaymentStatus::Completed => {
                if state.payment.phase == PaymentPhase::CheckoutSent {
                    state.payment.transition_to(PaymentPhase::Completed)?;
                }
                if state.flags.policy_created {
                    return Ok(NodeOutcome::Reply);
                }
                let policy = self.issuer.issue(state).await?;
                info!(
                    event_name = "agent.payment.policy_issued",
                    session_id = %state.session_id,
                    policy_number = %policy.policy_number.0,
                    "policy issued"
                );
                state.push_assistant(format!(
                    "Payment received, thank you! Your {} policy number is {}. You're covered \
                     for medical expenses up to {} {}. Have a great trip!",
                    policy.tier.label(),
                    policy.policy_number.0,
                    policy.coverage.medical_expenses,
                    policy.currency
                ));
                state.policy = Some(policy);
                state.flags.policy_created = true;
                state.flags.awaiting_payment_confirmation = false;
                state.flags.payment_failed = false;
            }
            PaymentStatus::Failed | PaymentStatus::Expired => {
                let (phase, what) = if status == PaymentStatus::Failed {
                    (PaymentPhase::Failed, "That payment didn't go through.")
                } else {
                    (PaymentPhase::Expired, "That checkout link has expired.")
                };
                if state.payment.phase == PaymentPhase::CheckoutSent {
                    state.payment.transition_to(phase)?;
                }
                state.flags.awaiting_payment_confirmation = false;
                state.flags.checkout_url_sent = false;
                state.push_assistant(format!(
                    "{what} Your quote is still valid. Say \"retry payment\" for a new checkout \
                     link, or name a different plan."
                ));
            }
        }
        Ok(NodeOutcome::Reply)
    }
}
