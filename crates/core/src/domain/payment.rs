use serde::{Deserialize, Serialize};

use crate::domain::quote::Tier;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPhase {
    #[default]
    None,
    CheckoutSent,
    Completed,
    Failed,
    Expired,
}

/// Status reported by the payment gateway for one reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" | "complete" | "paid" | "succeeded" => Some(Self::Completed),
            "failed" | "declined" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub phase: PaymentPhase,
    pub reference_id: Option<String>,
    pub checkout_url: Option<String>,
    pub selected_tier: Option<Tier>,
}

impl PaymentSession {
    pub fn can_transition_to(&self, next: PaymentPhase) -> bool {
        matches!(
            (self.phase, next),
            (PaymentPhase::None, PaymentPhase::CheckoutSent)
                | (PaymentPhase::CheckoutSent, PaymentPhase::Completed)
                | (PaymentPhase::CheckoutSent, PaymentPhase::Failed)
                | (PaymentPhase::CheckoutSent, PaymentPhase::Expired)
                | (PaymentPhase::CheckoutSent, PaymentPhase::None)
                | (PaymentPhase::Failed, PaymentPhase::CheckoutSent)
                | (PaymentPhase::Expired, PaymentPhase::CheckoutSent)
        )
    }

    pub fn transition_to(&mut self, next: PaymentPhase) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.phase = next;
            return Ok(());
        }

        Err(DomainError::InvalidPaymentTransition { from: self.phase, to: next })
    }

    /// Records a fresh checkout. Any previous reference is replaced.
    pub fn start_checkout(
        &mut self,
        reference_id: String,
        checkout_url: String,
        tier: Tier,
    ) -> Result<(), DomainError> {
        self.transition_to(PaymentPhase::CheckoutSent)?;
        self.reference_id = Some(reference_id);
        self.checkout_url = Some(checkout_url);
        self.selected_tier = Some(tier);
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition_to(PaymentPhase::None)?;
        self.reference_id = None;
        self.checkout_url = None;
        self.selected_tier = None;
        Ok(())
    }
}
