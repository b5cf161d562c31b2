use thiserror::Error;

use crate::domain::payment::PaymentPhase;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("payment cannot move from {from:?} to {to:?}")]
    InvalidPaymentTransition { from: PaymentPhase, to: PaymentPhase },
    #[error("conversation state is inconsistent: {0}")]
    InvariantViolation(String),
}

/// Failures that end a turn. Anything the user can fix by answering again is
/// handled inside the conversation and never becomes an `ApplicationError`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("session store failure: {0}")]
    Persistence(String),
    #[error("partner call failed: {0}")]
    Integration(String),
}

impl ApplicationError {
    /// True when the same request may succeed if retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Integration(_))
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        if self.is_transient() {
            InterfaceError::ServiceUnavailable { message: self.to_string(), correlation_id }
        } else {
            InterfaceError::BadRequest { message: self.to_string(), correlation_id }
        }
    }
}

/// What leaves the process. `message` is for logs only; clients get
/// [`InterfaceError::user_message`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("rejected: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "That request doesn't match this conversation. Please check it and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "We can't reach the quote service right now. Please try again in a moment."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}
