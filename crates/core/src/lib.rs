pub mod audit;
pub mod config;
pub mod dates;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod geo;
pub mod pricing;

pub use domain::conversation::{ConversationState, Message, Role, StateSummary};
pub use domain::payment::{PaymentPhase, PaymentSession, PaymentStatus};
pub use domain::policy::{IssuedPolicy, PolicyNumber};
pub use domain::quote::{Quote, QuoteId, Tier};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{Intent, RouteDecision, Router};
