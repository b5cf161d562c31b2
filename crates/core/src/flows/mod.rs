pub mod engine;
pub mod states;

pub use engine::{PriorityRouting, Router, RoutingPolicy, DEFAULT_LOOP_BUDGET};
pub use states::{
    Capability, ClassifiedIntent, EscalationReason, Intent, RouteDecision, RouteSignals,
};
