//! Domain audit trail. Every routing decision, quote, payment notification
//! and escalation is emitted as an [`AuditEvent`] tied to a session and the
//! correlation id of the turn that caused it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Ingress,
    Routing,
    Slots,
    Pricing,
    Payment,
    Document,
    Escalation,
    Persistence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

/// Who and which turn an event belongs to. Built once per turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub session_id: String,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        session_id: impl Into<String>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            correlation_id: correlation_id.into(),
            actor: actor.into(),
        }
    }

    pub fn event(
        &self,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent {
            event_id: Uuid::new_v4().to_string(),
            session_id: self.session_id.clone(),
            correlation_id: self.correlation_id.clone(),
            event_type: event_type.into(),
            category,
            actor: self.actor.clone(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub session_id: String,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Receives audit events. Emission never fails a turn.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

/// Keeps events in memory; clones share the same buffer.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    fn buffer(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.buffer().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.buffer().iter().map(|event| event.event_type.clone()).collect()
    }

    pub fn for_session(&self, session_id: &str) -> Vec<AuditEvent> {
        self.buffer().iter().filter(|event| event.session_id == session_id).cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.buffer().push(event);
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, InMemoryAuditSink};

    #[test]
    fn events_carry_the_turn_context() {
        let sink = InMemoryAuditSink::default();
        let turn = AuditContext::new("sess-42", "req-123", "assistant");
        sink.emit(
            turn.event("pricing.quote_created", AuditCategory::Pricing, AuditOutcome::Success)
                .with_metadata("recommended_tier", "standard"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id, "sess-42");
        assert_eq!(events[0].correlation_id, "req-123");
        assert_eq!(events[0].actor, "assistant");
        assert_eq!(events[0].metadata_value("recommended_tier"), Some("standard"));
        assert_eq!(sink.event_types(), vec!["pricing.quote_created".to_owned()]);
    }

    #[test]
    fn clones_share_one_buffer_and_filter_by_session() {
        let sink = InMemoryAuditSink::default();
        let shared = sink.clone();
        for session in ["a", "b", "a"] {
            shared.emit(AuditContext::new(session, "req", "router").event(
                "routing.decision",
                AuditCategory::Routing,
                AuditOutcome::Success,
            ));
        }

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.for_session("a").len(), 2);
        assert!(sink.for_session("c").is_empty());
    }
}
