use tracing::{info, warn};
use tripcover_core::audit::{AuditEvent, AuditOutcome, AuditSink};

/// Writes audit events into the structured log stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = "audit.event",
                audit_event = %event.event_type,
                category = ?event.category,
                correlation_id = %event.correlation_id,
                session_id = %event.session_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event recorded"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_name = "audit.event",
                audit_event = %event.event_type,
                category = ?event.category,
                outcome = ?event.outcome,
                correlation_id = %event.correlation_id,
                session_id = %event.session_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event recorded"
            ),
        }
    }
}
