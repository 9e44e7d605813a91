use tickety_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Writes audit events to the log stream under `event_name = "audit"`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let guild_id = event.guild_id.as_ref().map(|id| id.as_str()).unwrap_or("none");
        let user_id = event.user_id.as_ref().map(|id| id.as_str()).unwrap_or("none");
        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = "audit",
                audit_event = %event.event_type,
                category = ?event.category,
                correlation_id = %event.correlation_id,
                guild_id,
                user_id,
                actor = %event.actor,
                metadata = ?event.metadata,
                "audit event recorded"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_name = "audit",
                audit_event = %event.event_type,
                category = ?event.category,
                outcome = ?event.outcome,
                correlation_id = %event.correlation_id,
                guild_id,
                user_id,
                actor = %event.actor,
                metadata = ?event.metadata,
                "audit event recorded"
            ),
        }
    }
}
