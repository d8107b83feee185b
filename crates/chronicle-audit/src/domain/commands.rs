//! Commands for the audit context.

use chronicle_core::audit::NewAuditLog;
use chronicle_core::command::Command;
use uuid::Uuid;

/// Command to record a new audit entry.
#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The entry to record.
    pub input: NewAuditLog,
}

impl CreateAuditLog {
    /// Wraps `input` with a fresh correlation ID.
    #[must_use]
    pub fn new(input: NewAuditLog) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            input,
        }
    }

    /// The aggregate the resulting event belongs to, if the input names one.
    #[must_use]
    pub fn aggregate_id(&self) -> Option<&str> {
        self.input
            .church_id
            .as_deref()
            .filter(|church_id| !church_id.is_empty())
    }
}

impl Command for CreateAuditLog {
    fn command_type(&self) -> &'static str {
        "audit.create_audit_log"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
