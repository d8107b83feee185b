//! Domain events for the audit context.

use chronicle_core::audit::{AuditDiff, AuditLogReadModel, AuditLogRecord, UserSummary};
use chronicle_core::event::{DomainEvent, NewDomainEvent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Aggregate type of every audit event. The aggregate id is the church id.
pub const AUDIT_LOG_AGGREGATE_TYPE: &str = "AuditLog";

/// Event type identifier for [`AuditLogCreated`].
pub const AUDIT_LOG_CREATED_EVENT_TYPE: &str = "AuditLogCreated";

/// Version stamped on audit events. Each entry is its own fact, so there is
/// no per-stream sequence to continue.
pub const AUDIT_LOG_EVENT_VERSION: i64 = 1;

/// Payload emitted when an audit entry is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogCreated {
    /// User who performed the action.
    #[serde(default)]
    pub actor_user_id: String,
    /// Actor snapshot at the time of writing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<UserSummary>,
    /// Action name.
    pub action: String,
    /// Entity kind.
    pub entity: String,
    /// Entity identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Human-readable summary.
    pub summary: String,
    /// Optional field diff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<AuditDiff>,
    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl AuditLogCreated {
    /// Builds the payload for a freshly persisted record.
    #[must_use]
    pub fn from_record(record: &AuditLogRecord, actor: Option<UserSummary>) -> Self {
        Self {
            actor_user_id: record.actor_user_id.clone(),
            actor,
            action: record.action.clone(),
            entity: record.entity.clone(),
            entity_id: record.entity_id.clone(),
            summary: record.summary.clone(),
            diff: record.diff.clone(),
            metadata: record.metadata.clone(),
        }
    }

    /// Decodes the payload of a stored event.
    ///
    /// # Errors
    ///
    /// Returns the decode error when required fields are missing or mistyped.
    pub fn from_data(data: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(data.clone()))
    }

    /// Wraps the payload in an event for the given church's stream.
    ///
    /// # Errors
    ///
    /// Returns the encode error if the payload cannot be represented as JSON.
    pub fn into_new_event(self, church_id: &str) -> Result<NewDomainEvent, serde_json::Error> {
        let data = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(NewDomainEvent {
            aggregate_id: church_id.to_owned(),
            aggregate_type: AUDIT_LOG_AGGREGATE_TYPE.to_owned(),
            event_type: AUDIT_LOG_CREATED_EVENT_TYPE.to_owned(),
            version: AUDIT_LOG_EVENT_VERSION,
            data,
            metadata: None,
        })
    }

    /// Rebuilds the read model this payload was recorded for. Identity and
    /// time come from the event envelope; missing metadata becomes an empty
    /// object.
    #[must_use]
    pub fn into_read_model(self, event: &DomainEvent) -> AuditLogReadModel {
        AuditLogReadModel {
            id: event.id.to_string(),
            church_id: event.aggregate_id.clone(),
            actor_user_id: self.actor_user_id,
            actor: self.actor,
            action: self.action,
            entity: self.entity,
            entity_id: self.entity_id,
            summary: self.summary,
            diff: self.diff,
            metadata: Some(self.metadata.unwrap_or_default()),
            created_at: event.timestamp,
        }
    }
}
