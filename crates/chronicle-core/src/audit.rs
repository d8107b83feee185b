//! Audit-log data model and the persistence collaborator it is stored in.
//!
//! The canonical audit records live in an external store; this crate only
//! fixes the shapes exchanged with it and the read models built from them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PersistenceError;

/// Page used when a listing query does not name one.
pub const DEFAULT_PAGE: u32 = 1;
/// Page size used when a listing query does not name one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page size a listing query may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Display name of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
}

/// Snapshot of the user who performed an audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// User identifier.
    pub id: String,
    /// Primary e-mail address.
    pub primary_email: String,
    /// Display name.
    pub profile: UserProfile,
}

/// Before/after values of one changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    /// Value before the change.
    pub previous: Value,
    /// Value after the change.
    pub new_value: Value,
}

/// Field-by-field diff attached to an audit entry.
pub type AuditDiff = BTreeMap<String, FieldChange>;

/// Input for recording a new audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditLog {
    /// Church (aggregate) the entry belongs to. The store may default it.
    #[serde(default)]
    pub church_id: Option<String>,
    /// User who performed the action.
    pub actor_user_id: String,
    /// Action name, e.g. `user.created`.
    pub action: String,
    /// Entity kind the action touched.
    pub entity: String,
    /// Identifier of the touched entity.
    #[serde(default)]
    pub entity_id: Option<String>,
    /// Human-readable summary.
    pub summary: String,
    /// Optional field diff.
    #[serde(default)]
    pub diff: Option<AuditDiff>,
    /// Optional free-form metadata.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    /// Explicit creation time; the store uses its own clock when absent.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A canonical audit record as held by the persistence store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogRecord {
    /// Record identifier.
    pub id: String,
    /// Church the entry belongs to.
    pub church_id: String,
    /// User who performed the action. Empty for system entries.
    pub actor_user_id: String,
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
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Audit entry as served to readers, with the actor resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogReadModel {
    /// Entry identifier.
    pub id: String,
    /// Church the entry belongs to.
    pub church_id: String,
    /// User who performed the action.
    pub actor_user_id: String,
    /// Resolved actor; omitted when lookup was skipped or failed.
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
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl AuditLogReadModel {
    /// Builds the read model for `record` with an already-resolved actor.
    #[must_use]
    pub fn from_record(record: AuditLogRecord, actor: Option<UserSummary>) -> Self {
        Self {
            id: record.id,
            church_id: record.church_id,
            actor_user_id: record.actor_user_id,
            actor,
            action: record.action,
            entity: record.entity,
            entity_id: record.entity_id,
            summary: record.summary,
            diff: record.diff,
            metadata: record.metadata,
            created_at: record.created_at,
        }
    }
}

/// Pagination metadata of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Matching records before pagination.
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    /// Records per page.
    pub page_size: u32,
}

/// One page of raw records returned by the persistence store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogPage {
    /// Records on this page.
    pub items: Vec<AuditLogRecord>,
    /// Pagination metadata.
    pub meta: PageMeta,
}

/// One page of read models; cached as a single unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogQueryResult {
    /// Read models on this page.
    pub items: Vec<AuditLogReadModel>,
    /// Pagination metadata.
    pub meta: PageMeta,
}

impl AuditLogQueryResult {
    /// An empty page carrying the requested page coordinates.
    #[must_use]
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            meta: PageMeta {
                total: 0,
                page,
                page_size,
            },
        }
    }
}

/// Filters and pagination for listing audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAuditQuery {
    /// Only entries of this church.
    #[serde(default)]
    pub church_id: Option<String>,
    /// Only entries by this actor.
    #[serde(default)]
    pub actor_user_id: Option<String>,
    /// Only entries touching this entity kind.
    #[serde(default)]
    pub entity: Option<String>,
    /// Only entries touching this entity.
    #[serde(default)]
    pub entity_id: Option<String>,
    /// Only entries created at or after this time.
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// Only entries created at or before this time.
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// 1-based page number.
    #[serde(default)]
    pub page: Option<u32>,
    /// Records per page.
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl ListAuditQuery {
    /// Returns a copy with `page` and `page_size` filled in and clamped to
    /// `page >= 1` and `1 <= page_size <= MAX_PAGE_SIZE`.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            page: Some(self.page().max(1)),
            page_size: Some(self.page_size().clamp(1, MAX_PAGE_SIZE)),
            ..self.clone()
        }
    }

    /// Requested page, or [`DEFAULT_PAGE`].
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(DEFAULT_PAGE)
    }

    /// Requested page size, or [`DEFAULT_PAGE_SIZE`].
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

/// External store holding the canonical audit records and the user
/// directory used for actor resolution.
#[async_trait]
pub trait AuditPersistence: Send + Sync {
    /// Persists a new audit record.
    async fn create_audit_log(&self, input: NewAuditLog) -> Result<AuditLogRecord, PersistenceError>;

    /// Lists records matching `query`, which arrives already normalized.
    async fn list_audit_logs(&self, query: &ListAuditQuery) -> Result<AuditLogPage, PersistenceError>;

    /// Looks up a user; `None` when no such user exists.
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<UserSummary>, PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_applies_defaults() {
        let query = ListAuditQuery::default().normalized();

        assert_eq!(query.page, Some(1));
        assert_eq!(query.page_size, Some(50));
    }

    #[test]
    fn test_normalized_clamps_page_and_page_size() {
        let query = ListAuditQuery {
            page: Some(0),
            page_size: Some(500),
            ..ListAuditQuery::default()
        }
        .normalized();

        assert_eq!(query.page, Some(1));
        assert_eq!(query.page_size, Some(MAX_PAGE_SIZE));
    }

    #[test]
    fn test_read_model_omits_unresolved_actor() {
        let record = AuditLogRecord {
            id: "audit-1".to_owned(),
            church_id: "church-1".to_owned(),
            actor_user_id: "user-1".to_owned(),
            action: "user.created".to_owned(),
            entity: "user".to_owned(),
            entity_id: None,
            summary: "Added a member".to_owned(),
            diff: None,
            metadata: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(AuditLogReadModel::from_record(record, None)).unwrap();

        assert!(json.get("actor").is_none());
        assert_eq!(json["actorUserId"], "user-1");
    }

    #[test]
    fn test_list_query_deserializes_camel_case_parameters() {
        let query: ListAuditQuery = serde_json::from_value(serde_json::json!({
            "actorUserId": "user-1",
            "pageSize": 10
        }))
        .unwrap();

        assert_eq!(query.actor_user_id.as_deref(), Some("user-1"));
        assert_eq!(query.page_size, Some(10));
        assert_eq!(query.page, None);
    }
}
