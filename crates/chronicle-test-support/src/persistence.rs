//! Test persistence: mock `AuditPersistence` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use chronicle_core::audit::{
    AuditLogPage, AuditLogRecord, AuditPersistence, ListAuditQuery, NewAuditLog, PageMeta,
    UserProfile, UserSummary,
};
use chronicle_core::error::PersistenceError;

/// Builds a user summary with predictable contents for `id`.
#[must_use]
pub fn sample_user(id: &str) -> UserSummary {
    UserSummary {
        id: id.to_owned(),
        primary_email: format!("{id}@example.com"),
        profile: UserProfile {
            first_name: "Test".to_owned(),
            last_name: id.to_owned(),
        },
    }
}

/// A persistence store that records every call. `list_audit_logs` returns
/// the configured page (or a backend error while failure is switched on),
/// `create_audit_log` echoes the input back as a record, and
/// `get_user_by_id` answers from the registered users.
#[derive(Debug)]
pub struct RecordingAuditPersistence {
    page: Mutex<AuditLogPage>,
    users: Mutex<HashMap<String, UserSummary>>,
    failing_lists: Mutex<bool>,
    created: Mutex<Vec<NewAuditLog>>,
    list_calls: Mutex<Vec<ListAuditQuery>>,
    user_lookups: Mutex<Vec<String>>,
}

impl Default for RecordingAuditPersistence {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RecordingAuditPersistence {
    /// Create a store whose listings return `items` on a single page.
    #[must_use]
    pub fn new(items: Vec<AuditLogRecord>) -> Self {
        let total = items.len() as u64;
        Self {
            page: Mutex::new(AuditLogPage {
                items,
                meta: PageMeta {
                    total,
                    page: 1,
                    page_size: 50,
                },
            }),
            users: Mutex::new(HashMap::new()),
            failing_lists: Mutex::new(false),
            created: Mutex::new(Vec::new()),
            list_calls: Mutex::new(Vec::new()),
            user_lookups: Mutex::new(Vec::new()),
        }
    }

    /// Register a user that `get_user_by_id` will resolve.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_user(self, user: UserSummary) -> Self {
        self.users.lock().unwrap().insert(user.id.clone(), user);
        self
    }

    /// Make subsequent `list_audit_logs` calls fail (or succeed again).
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_list_failure(&self, failing: bool) {
        *self.failing_lists.lock().unwrap() = failing;
    }

    /// Inputs passed to `create_audit_log`, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn created(&self) -> Vec<NewAuditLog> {
        self.created.lock().unwrap().clone()
    }

    /// Queries passed to `list_audit_logs`, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn list_calls(&self) -> Vec<ListAuditQuery> {
        self.list_calls.lock().unwrap().clone()
    }

    /// User ids passed to `get_user_by_id`, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn user_lookups(&self) -> Vec<String> {
        self.user_lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditPersistence for RecordingAuditPersistence {
    async fn create_audit_log(&self, input: NewAuditLog) -> Result<AuditLogRecord, PersistenceError> {
        let mut created = self.created.lock().unwrap();
        created.push(input.clone());
        Ok(AuditLogRecord {
            id: format!("audit-{}", created.len()),
            church_id: input.church_id.unwrap_or_else(|| "church-default".to_owned()),
            actor_user_id: input.actor_user_id,
            action: input.action,
            entity: input.entity,
            entity_id: input.entity_id,
            summary: input.summary,
            diff: input.diff,
            metadata: input.metadata,
            created_at: input.created_at.unwrap_or_else(Utc::now),
        })
    }

    async fn list_audit_logs(&self, query: &ListAuditQuery) -> Result<AuditLogPage, PersistenceError> {
        self.list_calls.lock().unwrap().push(query.clone());
        if *self.failing_lists.lock().unwrap() {
            return Err(PersistenceError::Backend("connection refused".into()));
        }
        Ok(self.page.lock().unwrap().clone())
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<UserSummary>, PersistenceError> {
        self.user_lookups.lock().unwrap().push(user_id.to_owned());
        Ok(self.users.lock().unwrap().get(user_id).cloned())
    }
}

/// A persistence store that always returns a backend error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingAuditPersistence;

#[async_trait]
impl AuditPersistence for FailingAuditPersistence {
    async fn create_audit_log(&self, _input: NewAuditLog) -> Result<AuditLogRecord, PersistenceError> {
        Err(PersistenceError::Backend("connection refused".into()))
    }

    async fn list_audit_logs(&self, _query: &ListAuditQuery) -> Result<AuditLogPage, PersistenceError> {
        Err(PersistenceError::Backend("connection refused".into()))
    }

    async fn get_user_by_id(&self, _user_id: &str) -> Result<Option<UserSummary>, PersistenceError> {
        Err(PersistenceError::Backend("connection refused".into()))
    }
}
