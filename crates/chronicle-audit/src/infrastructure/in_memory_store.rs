//! Process-local audit record store with a user directory.
//!
//! Stands in for the external database in the development server and in
//! end-to-end tests. Nothing is persisted across restarts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chronicle_core::audit::{
    AuditLogPage, AuditLogRecord, AuditPersistence, ListAuditQuery, MAX_PAGE_SIZE, NewAuditLog,
    PageMeta, UserSummary,
};
use chronicle_core::clock::{Clock, SystemClock};
use chronicle_core::error::PersistenceError;
use uuid::Uuid;

/// Church assigned to entries and listings that do not name one.
pub const DEFAULT_CHURCH_ID: &str = "church-1";

#[derive(Debug, Default)]
struct StoreState {
    records: Vec<AuditLogRecord>,
    users: HashMap<String, UserSummary>,
}

/// In-memory [`AuditPersistence`].
pub struct InMemoryAuditStore {
    state: Mutex<StoreState>,
    default_church_id: String,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAuditStore")
            .field("default_church_id", &self.default_church_id)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHURCH_ID, Arc::new(SystemClock))
    }
}

impl InMemoryAuditStore {
    #[must_use]
    pub fn new(default_church_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            default_church_id: default_church_id.into(),
            clock,
        }
    }

    /// Registers `users` in the directory used for actor lookups.
    #[must_use]
    pub fn with_users(self, users: impl IntoIterator<Item = UserSummary>) -> Self {
        for user in users {
            self.add_user(user);
        }
        self
    }

    /// Adds or replaces one user.
    pub fn add_user(&self, user: UserSummary) {
        self.lock().users.insert(user.id.clone(), user);
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate(input: &NewAuditLog) -> Result<(), PersistenceError> {
    for (field, value) in [
        ("action", &input.action),
        ("entity", &input.entity),
        ("summary", &input.summary),
    ] {
        if value.trim().is_empty() {
            return Err(PersistenceError::Validation(format!("{field} must not be empty")));
        }
    }
    Ok(())
}

fn record_matches(record: &AuditLogRecord, church_id: &str, query: &ListAuditQuery) -> bool {
    record.church_id == church_id
        && query
            .actor_user_id
            .as_ref()
            .is_none_or(|actor| &record.actor_user_id == actor)
        && query.entity.as_ref().is_none_or(|entity| &record.entity == entity)
        && query
            .entity_id
            .as_ref()
            .is_none_or(|entity_id| record.entity_id.as_ref() == Some(entity_id))
        && query.from.is_none_or(|from| record.created_at >= from)
        && query.to.is_none_or(|to| record.created_at <= to)
}

#[async_trait]
impl AuditPersistence for InMemoryAuditStore {
    async fn create_audit_log(&self, input: NewAuditLog) -> Result<AuditLogRecord, PersistenceError> {
        validate(&input)?;
        let record = AuditLogRecord {
            id: format!("audit-{}", Uuid::now_v7()),
            church_id: input
                .church_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| self.default_church_id.clone()),
            actor_user_id: input.actor_user_id,
            action: input.action,
            entity: input.entity,
            entity_id: input.entity_id,
            summary: input.summary,
            diff: input.diff,
            metadata: input.metadata,
            created_at: input.created_at.unwrap_or_else(|| self.clock.now()),
        };
        self.lock().records.push(record.clone());
        Ok(record)
    }

    async fn list_audit_logs(&self, query: &ListAuditQuery) -> Result<AuditLogPage, PersistenceError> {
        let church_id = query
            .church_id
            .clone()
            .unwrap_or_else(|| self.default_church_id.clone());
        let page = query.page().max(1);
        let page_size = query.page_size().clamp(1, MAX_PAGE_SIZE);

        let mut matching: Vec<AuditLogRecord> = self
            .lock()
            .records
            .iter()
            .rev()
            .filter(|record| record_matches(record, &church_id, query))
            .cloned()
            .collect();
        // Later inserts come first among equal timestamps.
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let start = (page as usize - 1).saturating_mul(page_size as usize);
        let items = matching
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();
        Ok(AuditLogPage {
            items,
            meta: PageMeta {
                total,
                page,
                page_size,
            },
        })
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<UserSummary>, PersistenceError> {
        Ok(self.lock().users.get(user_id).cloned())
    }
}
