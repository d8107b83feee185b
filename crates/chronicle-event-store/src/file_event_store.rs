//! File-backed implementation of the `EventStore` trait.
//!
//! Events are stored as newline-delimited JSON, one self-contained record per
//! line, appended to the tail of a single file that is never rewritten.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use chronicle_core::clock::{Clock, SystemClock};
use chronicle_core::error::EventStoreError;
use chronicle_core::event::{DomainEvent, EventQuery, EventQueryResult, NewDomainEvent};
use chronicle_core::repository::EventStore;

/// Log location used when none is configured.
pub const DEFAULT_EVENT_STORE_PATH: &str = "storage/event-store.ndjson";

/// NDJSON event store.
///
/// The file and its parent directory are created lazily by the first append.
/// Appends from one instance are serialised; separate processes writing the
/// same file are not coordinated.
pub struct FileEventStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl fmt::Debug for FileEventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEventStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileEventStore {
    /// Creates a store writing to `path`, stamping events with system time.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    /// Creates a store writing to `path`, stamping events with `clock`.
    #[must_use]
    pub fn with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent_dir(&self) -> Result<(), EventStoreError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<DomainEvent>, EventStoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(EventStoreError::from))
            .collect()
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(&self, event: NewDomainEvent) -> Result<DomainEvent, EventStoreError> {
        let event = event.into_event(Uuid::new_v4(), self.clock.now());
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        self.ensure_parent_dir().await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;

        debug!(
            event_id = %event.id,
            aggregate_type = %event.aggregate_type,
            aggregate_id = %event.aggregate_id,
            event_type = %event.event_type,
            version = event.version,
            "event appended"
        );
        Ok(event)
    }

    async fn query(&self, query: &EventQuery) -> Result<EventQueryResult, EventStoreError> {
        let events = self.read_all().await?;
        let result = query.apply(events);
        debug!(
            total_count = result.total_count,
            returned = result.events.len(),
            "event log queried"
        );
        Ok(result)
    }

    async fn clear(&self) -> Result<(), EventStoreError> {
        let _guard = self.write_lock.lock().await;
        self.ensure_parent_dir().await?;
        fs::write(&self.path, b"").await?;
        info!(path = %self.path.display(), "event store cleared");
        Ok(())
    }
}
