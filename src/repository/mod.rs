//! Lamp repository contract and its two backing stores.
//!
//! ```text
//!            ┌──────────────────────────┐
//!            │   dyn LampRepository     │  ← HTTP handlers, pagination
//!            └──────────────────────────┘
//!               ↓                     ↓
//! ┌─────────────────────────┐ ┌──────────────────────────┐
//! │ InMemoryLampRepository  │ │  SqliteLampRepository    │
//! │ - DashMap shards        │ │ - soft delete (tombstone)│
//! │ - CAS update loop       │ │ - deadline per statement │
//! └─────────────────────────┘ └──────────────────────────┘
//! ```
//!
//! Both stores expose the same total order for `list`: `created_at`
//! ascending, ties broken by the raw id bytes ascending.

use std::cmp::Ordering;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::RepositoryResult;
use crate::lamp::LampEntity;

mod memory;
mod sqlite;

pub use memory::InMemoryLampRepository;
pub use sqlite::SqliteLampRepository;

#[cfg(test)]
mod tests;

/// Hard cap on rows returned by a single durable `list` call.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Storage contract shared by every lamp store.
///
/// All reads return owned copies. `NotFound` covers ids that never existed
/// and ids that were deleted.
#[async_trait]
pub trait LampRepository: Send + Sync {
    /// Short label of the backing store, used in logs and health output.
    fn backend(&self) -> &'static str;

    /// Insert a lamp keyed by its id. Never fails on a duplicate id.
    async fn create(&self, lamp: LampEntity) -> RepositoryResult<()>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<LampEntity>;

    /// Replace the full state of an existing lamp.
    ///
    /// Returns `NotFound` if the id is not live, including when a concurrent
    /// delete got there first.
    async fn update(&self, lamp: LampEntity) -> RepositoryResult<()>;

    /// Remove a lamp. A second delete of the same id returns `NotFound`.
    async fn delete(&self, id: Uuid) -> RepositoryResult<()>;

    /// Window `[offset, offset + limit)` of the total order.
    ///
    /// Negative offsets are treated as zero, non-positive limits and offsets
    /// past the end yield an empty page.
    async fn list(&self, offset: i64, limit: i64) -> RepositoryResult<Vec<LampEntity>>;

    async fn exists(&self, id: Uuid) -> RepositoryResult<bool>;
}

/// Total order used by `list`: `created_at`, then id bytes.
pub fn listing_order(a: &LampEntity, b: &LampEntity) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.as_bytes().cmp(b.id.as_bytes()))
}

/// Normalized `list` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Window {
    /// Clamp raw arguments. `None` means the page is empty by definition.
    pub fn new(offset: i64, limit: i64) -> Option<Self> {
        if limit <= 0 {
            return None;
        }
        Some(Self {
            offset: usize::try_from(offset.max(0)).unwrap_or(usize::MAX),
            limit: usize::try_from(limit).unwrap_or(usize::MAX),
        })
    }

    /// Same window with the limit capped at `max`.
    pub fn capped(self, max: usize) -> Self {
        Self {
            offset: self.offset,
            limit: self.limit.min(max),
        }
    }

    /// Index range of this window within a sequence of `len` items.
    pub fn range(&self, len: usize) -> Range<usize> {
        let start = self.offset.min(len);
        let end = start.saturating_add(self.limit).min(len);
        start..end
    }
}

/// Open the store selected by `config`.
pub fn open_repository(config: &StorageConfig) -> RepositoryResult<Arc<dyn LampRepository>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage for lamp repository");
            Ok(Arc::new(InMemoryLampRepository::new()))
        }
        StorageBackend::Sqlite => {
            let timeout = Duration::from_millis(config.query_timeout_ms);
            let repo = SqliteLampRepository::open(&config.database_path, timeout)?;
            info!(
                path = %config.database_path,
                query_timeout_ms = config.query_timeout_ms,
                "Using SQLite storage for lamp repository"
            );
            Ok(Arc::new(repo))
        }
    }
}
