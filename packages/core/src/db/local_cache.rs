//! Local Cache - durable client-side mirror
//!
//! The Local Cache holds two independent stores:
//!
//! - **pages**: `CachedPage` mirrors keyed by page id, for instant reads
//!   before the network answers
//! - **operations**: pending and failed `QueuedOperation` records, so queued
//!   mutations survive process restarts
//!
//! Every call can fail with [`CacheError::StorageUnavailable`]. Callers are
//! expected to degrade to in-memory behavior rather than fail hard; the
//! offline queue does this by switching to a [`MemoryCache`].

use crate::db::CacheError;
use crate::models::{CachedPage, FailedOperation, QueuedOperation};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Durable key/value mirror for pages and queued operations
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Insert or replace a page mirror
    async fn save_page(&self, page: &CachedPage) -> Result<(), CacheError>;

    async fn get_page(&self, page_id: &str) -> Result<Option<CachedPage>, CacheError>;

    /// Page mirrors of a workspace, most recently updated first
    async fn list_pages_by_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<CachedPage>, CacheError>;

    async fn delete_page(&self, page_id: &str) -> Result<(), CacheError>;

    /// Persist a new pending operation
    async fn enqueue_operation(&self, operation: &QueuedOperation) -> Result<(), CacheError>;

    /// Pending operations ascending by timestamp, then enqueue order
    async fn list_pending_operations(&self) -> Result<Vec<QueuedOperation>, CacheError>;

    /// Bump `retry_count` of a pending operation, returning the new count
    async fn increment_retry(&self, operation_id: &str) -> Result<u32, CacheError>;

    /// Remove a pending operation; removing a missing id succeeds
    async fn remove_operation(&self, operation_id: &str) -> Result<(), CacheError>;

    /// Atomically record `failed` and drop it from the pending store
    async fn move_to_failed(&self, failed: &FailedOperation) -> Result<(), CacheError>;

    /// Failed operations, oldest failure first
    async fn list_failed_operations(&self) -> Result<Vec<FailedOperation>, CacheError>;

    async fn remove_failed_operation(&self, operation_id: &str) -> Result<(), CacheError>;

    /// Drop every page mirror and every pending or failed operation
    async fn clear_all(&self) -> Result<(), CacheError>;
}

#[derive(Default)]
struct MemoryState {
    pages: HashMap<String, CachedPage>,
    pending: Vec<QueuedOperation>,
    failed: Vec<FailedOperation>,
}

/// Non-durable [`LocalCache`] kept entirely in process memory
///
/// Used when durable storage is unavailable and in tests.
/// [`MemoryCache::set_unavailable`] makes every call fail with
/// `StorageUnavailable`.
#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::storage_unavailable("memory cache disabled"));
        }
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn save_page(&self, page: &CachedPage) -> Result<(), CacheError> {
        self.state()?
            .pages
            .insert(page.id().to_string(), page.clone());
        Ok(())
    }

    async fn get_page(&self, page_id: &str) -> Result<Option<CachedPage>, CacheError> {
        Ok(self.state()?.pages.get(page_id).cloned())
    }

    async fn list_pages_by_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<CachedPage>, CacheError> {
        let mut pages: Vec<CachedPage> = self
            .state()?
            .pages
            .values()
            .filter(|page| page.workspace_id() == workspace_id)
            .cloned()
            .collect();
        pages.sort_by(|a, b| {
            b.page
                .updated_at
                .cmp(&a.page.updated_at)
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(pages)
    }

    async fn delete_page(&self, page_id: &str) -> Result<(), CacheError> {
        self.state()?.pages.remove(page_id);
        Ok(())
    }

    async fn enqueue_operation(&self, operation: &QueuedOperation) -> Result<(), CacheError> {
        self.state()?.pending.push(operation.clone());
        Ok(())
    }

    async fn list_pending_operations(&self) -> Result<Vec<QueuedOperation>, CacheError> {
        let mut pending = self.state()?.pending.clone();
        // stable: equal timestamps keep enqueue order
        pending.sort_by_key(|op| op.timestamp);
        Ok(pending)
    }

    async fn increment_retry(&self, operation_id: &str) -> Result<u32, CacheError> {
        let mut state = self.state()?;
        let operation = state
            .pending
            .iter_mut()
            .find(|op| op.id == operation_id)
            .ok_or_else(|| CacheError::NotFound(operation_id.to_string()))?;
        operation.retry_count += 1;
        Ok(operation.retry_count)
    }

    async fn remove_operation(&self, operation_id: &str) -> Result<(), CacheError> {
        self.state()?.pending.retain(|op| op.id != operation_id);
        Ok(())
    }

    async fn move_to_failed(&self, failed: &FailedOperation) -> Result<(), CacheError> {
        let mut state = self.state()?;
        state.pending.retain(|op| op.id != failed.id());
        state.failed.retain(|f| f.id() != failed.id());
        state.failed.push(failed.clone());
        Ok(())
    }

    async fn list_failed_operations(&self) -> Result<Vec<FailedOperation>, CacheError> {
        let mut failed = self.state()?.failed.clone();
        failed.sort_by_key(|f| f.failed_at);
        Ok(failed)
    }

    async fn remove_failed_operation(&self, operation_id: &str) -> Result<(), CacheError> {
        self.state()?.failed.retain(|f| f.id() != operation_id);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), CacheError> {
        *self.state()? = MemoryState::default();
        Ok(())
    }
}
