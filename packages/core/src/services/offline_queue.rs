//! Offline Operation Queue
//!
//! Durable, order-preserving delivery of block mutations.
//!
//! # Drain policy
//!
//! Pending operations replay in timestamp order, one at a time:
//!
//! - success removes the operation and moves on
//! - a permanent failure moves it to the failed store and moves on
//! - a transient failure with `retry_count < max_retries` bumps the count and
//!   stops the drain, so nothing overtakes a stalled operation
//! - a transient failure at the ceiling is treated as permanent
//!
//! At most one drain runs at a time; a drain requested while offline or while
//! another is running is skipped.
//!
//! # Storage degradation
//!
//! When the durable cache reports `StorageUnavailable` the queue switches to a
//! [`MemoryCache`] and keeps going. Operations queued from then on do not
//! survive a restart.

use crate::config::CoreConfig;
use crate::db::{CacheError, LocalCache, MemoryCache, SqliteCache};
use crate::models::{FailedOperation, Operation, QueuedOperation};
use crate::services::block_service::OperationExecutor;
use crate::services::connectivity::ConnectivityMonitor;
use crate::services::error::{classify, OperationFailure};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Counts a UI needs for "N changes not yet saved / failed" states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub pending: usize,
    pub failed: usize,
    pub processing: bool,
    pub online: bool,
    pub degraded: bool,
}

/// Outcome of one [`OfflineQueue::process_queue`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations applied and removed
    pub executed: usize,
    /// Operations moved to the failed store
    pub failed: usize,
    /// Drain stopped early on a transient failure or lost connectivity
    pub stalled: bool,
    /// Drain did not run (offline or already running)
    pub skipped: bool,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Resets the in-progress flag however the drain ends
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Durable queue of deferred block mutations
pub struct OfflineQueue {
    cache: RwLock<Arc<dyn LocalCache>>,
    executor: Arc<dyn OperationExecutor>,
    connectivity: ConnectivityMonitor,
    max_retries: u32,
    processing: AtomicBool,
    degraded: AtomicBool,
}

impl OfflineQueue {
    pub fn new(
        cache: Arc<dyn LocalCache>,
        executor: Arc<dyn OperationExecutor>,
        connectivity: ConnectivityMonitor,
        max_retries: u32,
    ) -> Self {
        Self {
            cache: RwLock::new(cache),
            executor,
            connectivity,
            max_retries,
            processing: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
        }
    }

    /// Build a queue from configuration
    ///
    /// Opens the libsql cache at `config.cache_path`, or starts in memory when
    /// no path is configured or the file cannot be opened.
    pub async fn from_config(
        config: &CoreConfig,
        executor: Arc<dyn OperationExecutor>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let (cache, degraded): (Arc<dyn LocalCache>, bool) = match &config.cache_path {
            Some(path) => match SqliteCache::open(path.clone()).await {
                Ok(cache) => (Arc::new(cache), false),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        "Local storage unavailable, queue will not survive restarts: {}",
                        e
                    );
                    (Arc::new(MemoryCache::new()), true)
                }
            },
            None => (Arc::new(MemoryCache::new()), false),
        };

        let queue = Self::new(cache, executor, connectivity, config.max_retries);
        queue.degraded.store(degraded, Ordering::SeqCst);
        queue
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Cache currently backing the queue
    pub fn cache(&self) -> Arc<dyn LocalCache> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Persist `operation` and, when online, attempt a drain right away
    ///
    /// Succeeds once the operation is persisted; a failing drain is logged and
    /// left to the next trigger.
    pub async fn enqueue(&self, operation: Operation) -> Result<QueuedOperation, CacheError> {
        let queued = QueuedOperation::new(operation);
        let record = &queued;
        self.with_cache(|cache| async move { cache.enqueue_operation(record).await })
            .await?;

        tracing::debug!(
            operation_id = %queued.id,
            kind = %queued.kind(),
            "Enqueued operation"
        );

        if self.connectivity.is_online() {
            if let Err(e) = self.process_queue().await {
                tracing::warn!(
                    operation_id = %queued.id,
                    "Operation queued but drain failed: {}",
                    e
                );
            }
        }
        Ok(queued)
    }

    /// Replay pending operations in order until empty, stalled or offline
    pub async fn process_queue(&self) -> Result<DrainReport, CacheError> {
        if !self.connectivity.is_online() {
            tracing::debug!("Offline, skipping queue drain");
            return Ok(DrainReport::skipped());
        }
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Queue drain already in progress");
            return Ok(DrainReport::skipped());
        }
        let _guard = ProcessingGuard(&self.processing);

        let mut report = DrainReport::default();
        tracing::info!("Draining offline queue");

        // operations enqueued during a pass are picked up by the next one
        'drain: loop {
            let pending = self
                .with_cache(|cache| async move { cache.list_pending_operations().await })
                .await?;
            if pending.is_empty() {
                break;
            }

            for operation in pending {
                if !self.connectivity.is_online() {
                    tracing::info!("Connectivity lost, pausing queue drain");
                    report.stalled = true;
                    break 'drain;
                }

                match self.executor.execute(&operation.operation).await {
                    Ok(()) => {
                        let id = operation.id.as_str();
                        self.with_cache(|cache| async move { cache.remove_operation(id).await })
                            .await?;
                        report.executed += 1;
                    }
                    Err(error) => match classify(&error) {
                        OperationFailure::Transient { reason }
                            if operation.retry_count < self.max_retries =>
                        {
                            let id = operation.id.as_str();
                            let retry_count = self
                                .with_cache(|cache| async move { cache.increment_retry(id).await })
                                .await?;
                            tracing::warn!(
                                operation_id = %operation.id,
                                kind = %operation.kind(),
                                retry_count,
                                "Queued operation failed, stopping drain: {}",
                                reason
                            );
                            report.stalled = true;
                            break 'drain;
                        }
                        failure => {
                            tracing::warn!(
                                operation_id = %operation.id,
                                kind = %operation.kind(),
                                retry_count = operation.retry_count,
                                "Queued operation failed permanently: {}",
                                failure
                            );
                            let failed = FailedOperation::new(operation, failure.reason());
                            let record = &failed;
                            self.with_cache(|cache| async move { cache.move_to_failed(record).await })
                                .await?;
                            report.failed += 1;
                        }
                    },
                }
            }
        }

        tracing::info!(
            executed = report.executed,
            failed = report.failed,
            stalled = report.stalled,
            "Offline queue drain finished"
        );
        Ok(report)
    }

    pub async fn status(&self) -> Result<QueueStatus, CacheError> {
        let pending = self
            .with_cache(|cache| async move { cache.list_pending_operations().await })
            .await?
            .len();
        let failed = self
            .with_cache(|cache| async move { cache.list_failed_operations().await })
            .await?
            .len();

        Ok(QueueStatus {
            pending,
            failed,
            processing: self.is_processing(),
            online: self.connectivity.is_online(),
            degraded: self.is_degraded(),
        })
    }

    pub async fn pending_operations(&self) -> Result<Vec<QueuedOperation>, CacheError> {
        self.with_cache(|cache| async move { cache.list_pending_operations().await })
            .await
    }

    pub async fn failed_operations(&self) -> Result<Vec<FailedOperation>, CacheError> {
        self.with_cache(|cache| async move { cache.list_failed_operations().await })
            .await
    }

    /// Move a failed operation back to pending with a fresh retry budget
    ///
    /// The original timestamp is kept, so the operation replays in its
    /// submission slot. No drain is triggered.
    pub async fn retry_failed(&self, operation_id: &str) -> Result<QueuedOperation, CacheError> {
        let failed = self
            .failed_operations()
            .await?
            .into_iter()
            .find(|failed| failed.id() == operation_id)
            .ok_or_else(|| CacheError::NotFound(operation_id.to_string()))?;

        let mut queued = failed.operation;
        queued.retry_count = 0;

        let record = &queued;
        self.with_cache(|cache| async move { cache.enqueue_operation(record).await })
            .await?;
        self.with_cache(|cache| async move { cache.remove_failed_operation(operation_id).await })
            .await?;

        tracing::debug!(operation_id = %operation_id, "Failed operation requeued");
        Ok(queued)
    }

    /// Drop every failed operation record
    pub async fn clear_failed(&self) -> Result<usize, CacheError> {
        let failed = self.failed_operations().await?;
        for record in &failed {
            let id = record.id();
            self.with_cache(|cache| async move { cache.remove_failed_operation(id).await })
                .await?;
        }
        Ok(failed.len())
    }

    /// Run `op` against the current cache, degrading to memory once on
    /// `StorageUnavailable`
    async fn with_cache<T, F, Fut>(&self, op: F) -> Result<T, CacheError>
    where
        F: Fn(Arc<dyn LocalCache>) -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        match op(self.cache()).await {
            Err(error) if error.is_storage_unavailable() && !self.is_degraded() => {
                self.degrade(&error);
                op(self.cache()).await
            }
            result => result,
        }
    }

    fn degrade(&self, error: &CacheError) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if self.degraded.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::warn!(
            "Local storage unavailable, falling back to in-memory queue: {}",
            error
        );
        *cache = Arc::new(MemoryCache::new());
    }
}
