//! Offline Queue Integration Tests
//!
//! Ordering, retry ceiling and failure classification of queue drains, plus
//! replay against a real block service and durability across reopen.

#[cfg(test)]
mod offline_queue_tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use pagespace_core::db::{LocalCache, MemoryCache, MemoryDocumentStore, SqliteCache, StoreError};
    use pagespace_core::services::{
        BlockService, BlockServiceError, ConnectivityMonitor, OfflineQueue, OperationExecutor,
    };
    use pagespace_core::{BlockType, CreateBlockParams, Operation, RichTextNode};
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const MAX_RETRIES: u32 = 3;

    /// Records every execution; per-block scripts decide the outcome
    #[derive(Default)]
    struct ScriptedExecutor {
        scripts: Mutex<HashMap<String, VecDeque<Result<(), BlockServiceError>>>>,
        attempts: Mutex<Vec<String>>,
        successes: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn script(&self, block_id: &str, results: Vec<Result<(), BlockServiceError>>) {
            self.scripts
                .lock()
                .unwrap()
                .insert(block_id.to_string(), results.into());
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }

        fn successes(&self) -> Vec<String> {
            self.successes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OperationExecutor for ScriptedExecutor {
        async fn execute(&self, operation: &Operation) -> Result<(), BlockServiceError> {
            let block_id = operation.block_id().unwrap_or_default().to_string();
            self.attempts.lock().unwrap().push(block_id.clone());
            let result = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&block_id)
                .and_then(|script| script.pop_front())
                .unwrap_or(Ok(()));
            if result.is_ok() {
                self.successes.lock().unwrap().push(block_id);
            }
            result
        }
    }

    /// Forwards to a block service, counting create calls
    struct CountingExecutor {
        service: BlockService,
        creates: Mutex<Vec<CreateBlockParams>>,
    }

    #[async_trait]
    impl OperationExecutor for CountingExecutor {
        async fn execute(&self, operation: &Operation) -> Result<(), BlockServiceError> {
            if let Operation::Create(params) = operation {
                self.creates.lock().unwrap().push(params.clone());
            }
            self.service.execute(operation).await
        }
    }

    /// Applies every operation, but reports the first one as timed out
    struct LostAckExecutor {
        service: BlockService,
        lose_next_ack: Mutex<bool>,
    }

    #[async_trait]
    impl OperationExecutor for LostAckExecutor {
        async fn execute(&self, operation: &Operation) -> Result<(), BlockServiceError> {
            self.service.execute(operation).await?;
            let mut lose = self.lose_next_ack.lock().unwrap();
            if *lose {
                *lose = false;
                return Err(StoreError::Timeout("ack lost".to_string()).into());
            }
            Ok(())
        }
    }

    fn transient() -> Result<(), BlockServiceError> {
        Err(StoreError::Timeout("deadline exceeded".to_string()).into())
    }

    fn update(block_id: &str) -> Operation {
        Operation::Update {
            block_id: block_id.to_string(),
            update: pagespace_core::BlockUpdate::new()
                .with_content(RichTextNode::from_plain(block_id)),
            user_id: "user-1".to_string(),
        }
    }

    fn offline_queue(executor: Arc<dyn OperationExecutor>) -> (OfflineQueue, ConnectivityMonitor) {
        let monitor = ConnectivityMonitor::new(false);
        let queue = OfflineQueue::new(
            Arc::new(MemoryCache::new()),
            executor,
            monitor.clone(),
            MAX_RETRIES,
        );
        (queue, monitor)
    }

    #[tokio::test]
    async fn test_drain_preserves_submission_order() -> Result<()> {
        let executor = Arc::new(ScriptedExecutor::default());
        for id in ["A", "B", "C"] {
            executor.script(id, vec![transient()]);
        }
        let (queue, monitor) = offline_queue(executor.clone());
        for id in ["A", "B", "C"] {
            queue.enqueue(update(id)).await?;
        }

        monitor.set_online(true);
        let mut drains = 0;
        while queue.status().await?.pending > 0 {
            queue.process_queue().await?;
            drains += 1;
            assert!(drains <= 10, "queue never drained");
        }

        assert_eq!(executor.successes(), vec!["A", "B", "C"]);
        // each stall stops the drain before anything behind it runs
        assert_eq!(executor.attempts(), vec!["A", "A", "B", "B", "C", "C"]);
        assert_eq!(queue.status().await?.failed, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_ceiling_moves_operation_to_failed() -> Result<()> {
        let executor = Arc::new(ScriptedExecutor::default());
        executor.script(
            "A",
            vec![transient(), transient(), transient(), transient()],
        );
        let (queue, monitor) = offline_queue(executor.clone());
        queue.enqueue(update("A")).await?;
        queue.enqueue(update("B")).await?;
        monitor.set_online(true);

        for expected_retry in 1..=MAX_RETRIES {
            let report = queue.process_queue().await?;
            assert!(report.stalled);
            let pending = queue.pending_operations().await?;
            assert_eq!(pending.len(), 2);
            assert_eq!(pending[0].retry_count, expected_retry);
        }

        // retries exhausted: A is given up on and B goes through
        let report = queue.process_queue().await?;
        assert_eq!(report.failed, 1);
        assert_eq!(report.executed, 1);
        assert!(!report.stalled);

        let status = queue.status().await?;
        assert_eq!((status.pending, status.failed), (0, 1));
        let failed = queue.failed_operations().await?;
        assert_eq!(failed[0].operation.operation, update("A"));
        assert_eq!(failed[0].operation.retry_count, MAX_RETRIES);
        Ok(())
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() -> Result<()> {
        let executor = Arc::new(ScriptedExecutor::default());
        executor.script(
            "A",
            vec![Err(StoreError::PermissionDenied("rules".to_string()).into())],
        );
        let (queue, monitor) = offline_queue(executor.clone());
        queue.enqueue(update("A")).await?;
        queue.enqueue(update("B")).await?;
        monitor.set_online(true);

        let report = queue.process_queue().await?;

        assert_eq!((report.executed, report.failed), (1, 1));
        assert_eq!(executor.attempts(), vec!["A", "B"]);
        let failed = queue.failed_operations().await?;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].operation.retry_count, 0);
        assert!(failed[0].error.contains("Permission denied"));
        Ok(())
    }

    #[tokio::test]
    async fn test_backend_signature_is_permanent() -> Result<()> {
        let executor = Arc::new(ScriptedExecutor::default());
        executor.script(
            "A",
            vec![Err(StoreError::Backend(
                "7 PERMISSION_DENIED: permission-denied".to_string(),
            )
            .into())],
        );
        let (queue, monitor) = offline_queue(executor.clone());
        queue.enqueue(update("A")).await?;
        monitor.set_online(true);

        let report = queue.process_queue().await?;
        assert_eq!(report.failed, 1);
        assert_eq!(queue.status().await?.pending, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_create_replays_exactly_once() -> Result<()> {
        let service = BlockService::new(Arc::new(MemoryDocumentStore::new()));
        let executor = Arc::new(CountingExecutor {
            service: service.clone(),
            creates: Mutex::new(Vec::new()),
        });
        let (queue, monitor) = offline_queue(executor.clone());

        let params = CreateBlockParams::new(
            BlockType::Todo,
            "page-1",
            "user-1",
            RichTextNode::from_plain("buy milk"),
        )
        .with_id("block-1");
        queue.enqueue(Operation::Create(params.clone())).await?;
        assert!(executor.creates.lock().unwrap().is_empty());

        monitor.set_online(true);
        queue.process_queue().await?;

        assert_eq!(*executor.creates.lock().unwrap(), vec![params]);
        assert_eq!(queue.status().await?.pending, 0);

        let block = service.get("block-1").await?.expect("replayed block");
        assert_eq!(block.plain_text, "buy milk");
        assert_eq!(block.position, "a0");
        Ok(())
    }

    #[tokio::test]
    async fn test_create_without_id_is_idempotent_on_retry() -> Result<()> {
        let service = BlockService::new(Arc::new(MemoryDocumentStore::new()));
        let executor = Arc::new(LostAckExecutor {
            service: service.clone(),
            lose_next_ack: Mutex::new(true),
        });
        let (queue, monitor) = offline_queue(executor);

        let queued = queue
            .enqueue(Operation::Create(CreateBlockParams::new(
                BlockType::Paragraph,
                "page-1",
                "user-1",
                RichTextNode::from_plain("draft"),
            )))
            .await?;
        let block_id = queued.block_id().expect("id assigned on enqueue").to_string();
        queue.enqueue(update(&block_id)).await?;

        monitor.set_online(true);
        // the write lands but is reported as a timeout
        let report = queue.process_queue().await?;
        assert!(report.stalled);
        assert_eq!(service.list_by_page("page-1").await?.len(), 1);

        let report = queue.process_queue().await?;
        assert_eq!(report.executed, 2);

        let blocks = service.list_by_page("page-1").await?;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, block_id);
        assert_eq!(blocks[0].plain_text, block_id);
        assert_eq!(blocks[0].version, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_after_create_lands_in_order() -> Result<()> {
        let service = BlockService::new(Arc::new(MemoryDocumentStore::new()));
        let (queue, monitor) = offline_queue(Arc::new(service.clone()));

        queue
            .enqueue(Operation::Create(
                CreateBlockParams::new(
                    BlockType::Paragraph,
                    "page-1",
                    "user-1",
                    RichTextNode::from_plain("draft"),
                )
                .with_id("block-1"),
            ))
            .await?;
        queue.enqueue(update("block-1")).await?;

        monitor.set_online(true);
        let report = queue.process_queue().await?;

        assert_eq!(report.executed, 2);
        let block = service.get("block-1").await?.expect("block exists");
        assert_eq!(block.plain_text, "block-1");
        assert_eq!(block.version, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_operations_survive_restart() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("queue.db");
        let executor = Arc::new(ScriptedExecutor::default());

        {
            let cache = Arc::new(SqliteCache::open(db_path.clone()).await?);
            let queue = OfflineQueue::new(
                cache,
                executor.clone(),
                ConnectivityMonitor::new(false),
                MAX_RETRIES,
            );
            queue.enqueue(update("A")).await?;
            queue.enqueue(update("B")).await?;
        }

        let cache: Arc<dyn LocalCache> = Arc::new(SqliteCache::open(db_path).await?);
        let queue = OfflineQueue::new(
            cache,
            executor.clone(),
            ConnectivityMonitor::new(true),
            MAX_RETRIES,
        );
        assert_eq!(queue.status().await?.pending, 2);

        let report = queue.process_queue().await?;
        assert_eq!(report.executed, 2);
        assert_eq!(executor.successes(), vec!["A", "B"]);
        assert_eq!(queue.status().await?.pending, 0);
        Ok(())
    }
}
