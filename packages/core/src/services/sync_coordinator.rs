//! Sync Coordinator
//!
//! Background task that decides when the offline queue drains:
//!
//! - on every offline to online transition
//! - on the optional periodic timer (`drain_interval_secs`)
//! - on an explicit [`SyncHandle::flush`]
//!
//! It also mirrors live page snapshots into the Local Cache so reads can be
//! served before the network answers. Everything stops on
//! [`SyncHandle::shutdown`].

use crate::config::CoreConfig;
use crate::db::LocalCache;
use crate::models::{Block, CachedPage, Page};
use crate::services::block_service::BlockService;
use crate::services::connectivity::ConnectivityMonitor;
use crate::services::offline_queue::OfflineQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_stream::StreamExt;

/// Starts the drain loop; page mirrors hang off the returned [`SyncHandle`]
pub struct SyncCoordinator;

impl SyncCoordinator {
    /// Spawn the drain loop for `queue`, driven by `monitor` and `config`
    ///
    /// Drains once at start when already online.
    pub fn start(
        queue: Arc<OfflineQueue>,
        monitor: ConnectivityMonitor,
        config: &CoreConfig,
    ) -> SyncHandle {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(8);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut online_rx = monitor.subscribe();
        let mut ticker = config.drain_interval_secs.map(|secs| {
            let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        tracing::info!(
            drain_interval_secs = ?config.drain_interval_secs,
            "Sync coordinator starting"
        );

        let drain_queue = queue.clone();
        let task = tokio::spawn(async move {
            let mut was_online = *online_rx.borrow_and_update();
            if was_online {
                drain(&drain_queue, "startup").await;
            }

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        tracing::info!("Sync coordinator shutting down");
                        break;
                    }

                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            tracing::debug!("Connectivity monitor dropped, stopping sync");
                            break;
                        }
                        let online = *online_rx.borrow_and_update();
                        if online && !was_online {
                            drain(&drain_queue, "reconnect").await;
                        }
                        was_online = online;
                    }

                    Some(_) = trigger_rx.recv() => {
                        // coalesce rapid flushes
                        while trigger_rx.try_recv().is_ok() {}
                        drain(&drain_queue, "flush").await;
                    }

                    _ = next_tick(&mut ticker) => {
                        drain(&drain_queue, "timer").await;
                    }
                }
            }
        });

        SyncHandle {
            queue,
            trigger_tx,
            shutdown_tx,
            tasks: vec![task],
        }
    }
}

/// Control handle for a running [`SyncCoordinator`]
pub struct SyncHandle {
    queue: Arc<OfflineQueue>,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    /// Request a drain now; no-op when one is already requested
    pub fn flush(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Mirror `page` into the queue's Local Cache until shutdown
    pub fn mirror_page(&mut self, blocks: &BlockService, page: Page) {
        let blocks = blocks.clone();
        let queue = self.queue.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let task = tokio::spawn(async move {
            let mut snapshots = blocks.subscribe_page(&page.id);
            tracing::debug!(page_id = %page.id, "Mirroring page into local cache");
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => break,

                    snapshot = snapshots.next() => match snapshot {
                        Some(snapshot) => {
                            // the queue may have degraded to memory since the last write
                            let cache = queue.cache();
                            save_snapshot(cache.as_ref(), &page, snapshot).await;
                        }
                        None => break,
                    },
                }
            }
        });
        self.tasks.push(task);
    }

    /// Stop the drain loop and every page mirror, waiting for them to exit
    ///
    /// A drain in progress runs to completion first.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down sync coordinator");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Sync task ended abnormally: {}", e);
            }
        }
    }
}

async fn drain(queue: &OfflineQueue, trigger: &str) {
    match queue.process_queue().await {
        Ok(report) if report.skipped => {
            tracing::debug!(trigger, "Queue drain skipped");
        }
        Ok(report) => {
            tracing::debug!(
                trigger,
                executed = report.executed,
                failed = report.failed,
                stalled = report.stalled,
                "Queue drain triggered"
            );
        }
        Err(e) => {
            tracing::error!(trigger, "Queue drain failed: {}", e);
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn save_snapshot(cache: &dyn LocalCache, page: &Page, blocks: Vec<Block>) {
    let count = blocks.len();
    if let Err(e) = cache.save_page(&CachedPage::new(page.clone(), blocks)).await {
        tracing::warn!(page_id = %page.id, "Failed to mirror page snapshot: {}", e);
    } else {
        tracing::trace!(page_id = %page.id, blocks = count, "Mirrored page snapshot");
    }
}
