//! # Sync Worker
//!
//! Background task that drains the sync queue.
//!
//! ## Wake-ups
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   interval tick (30 s) ──┐                                             │
//! │                          ├──► SyncQueue::process_queue(backend)        │
//! │   SyncQueue::add() ──────┤         runs until the queue is empty       │
//! │   handle.trigger() ──────┘                                             │
//! │                                                                         │
//! │   handle.shutdown() ──► stops between items or mid-backoff             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::{SyncError, SyncResult};
use crate::queue::SyncQueue;
use crate::remote::RemoteBackend;

/// Drains the queue on a timer and whenever something is enqueued.
pub struct SyncWorker {
    queue: SyncQueue,
    backend: Arc<dyn RemoteBackend>,
    poll_interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the sync worker.
#[derive(Clone)]
pub struct SyncWorkerHandle {
    queue: SyncQueue,
    shutdown_tx: mpsc::Sender<()>,
}

impl SyncWorkerHandle {
    /// Requests an immediate drain.
    pub fn trigger(&self) {
        self.queue.wake();
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }
}

impl SyncWorker {
    /// Creates a worker and returns its handle. Spawn [`run`](Self::run).
    pub fn new(queue: SyncQueue, backend: Arc<dyn RemoteBackend>) -> (Self, SyncWorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let poll_interval = queue.settings().poll_interval();

        let worker = SyncWorker {
            queue: queue.clone(),
            backend,
            poll_interval,
            shutdown_rx,
        };
        let handle = SyncWorkerHandle { queue, shutdown_tx };

        (worker, handle)
    }

    /// Runs the worker loop until shutdown.
    pub async fn run(mut self) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "Sync worker starting"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Poll on interval
                _ = interval.tick() => {
                    if !self.drain("timer").await {
                        break;
                    }
                }

                // Something was enqueued
                _ = self.queue.wait_for_work() => {
                    if !self.drain("enqueue").await {
                        break;
                    }
                }

                // Shutdown
                _ = self.shutdown_rx.recv() => {
                    info!("Sync worker shutting down");
                    break;
                }
            }
        }

        info!("Sync worker stopped");
    }

    /// Runs one drain. Returns false if shutdown was requested meanwhile.
    async fn drain(&mut self, reason: &'static str) -> bool {
        if self.queue.is_empty() {
            return true;
        }
        debug!(reason, queued = self.queue.len(), "Draining sync queue");

        let queue = self.queue.clone();
        let backend = Arc::clone(&self.backend);

        tokio::select! {
            result = queue.process_queue(backend.as_ref()) => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to process sync queue");
                }
                true
            }
            _ = self.shutdown_rx.recv() => {
                info!("Sync worker shutting down mid-drain");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::mutation::Mutation;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tillbox_core::{InventoryRecord, Money};
    use tillbox_db::LocalStore;

    #[derive(Default)]
    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteBackend for CountingBackend {
        async fn apply(&self, _mutation: &Mutation) -> SyncResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn record() -> InventoryRecord {
        InventoryRecord::new("p1", "u1", 3, Money::from_cents(100), Money::from_cents(200))
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_wakes_worker() {
        let queue = SyncQueue::new(LocalStore::new(), SyncSettings::default());
        let backend = Arc::new(CountingBackend::default());
        let (worker, handle) = SyncWorker::new(queue.clone(), backend.clone());
        let task = tokio::spawn(worker.run());

        // Let the first (immediate) tick pass on an empty queue.
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.enqueue_inventory(&record()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(queue.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_drains_existing_backlog() {
        let store = LocalStore::new();
        // Queued before any worker existed, e.g. loaded from device storage.
        SyncQueue::new(store.clone(), SyncSettings::default())
            .enqueue_inventory(&record())
            .unwrap();

        let queue = SyncQueue::new(store, SyncSettings::default());
        let backend = Arc::new(CountingBackend::default());
        let (worker, handle) = SyncWorker::new(queue.clone(), backend.clone());
        let task = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(queue.is_empty());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
