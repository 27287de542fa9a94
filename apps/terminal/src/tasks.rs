//! # Background Tasks
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Terminal Background Tasks                          │
//! │                                                                         │
//! │  AutoSaver      store event ──► 250 ms window ──► persister.save()     │
//! │  SyncWorker     30 s timer / enqueue ──► process_queue(RestBackend)    │
//! │                 (online mode only)                                     │
//! │  BackupTimer    interval_mins ──► create_backup() + prune              │
//! │                 (interval_mins = 0 disables it)                        │
//! │                                                                         │
//! │  shutdown(): sync worker ─► backup timer ─► auto-saver (final save)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use tillbox_db::{AutoSaver, AutoSaverHandle, BackupService};
use tillbox_sync::{RestBackend, SyncWorker, SyncWorkerHandle};

use crate::error::TerminalResult;
use crate::terminal::{backup_and_prune, Terminal};

// =============================================================================
// Backup Timer
// =============================================================================

/// Writes a backup every `interval`.
pub struct BackupTimer {
    backups: BackupService,
    keep: usize,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a [`BackupTimer`].
#[derive(Debug, Clone)]
pub struct BackupTimerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl BackupTimerHandle {
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl BackupTimer {
    pub fn new(backups: BackupService, keep: usize, interval: Duration) -> (Self, BackupTimerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let timer = BackupTimer {
            backups,
            keep,
            interval,
            shutdown_rx,
        };
        (timer, BackupTimerHandle { shutdown_tx })
    }

    pub async fn run(mut self) {
        info!(
            interval_mins = self.interval.as_secs() / 60,
            keep = self.keep,
            "Backup timer starting"
        );

        // No backup at startup; the first one is a full interval away.
        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match backup_and_prune(&self.backups, self.keep).await {
                        Ok(backup) => info!(
                            file = %backup.file_name,
                            size_bytes = backup.size_bytes,
                            "Scheduled backup written"
                        ),
                        Err(e) => error!(error = %e, "Scheduled backup failed"),
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Backup timer shutting down");
                    break;
                }
            }
        }
    }
}

// =============================================================================
// Background Tasks
// =============================================================================

/// Everything [`Terminal::start_background`] spawned.
pub struct BackgroundTasks {
    auto_saver: AutoSaverHandle,
    sync: Option<(SyncWorkerHandle, JoinHandle<()>)>,
    backup: Option<(BackupTimerHandle, JoinHandle<()>)>,
}

impl BackgroundTasks {
    pub(crate) fn start(terminal: &Terminal) -> TerminalResult<Self> {
        let config = terminal.config();

        let sync = if config.sync_config().is_sync_enabled() {
            let backend = Arc::new(RestBackend::new(&config.backend)?);
            let (worker, handle) = SyncWorker::new(terminal.sync_queue().clone(), backend);
            Some((handle, tokio::spawn(worker.run())))
        } else {
            info!("Sync disabled, mutations stay queued locally");
            None
        };

        let backup = if config.backup.interval_mins > 0 {
            let (timer, handle) = BackupTimer::new(
                terminal.backups().clone(),
                config.backup.keep,
                Duration::from_secs(config.backup.interval_mins * 60),
            );
            Some((handle, tokio::spawn(timer.run())))
        } else {
            None
        };

        let auto_saver = AutoSaver::new(terminal.persister().clone()).start();

        Ok(BackgroundTasks {
            auto_saver,
            sync,
            backup,
        })
    }

    /// Handle of the running sync worker, if sync is enabled.
    pub fn sync_worker(&self) -> Option<&SyncWorkerHandle> {
        self.sync.as_ref().map(|(handle, _)| handle)
    }

    /// Stops every task. The auto-saver goes last so it saves what the
    /// others wrote.
    pub async fn shutdown(self) {
        if let Some((handle, join)) = self.sync {
            if let Err(e) = handle.shutdown().await {
                error!(error = %e, "Sync worker already stopped");
            }
            if let Err(e) = join.await {
                error!(error = %e, "Sync worker task failed");
            }
        }

        if let Some((handle, join)) = self.backup {
            handle.shutdown().await;
            if let Err(e) = join.await {
                error!(error = %e, "Backup timer task failed");
            }
        }

        self.auto_saver.shutdown().await;
        info!("Background tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tillbox_db::{Database, DbConfig, LocalStore, RecoveryQueue};

    #[tokio::test]
    async fn test_backup_timer_waits_a_full_interval() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = LocalStore::new();
        let backups = BackupService::new(
            store.clone(),
            RecoveryQueue::new(db.kv()),
            db.persister(store),
            dir.path().join("backups"),
        );

        let (timer, handle) = BackupTimer::new(backups.clone(), 5, Duration::from_millis(300));
        let task = tokio::spawn(timer.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(backups.list_backups().await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!backups.list_backups().await.unwrap().is_empty());

        handle.shutdown().await;
        task.await.unwrap();
    }
}
