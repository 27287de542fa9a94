//! # Store Persistence
//!
//! Saves the local store into the device database and loads it back.
//!
//! ## Save Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  LocalStore ──write──► StoreEvent ──► AutoSaver                        │
//! │                                          │                              │
//! │                                          │ wait for quiet window        │
//! │                                          │ (250 ms, coalesces bursts)   │
//! │                                          ▼                              │
//! │                                   StorePersister::save()                │
//! │                                          │                              │
//! │                 ┌──────── one SQLite transaction ────────┐              │
//! │                 │  DELETE FROM store_rows                │              │
//! │                 │  INSERT (table, row_id, row_json) × n  │              │
//! │                 └────────────────────────────────────────┘              │
//! │                                                                         │
//! │  A crash mid-save rolls back to the previous complete save.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use sqlx::{Row as _, SqlitePool};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{DbError, DbResult};
use crate::store::{LocalStore, Row, StoreEvent, Tables};

/// Default quiet period before an automatic save.
pub const DEFAULT_SAVE_WINDOW_MS: u64 = 250;

// =============================================================================
// Store Persister
// =============================================================================

/// Moves the whole local store to and from the `store_rows` table.
#[derive(Debug, Clone)]
pub struct StorePersister {
    pool: SqlitePool,
    store: LocalStore,
}

impl StorePersister {
    pub fn new(pool: SqlitePool, store: LocalStore) -> Self {
        StorePersister { pool, store }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Writes every table in one transaction. Returns the number of rows.
    pub async fn save(&self) -> DbResult<usize> {
        let snapshot = self.store.snapshot();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM store_rows")
            .execute(&mut *tx)
            .await?;

        let mut rows = 0usize;
        for (table, table_rows) in &snapshot {
            for (row_id, row) in table_rows {
                let json = serde_json::to_string(row)?;
                sqlx::query(
                    "INSERT INTO store_rows (table_name, row_id, row_json) VALUES (?1, ?2, ?3)",
                )
                .bind(table)
                .bind(row_id)
                .bind(json)
                .execute(&mut *tx)
                .await?;
                rows += 1;
            }
        }
        tx.commit().await?;

        debug!(tables = snapshot.len(), rows, "Store saved");
        Ok(rows)
    }

    /// Replaces the local store with the last save. Returns the number of rows.
    pub async fn load(&self) -> DbResult<usize> {
        let records = sqlx::query("SELECT table_name, row_id, row_json FROM store_rows")
            .fetch_all(&self.pool)
            .await?;

        let mut tables = Tables::new();
        for record in &records {
            let table: String = record.try_get("table_name")?;
            let row_id: String = record.try_get("row_id")?;
            let json: String = record.try_get("row_json")?;
            let row: Row = serde_json::from_str(&json)
                .map_err(|e| DbError::corrupt_row(&table, &row_id, e))?;
            tables.entry(table).or_default().insert(row_id, row);
        }

        let count = records.len();
        self.store.load_tables(tables);
        info!(rows = count, "Store loaded from device storage");
        Ok(count)
    }
}

// =============================================================================
// Auto Saver
// =============================================================================

/// Handle for a running [`AutoSaver`].
#[derive(Debug)]
pub struct AutoSaverHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl AutoSaverHandle {
    /// Stops the saver after a final save of any pending changes.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            error!(error = %e, "Auto-saver task failed");
        }
    }
}

/// Saves the store shortly after it changes.
pub struct AutoSaver {
    persister: StorePersister,
    window: Duration,
}

impl AutoSaver {
    pub fn new(persister: StorePersister) -> Self {
        AutoSaver {
            persister,
            window: Duration::from_millis(DEFAULT_SAVE_WINDOW_MS),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Subscribes to store events and starts the save loop.
    pub fn start(self) -> AutoSaverHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let events = self.persister.store().subscribe();

        let join = tokio::spawn(async move {
            self.run(events, shutdown_rx).await;
        });

        AutoSaverHandle { shutdown_tx, join }
    }

    async fn run(
        self,
        mut events: broadcast::Receiver<StoreEvent>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!(window_ms = self.window.as_millis() as u64, "Auto-saver started");

        // Set while changes are waiting to be saved.
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    if deadline.is_some() {
                        self.save().await;
                    }
                    info!("Auto-saver shutting down");
                    break;
                }
                event = events.recv() => {
                    match event {
                        Ok(_) => {
                            // First change opens the window; later ones ride along.
                            deadline.get_or_insert_with(|| Instant::now() + self.window);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Auto-saver lagged behind store events");
                            deadline.get_or_insert_with(|| Instant::now() + self.window);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            if deadline.is_some() {
                                self.save().await;
                            }
                            break;
                        }
                    }
                }
                _ = wait_until(deadline) => {
                    deadline = None;
                    self.save().await;
                }
            }
        }
    }

    async fn save(&self) {
        if let Err(e) = self.persister.save().await {
            error!(error = %e, "Automatic store save failed");
        }
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
