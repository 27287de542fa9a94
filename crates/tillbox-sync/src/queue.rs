//! # Sync Queue
//!
//! Durable, ordered queue of outbound mutations, kept in the local store.
//!
//! ## Item Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   add() ──► syncQueue (ordered by position) ──► process_queue()        │
//! │                                                    │                    │
//! │                 ┌──────────────────────────────────┼─────────────┐      │
//! │                 ▼                                  ▼             ▼      │
//! │        depends_on still queued              backend Ok     backend Err  │
//! │        move to tail, no retry used          remove row     retry_count+1│
//! │                                                                  │      │
//! │                                   ┌──────────────────────────────┤      │
//! │                                   ▼                              ▼      │
//! │                        retry_count < max_retries    retry_count ≥ max   │
//! │                        move to tail, wait backoff   syncDeadLetters     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Queue rows live in the `syncQueue` table, so they are saved, backed up
//! and restored with the rest of the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use tillbox_core::{new_id, InventoryRecord, SaleWithItems};
use tillbox_db::{tables, LocalStore, StoreBatch};

use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::mutation::{InventoryMutation, Mutation, MutationKind, SaleItemMutation, SaleMutation};
use crate::remote::RemoteBackend;

// =============================================================================
// Records
// =============================================================================

/// One queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: String,
    pub kind: MutationKind,
    /// Wire payload, see [`Mutation::to_payload`].
    pub payload: Value,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Queue order. Larger is later.
    pub position: i64,
    /// Queue item that must be sent first.
    #[serde(default)]
    pub depends_on: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An item that ran out of retries, kept for an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub item: SyncQueueItem,
    pub dropped_at: DateTime<Utc>,
    pub last_error: String,
}

/// What one [`SyncQueue::process_queue`] run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub succeeded: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub deferred: usize,
    /// Another run was already in progress; nothing was attempted.
    pub skipped: bool,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.retried + self.dead_lettered
    }
}

/// Clears the processing flag however the run ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Position after every row currently in the queue.
fn tail_position(b: &StoreBatch<'_>) -> i64 {
    b.get_table(tables::SYNC_QUEUE)
        .values()
        .filter_map(|row| row.get("position").and_then(Value::as_i64))
        .max()
        .map_or(0, |p| p + 1)
}

// =============================================================================
// Sync Queue
// =============================================================================

/// Handle to the outbound queue. Clones share state.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    store: LocalStore,
    settings: Arc<SyncSettings>,
    wake: Arc<Notify>,
    processing: Arc<AtomicBool>,
}

impl SyncQueue {
    pub fn new(store: LocalStore, settings: SyncSettings) -> Self {
        SyncQueue {
            store,
            settings: Arc::new(settings),
            wake: Arc::new(Notify::new()),
            processing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    // -------------------------------------------------------------------------
    // Enqueue
    // -------------------------------------------------------------------------

    /// Appends a mutation to the tail and wakes the drain worker.
    pub fn add(&self, mutation: &Mutation, depends_on: Option<&str>) -> SyncResult<SyncQueueItem> {
        let kind = mutation.kind();
        let payload = mutation.to_payload()?;
        let depends_on = depends_on.map(str::to_string);

        let item = self
            .store
            .batch(|b| self.stage(b, kind, payload, depends_on))?;

        debug!(id = %item.id, kind = %kind, position = item.position, "Mutation queued");
        self.wake.notify_one();
        Ok(item)
    }

    /// Queues a sale insert followed by one insert per line item.
    ///
    /// Line items depend on the sale, so they are never sent before it.
    pub fn enqueue_sale(&self, sale: &SaleWithItems) -> SyncResult<Vec<SyncQueueItem>> {
        let sale_payload = Mutation::Sale(SaleMutation::from(&sale.sale)).to_payload()?;
        let item_payloads = sale
            .items
            .iter()
            .map(|item| Mutation::SaleItem(SaleItemMutation::from(item)).to_payload())
            .collect::<SyncResult<Vec<_>>>()?;

        let queued = self.store.batch(|b| {
            let head = self.stage(b, MutationKind::Sale, sale_payload, None)?;
            let mut queued = Vec::with_capacity(item_payloads.len() + 1);
            for payload in item_payloads {
                queued.push(self.stage(
                    b,
                    MutationKind::SaleItems,
                    payload,
                    Some(head.id.clone()),
                )?);
            }
            queued.insert(0, head);
            Ok::<_, SyncError>(queued)
        })?;

        debug!(sale_id = %sale.sale.id, items = queued.len(), "Sale queued for sync");
        self.wake.notify_one();
        Ok(queued)
    }

    /// Queues an upsert of the record's current state.
    pub fn enqueue_inventory(&self, record: &InventoryRecord) -> SyncResult<SyncQueueItem> {
        self.add(&Mutation::Inventory(InventoryMutation::from(record)), None)
    }

    fn stage(
        &self,
        b: &mut StoreBatch<'_>,
        kind: MutationKind,
        payload: Value,
        depends_on: Option<String>,
    ) -> SyncResult<SyncQueueItem> {
        let item = SyncQueueItem {
            id: new_id(),
            kind,
            payload,
            retry_count: 0,
            max_retries: self.settings.max_retries(kind),
            position: tail_position(b),
            depends_on,
            last_error: None,
            created_at: Utc::now(),
        };
        b.put_record(tables::SYNC_QUEUE, &item.id, &item)?;
        Ok(item)
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Queued items, head first.
    pub fn items(&self) -> SyncResult<Vec<SyncQueueItem>> {
        let mut items: Vec<SyncQueueItem> = self.store.records(tables::SYNC_QUEUE)?;
        items.sort_by_key(|item| item.position);
        Ok(items)
    }

    pub fn len(&self) -> usize {
        self.store.row_count(tables::SYNC_QUEUE)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.store.has_row(tables::SYNC_QUEUE, id)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Resolves after the next `add`, or at once if one happened since the
    /// last call.
    pub async fn wait_for_work(&self) {
        self.wake.notified().await;
    }

    /// Wakes the drain worker without adding anything.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    // -------------------------------------------------------------------------
    // Draining
    // -------------------------------------------------------------------------

    /// Sends queued mutations until the queue is empty.
    ///
    /// Only one run is active at a time; a call made during a run returns at
    /// once with `skipped` set.
    ///
    /// ## Per Item
    /// 1. Prerequisite still queued: move to tail, no retry consumed
    /// 2. Backend accepts: remove
    /// 3. Backend fails: `retry_count += 1`, then either move to tail and
    ///    wait `retry_delay`, or move to dead letters at `max_retries`
    pub async fn process_queue(&self, backend: &dyn RemoteBackend) -> SyncResult<DrainReport> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync queue already being processed");
            return Ok(DrainReport {
                skipped: true,
                ..Default::default()
            });
        }
        let _guard = ProcessingGuard(&self.processing);

        let mut report = DrainReport::default();
        let mut deferred_in_a_row = 0usize;

        loop {
            let queue = self.items()?;
            let Some(head) = queue.first().cloned() else {
                break;
            };

            if let Some(prerequisite) = head.depends_on.as_deref() {
                if self.contains(prerequisite) {
                    deferred_in_a_row += 1;
                    if deferred_in_a_row >= queue.len() {
                        warn!(remaining = queue.len(), "Every queued item is waiting on another");
                        break;
                    }
                    self.move_to_tail(&head.id, head.retry_count, head.last_error.clone())?;
                    report.deferred += 1;
                    continue;
                }
            }
            deferred_in_a_row = 0;

            let result = match Mutation::from_payload(head.kind, head.payload.clone()) {
                Ok(mutation) => backend.apply(&mutation).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    self.store.del_row(tables::SYNC_QUEUE, &head.id);
                    report.succeeded += 1;
                    debug!(id = %head.id, kind = %head.kind, "Mutation synced");
                }
                Err(e) => {
                    let retry_count = head.retry_count + 1;
                    if retry_count >= head.max_retries {
                        self.dead_letter(head, retry_count, &e)?;
                        report.dead_lettered += 1;
                        continue;
                    }

                    if e.is_retryable() {
                        info!(
                            id = %head.id,
                            kind = %head.kind,
                            attempt = retry_count,
                            max = head.max_retries,
                            error = %e,
                            "Sync attempt failed, will retry"
                        );
                    } else {
                        warn!(
                            id = %head.id,
                            kind = %head.kind,
                            attempt = retry_count,
                            max = head.max_retries,
                            error = %e,
                            "Backend rejected mutation, will retry"
                        );
                    }

                    self.move_to_tail(&head.id, retry_count, Some(e.to_string()))?;
                    report.retried += 1;
                    tokio::time::sleep(self.settings.retry_delay()).await;
                }
            }
        }

        if report.attempted() > 0 {
            info!(
                succeeded = report.succeeded,
                retried = report.retried,
                dead_lettered = report.dead_lettered,
                "Sync queue drained"
            );
        }
        Ok(report)
    }

    fn move_to_tail(
        &self,
        id: &str,
        retry_count: u32,
        last_error: Option<String>,
    ) -> SyncResult<()> {
        self.store.batch(|b| {
            // Gone already (restore, operator action): nothing to move.
            let Some(mut item) = b.get_record::<SyncQueueItem>(tables::SYNC_QUEUE, id)? else {
                return Ok(());
            };
            item.retry_count = retry_count;
            item.last_error = last_error;
            item.position = tail_position(b);
            b.put_record(tables::SYNC_QUEUE, id, &item)?;
            Ok::<_, SyncError>(())
        })
    }

    fn dead_letter(
        &self,
        mut item: SyncQueueItem,
        retry_count: u32,
        error: &SyncError,
    ) -> SyncResult<()> {
        warn!(
            id = %item.id,
            kind = %item.kind,
            retries = retry_count,
            error = %error,
            "Sync item exhausted its retries, moved to dead letters"
        );

        item.retry_count = retry_count;
        item.last_error = Some(error.to_string());
        let letter = DeadLetter {
            last_error: error.to_string(),
            dropped_at: Utc::now(),
            item,
        };

        self.store.batch(|b| {
            b.del_row(tables::SYNC_QUEUE, &letter.item.id);
            b.put_record(tables::SYNC_DEAD_LETTERS, &letter.item.id, &letter)?;
            Ok::<_, SyncError>(())
        })
    }

    // -------------------------------------------------------------------------
    // Dead Letters
    // -------------------------------------------------------------------------

    /// Dead letters, oldest drop first.
    pub fn dead_letters(&self) -> SyncResult<Vec<DeadLetter>> {
        let mut letters: Vec<DeadLetter> = self.store.records(tables::SYNC_DEAD_LETTERS)?;
        letters.sort_by(|a, b| {
            a.dropped_at
                .cmp(&b.dropped_at)
                .then_with(|| a.item.position.cmp(&b.item.position))
        });
        Ok(letters)
    }

    /// Puts a dead letter back at the tail with a fresh retry budget.
    pub fn requeue_dead_letter(&self, id: &str) -> SyncResult<SyncQueueItem> {
        let item = self.store.batch(|b| {
            let letter = b
                .get_record::<DeadLetter>(tables::SYNC_DEAD_LETTERS, id)?
                .ok_or_else(|| SyncError::ItemNotFound(id.to_string()))?;

            let mut item = letter.item;
            item.retry_count = 0;
            item.last_error = None;
            item.position = tail_position(b);

            b.del_row(tables::SYNC_DEAD_LETTERS, id);
            b.put_record(tables::SYNC_QUEUE, id, &item)?;
            Ok::<_, SyncError>(item)
        })?;

        info!(id = %id, kind = %item.kind, "Dead letter requeued");
        self.wake.notify_one();
        Ok(item)
    }

    /// Drops a dead letter for good.
    pub fn discard_dead_letter(&self, id: &str) -> SyncResult<()> {
        if !self.store.del_row(tables::SYNC_DEAD_LETTERS, id) {
            return Err(SyncError::ItemNotFound(id.to_string()));
        }
        warn!(id = %id, "Dead letter discarded");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
