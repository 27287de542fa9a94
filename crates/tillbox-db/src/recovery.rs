//! # Recovery Queue
//!
//! Crash-safe log of committed sales that no backup has captured yet.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  commit sale ──► add(sale) ──► memory + kv_store["recovery_queue"]     │
//! │                                   (write-through, whole queue)         │
//! │                                                                         │
//! │  terminal start ──► load_queue() ──► memory ◄── kv_store               │
//! │                                                                         │
//! │  backup written ──► clear_captured(ids) ──► drop what the file holds   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The persisted form is a JSON array of sale records, each with its line
//! items embedded under `items`.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tillbox_core::SaleWithItems;

use crate::error::{DbError, DbResult};
use crate::repository::kv::KvRepository;

/// Key of the persisted queue in `kv_store`.
pub const RECOVERY_QUEUE_KEY: &str = "recovery_queue";

/// Append-only log of sales not yet in a backup.
///
/// Clones share the same queue.
#[derive(Debug, Clone)]
pub struct RecoveryQueue {
    kv: KvRepository,
    items: Arc<Mutex<Vec<SaleWithItems>>>,
}

impl RecoveryQueue {
    /// Creates an empty queue. Call [`load_queue`](Self::load_queue) at start.
    pub fn new(kv: KvRepository) -> Self {
        RecoveryQueue {
            kv,
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replaces the in-memory queue with the persisted one.
    ///
    /// Returns the number of entries restored.
    pub async fn load_queue(&self) -> DbResult<usize> {
        let loaded: Vec<SaleWithItems> = match self.kv.get(RECOVERY_QUEUE_KEY).await? {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                DbError::corrupt_row("kv_store", RECOVERY_QUEUE_KEY, e)
            })?,
            None => Vec::new(),
        };

        let count = loaded.len();
        *self.items.lock().await = loaded;

        if count > 0 {
            info!(entries = count, "Recovery queue loaded");
        }
        Ok(count)
    }

    /// Appends a committed sale and persists the whole queue.
    ///
    /// The entry stays in memory even if persisting fails, so a later
    /// successful write or backup still captures it.
    pub async fn add(&self, sale: SaleWithItems) -> DbResult<()> {
        let mut items = self.items.lock().await;
        let sale_id = sale.sale.id.clone();
        items.push(sale);

        let json = serde_json::to_string(&*items)?;
        if let Err(e) = self.kv.set(RECOVERY_QUEUE_KEY, &json).await {
            warn!(sale_id = %sale_id, error = %e, "Recovery queue not persisted");
            return Err(e);
        }

        debug!(sale_id = %sale_id, entries = items.len(), "Sale added to recovery queue");
        Ok(())
    }

    /// Empties the queue in memory and in storage.
    pub async fn clear(&self) -> DbResult<()> {
        let mut items = self.items.lock().await;
        self.kv.delete(RECOVERY_QUEUE_KEY).await?;
        let cleared = items.len();
        items.clear();

        info!(entries = cleared, "Recovery queue cleared");
        Ok(())
    }

    /// Sale ids currently queued, oldest first.
    pub async fn sale_ids(&self) -> Vec<String> {
        self.items
            .lock()
            .await
            .iter()
            .map(|entry| entry.sale.id.clone())
            .collect()
    }

    /// Removes the entries whose sale id is in `captured` and persists the
    /// rest. Entries added after the ids were read stay queued.
    ///
    /// Returns the number of entries removed.
    pub async fn clear_captured(&self, captured: &[String]) -> DbResult<usize> {
        let mut items = self.items.lock().await;
        let remaining: Vec<SaleWithItems> = items
            .iter()
            .filter(|entry| !captured.contains(&entry.sale.id))
            .cloned()
            .collect();
        let removed = items.len() - remaining.len();

        if remaining.is_empty() {
            self.kv.delete(RECOVERY_QUEUE_KEY).await?;
        } else {
            let json = serde_json::to_string(&remaining)?;
            self.kv.set(RECOVERY_QUEUE_KEY, &json).await?;
        }
        *items = remaining;

        info!(entries = removed, left = items.len(), "Captured recovery entries cleared");
        Ok(removed)
    }

    /// Copy of every entry, oldest first.
    pub async fn items(&self) -> Vec<SaleWithItems> {
        self.items.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use tillbox_core::{Money, PaymentMethod, SaleItem, SaleRecord, SaleStatus};

    fn sale(id: &str) -> SaleWithItems {
        SaleWithItems {
            sale: SaleRecord {
                id: id.into(),
                user_id: "u1".into(),
                total_amount: Money::from_cents(600),
                total_profit: Money::from_cents(400),
                payment_method: PaymentMethod::Cash,
                status: SaleStatus::Completed,
                created_at: Utc::now(),
            },
            items: vec![SaleItem {
                id: format!("{}-i1", id),
                sale_id: id.into(),
                inventory_id: "inv1".into(),
                product_id: "p1".into(),
                quantity: 2,
                unit_price: Money::from_cents(300),
                total_price: Money::from_cents(600),
            }],
        }
    }

    #[tokio::test]
    async fn test_add_survives_restart() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let queue = RecoveryQueue::new(db.kv());
        queue.add(sale("s1")).await.unwrap();
        queue.add(sale("s2")).await.unwrap();

        let reopened = RecoveryQueue::new(db.kv());
        assert_eq!(reopened.load_queue().await.unwrap(), 2);

        let items = reopened.items().await;
        assert_eq!(items[0].sale.id, "s1");
        assert_eq!(items[1].items.len(), 1);
    }

    #[tokio::test]
    async fn test_persisted_form_is_sale_array() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = RecoveryQueue::new(db.kv());
        queue.add(sale("s1")).await.unwrap();

        let raw = db.kv().get(RECOVERY_QUEUE_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["id"], "s1");
        assert_eq!(value[0]["total_amount"], 600);
        assert_eq!(value[0]["items"][0]["product_id"], "p1");
    }

    #[tokio::test]
    async fn test_clear() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = RecoveryQueue::new(db.kv());
        queue.add(sale("s1")).await.unwrap();

        queue.clear().await.unwrap();
        assert!(queue.is_empty().await);

        let reopened = RecoveryQueue::new(db.kv());
        assert_eq!(reopened.load_queue().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_captured_keeps_later_entries() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = RecoveryQueue::new(db.kv());
        queue.add(sale("s1")).await.unwrap();
        queue.add(sale("s2")).await.unwrap();

        let captured = queue.sale_ids().await;
        queue.add(sale("s3")).await.unwrap();

        assert_eq!(queue.clear_captured(&captured).await.unwrap(), 2);
        assert_eq!(queue.sale_ids().await, vec!["s3".to_string()]);

        let reopened = RecoveryQueue::new(db.kv());
        assert_eq!(reopened.load_queue().await.unwrap(), 1);
        assert_eq!(reopened.items().await[0].sale.id, "s3");

        // Nothing left removes the persisted row.
        queue.clear_captured(&["s3".to_string()]).await.unwrap();
        assert!(db.kv().get(RECOVERY_QUEUE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reported() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.kv().set(RECOVERY_QUEUE_KEY, "{not json").await.unwrap();

        let queue = RecoveryQueue::new(db.kv());
        assert!(matches!(
            queue.load_queue().await,
            Err(DbError::CorruptRow { .. })
        ));
    }
}
