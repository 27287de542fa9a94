//! # Local Store
//!
//! In-memory, table-structured row store. The single source of truth for
//! every read the terminal makes.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          LocalStore                                     │
//! │                                                                         │
//! │   table ──► row_id ──► row { column: JSON value, ... }                 │
//! │                                                                         │
//! │   "inventory"                                                          │
//! │     ├── "p1" ──► { id, product_id: "p1", stock: 6, sell_price: 300 }  │
//! │     └── "p2" ──► { id, product_id: "p2", stock: 0, sell_price: 500 }  │
//! │   "sales"                                                              │
//! │     └── "5f0c…" ──► { id, total_amount: 1100, ... }                    │
//! │                                                                         │
//! │   Writes ──► RwLock<Tables> ──► StoreEvent ──► broadcast subscribers   │
//! │                                                  (AutoSaver, UI)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Reads return owned copies, never references into the store
//! - A write is visible to the very next read
//! - The lock is a `std::sync::RwLock` and is never held across `.await`
//! - [`LocalStore::batch`] applies a group of writes under one lock, or none

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{DbError, DbResult};

/// A row: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// A table: row id to row.
pub type Table = BTreeMap<String, Row>;

/// Every table in the store, by name.
pub type Tables = BTreeMap<String, Table>;

const EVENT_CAPACITY: usize = 1024;

// =============================================================================
// Table Names
// =============================================================================

/// Names of the tables the terminal writes.
pub mod tables {
    pub const CATEGORIES: &str = "categories";
    pub const PRODUCTS: &str = "products";
    pub const INVENTORY: &str = "inventory";
    pub const SALES: &str = "sales";
    pub const SALE_ITEMS: &str = "sale_items";
    pub const STOCK_UPDATES: &str = "stock_updates";
    pub const SYNC_QUEUE: &str = "syncQueue";
    pub const SYNC_DEAD_LETTERS: &str = "syncDeadLetters";
    pub const DAILY_METRICS: &str = "dailyMetrics";

    pub const ALL: [&str; 9] = [
        CATEGORIES,
        PRODUCTS,
        INVENTORY,
        SALES,
        SALE_ITEMS,
        STOCK_UPDATES,
        SYNC_QUEUE,
        SYNC_DEAD_LETTERS,
        DAILY_METRICS,
    ];
}

// =============================================================================
// Events
// =============================================================================

/// What happened to a row or table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StoreChange {
    RowSet,
    CellSet { column: String },
    RowDeleted,
    TableDeleted,
}

/// Emitted after every applied write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub table: String,
    /// `None` for table-level changes.
    pub row_id: Option<String>,
    pub change: StoreChange,
}

impl StoreEvent {
    fn row(table: &str, row_id: &str, change: StoreChange) -> Self {
        StoreEvent {
            table: table.to_string(),
            row_id: Some(row_id.to_string()),
            change,
        }
    }
}

// =============================================================================
// Row Codec
// =============================================================================

/// Encodes a record as a row. The record must serialize to a JSON object.
pub fn encode_row<T: Serialize>(table: &str, row_id: &str, record: &T) -> DbResult<Row> {
    match serde_json::to_value(record) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(DbError::corrupt_row(
            table,
            row_id,
            format!("expected an object, got {}", other),
        )),
        Err(e) => Err(DbError::corrupt_row(table, row_id, e)),
    }
}

/// Decodes a row into a record.
pub fn decode_row<T: DeserializeOwned>(table: &str, row_id: &str, row: Row) -> DbResult<T> {
    serde_json::from_value(Value::Object(row)).map_err(|e| DbError::corrupt_row(table, row_id, e))
}

// =============================================================================
// Local Store
// =============================================================================

/// Shared handle to the in-memory store.
///
/// Clones share the same tables and event channel. Pass the handle to every
/// component that needs it; there is no global instance.
#[derive(Debug, Clone)]
pub struct LocalStore {
    tables: Arc<RwLock<Tables>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        LocalStore {
            tables: Arc::new(RwLock::new(Tables::new())),
            events,
        }
    }

    /// Subscribes to write events. Only writes after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StoreEvent) {
        trace!(table = %event.table, row_id = ?event.row_id, change = ?event.change, "Store event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Returns a copy of a table. Missing tables read as empty.
    pub fn get_table(&self, table: &str) -> Table {
        self.read().get(table).cloned().unwrap_or_default()
    }

    pub fn get_row(&self, table: &str, row_id: &str) -> Option<Row> {
        self.read().get(table).and_then(|t| t.get(row_id)).cloned()
    }

    pub fn get_cell(&self, table: &str, row_id: &str, column: &str) -> Option<Value> {
        self.read()
            .get(table)
            .and_then(|t| t.get(row_id))
            .and_then(|r| r.get(column))
            .cloned()
    }

    pub fn has_row(&self, table: &str, row_id: &str) -> bool {
        self.read()
            .get(table)
            .map(|t| t.contains_key(row_id))
            .unwrap_or(false)
    }

    /// Names of tables that currently hold at least one row.
    pub fn table_names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.read().get(table).map(|t| t.len()).unwrap_or(0)
    }

    /// Returns a copy of every table.
    pub fn snapshot(&self) -> Tables {
        self.read().clone()
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Inserts or replaces a row.
    pub fn set_row(&self, table: &str, row_id: &str, row: Row) {
        self.write()
            .entry(table.to_string())
            .or_default()
            .insert(row_id.to_string(), row);
        self.emit(StoreEvent::row(table, row_id, StoreChange::RowSet));
    }

    /// Sets one column, creating the row if it doesn't exist.
    pub fn set_cell(&self, table: &str, row_id: &str, column: &str, value: Value) {
        self.write()
            .entry(table.to_string())
            .or_default()
            .entry(row_id.to_string())
            .or_default()
            .insert(column.to_string(), value);
        self.emit(StoreEvent::row(
            table,
            row_id,
            StoreChange::CellSet {
                column: column.to_string(),
            },
        ));
    }

    /// Removes a row. Returns whether it existed.
    pub fn del_row(&self, table: &str, row_id: &str) -> bool {
        let removed = {
            let mut tables = self.write();
            remove_row(&mut tables, table, row_id)
        };
        if removed {
            self.emit(StoreEvent::row(table, row_id, StoreChange::RowDeleted));
        }
        removed
    }

    /// Removes a whole table. Returns whether it existed.
    pub fn del_table(&self, table: &str) -> bool {
        let removed = self.write().remove(table).is_some();
        if removed {
            self.emit(StoreEvent {
                table: table.to_string(),
                row_id: None,
                change: StoreChange::TableDeleted,
            });
        }
        removed
    }

    /// Replaces every table without emitting events.
    ///
    /// Used when loading persisted state at startup, before anyone subscribes.
    pub fn load_tables(&self, tables: Tables) {
        let mut guard = self.write();
        *guard = tables
            .into_iter()
            .filter(|(_, rows)| !rows.is_empty())
            .collect();
    }

    // -------------------------------------------------------------------------
    // Typed access
    // -------------------------------------------------------------------------

    pub fn get_record<T: DeserializeOwned>(&self, table: &str, row_id: &str) -> DbResult<Option<T>> {
        self.get_row(table, row_id)
            .map(|row| decode_row(table, row_id, row))
            .transpose()
    }

    /// Decodes every row of a table, in row id order.
    pub fn records<T: DeserializeOwned>(&self, table: &str) -> DbResult<Vec<T>> {
        self.get_table(table)
            .into_iter()
            .map(|(row_id, row)| decode_row(table, &row_id, row))
            .collect()
    }

    pub fn put_record<T: Serialize>(&self, table: &str, row_id: &str, record: &T) -> DbResult<()> {
        let row = encode_row(table, row_id, record)?;
        self.set_row(table, row_id, row);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Batches
    // -------------------------------------------------------------------------

    /// Runs `f` against a staging view and applies its writes atomically.
    ///
    /// The write lock is held for the whole closure, so reads inside the batch
    /// see a state no other writer can change. Writes are applied only when
    /// `f` returns `Ok`; events are emitted after the lock is released.
    ///
    /// ## Example
    /// ```rust
    /// use tillbox_db::store::{LocalStore, Row};
    ///
    /// let store = LocalStore::new();
    /// let result: Result<(), &str> = store.batch(|b| {
    ///     b.set_row("t", "a", Row::new());
    ///     Err("changed my mind")
    /// });
    /// assert!(result.is_err());
    /// assert_eq!(store.row_count("t"), 0);
    /// ```
    pub fn batch<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut StoreBatch<'_>) -> Result<T, E>,
    {
        let (value, events) = {
            let mut tables = self.write();
            let mut batch = StoreBatch {
                base: &*tables,
                overlay: HashMap::new(),
                ops: Vec::new(),
            };
            let value = f(&mut batch)?;
            let ops = batch.ops;

            let mut events = Vec::with_capacity(ops.len());
            for op in ops {
                match op {
                    BatchOp::Set { table, row_id, row } => {
                        tables
                            .entry(table.clone())
                            .or_default()
                            .insert(row_id.clone(), row);
                        events.push(StoreEvent::row(&table, &row_id, StoreChange::RowSet));
                    }
                    BatchOp::Delete { table, row_id } => {
                        if remove_row(&mut tables, &table, &row_id) {
                            events.push(StoreEvent::row(&table, &row_id, StoreChange::RowDeleted));
                        }
                    }
                }
            }
            (value, events)
        };

        for event in events {
            self.emit(event);
        }
        Ok(value)
    }
}

fn remove_row(tables: &mut Tables, table: &str, row_id: &str) -> bool {
    let Some(rows) = tables.get_mut(table) else {
        return false;
    };
    let removed = rows.remove(row_id).is_some();
    if rows.is_empty() {
        tables.remove(table);
    }
    removed
}

// =============================================================================
// Store Batch
// =============================================================================

#[derive(Debug)]
enum BatchOp {
    Set { table: String, row_id: String, row: Row },
    Delete { table: String, row_id: String },
}

/// Staging view handed to [`LocalStore::batch`].
///
/// Reads see the committed store plus this batch's own staged writes.
pub struct StoreBatch<'a> {
    base: &'a Tables,
    overlay: HashMap<(String, String), Option<Row>>,
    ops: Vec<BatchOp>,
}

impl StoreBatch<'_> {
    pub fn get_row(&self, table: &str, row_id: &str) -> Option<Row> {
        if let Some(staged) = self.overlay.get(&(table.to_string(), row_id.to_string())) {
            return staged.clone();
        }
        self.base.get(table).and_then(|t| t.get(row_id)).cloned()
    }

    /// Rows of `table` as this batch sees them.
    pub fn get_table(&self, table: &str) -> Table {
        let mut rows = self.base.get(table).cloned().unwrap_or_default();
        for ((staged_table, row_id), staged) in &self.overlay {
            if staged_table != table {
                continue;
            }
            match staged {
                Some(row) => {
                    rows.insert(row_id.clone(), row.clone());
                }
                None => {
                    rows.remove(row_id);
                }
            }
        }
        rows
    }

    pub fn set_row(&mut self, table: &str, row_id: &str, row: Row) {
        self.overlay
            .insert((table.to_string(), row_id.to_string()), Some(row.clone()));
        self.ops.push(BatchOp::Set {
            table: table.to_string(),
            row_id: row_id.to_string(),
            row,
        });
    }

    pub fn del_row(&mut self, table: &str, row_id: &str) {
        self.overlay
            .insert((table.to_string(), row_id.to_string()), None);
        self.ops.push(BatchOp::Delete {
            table: table.to_string(),
            row_id: row_id.to_string(),
        });
    }

    pub fn get_record<T: DeserializeOwned>(&self, table: &str, row_id: &str) -> DbResult<Option<T>> {
        self.get_row(table, row_id)
            .map(|row| decode_row(table, row_id, row))
            .transpose()
    }

    pub fn put_record<T: Serialize>(
        &mut self,
        table: &str,
        row_id: &str,
        record: &T,
    ) -> DbResult<()> {
        let row = encode_row(table, row_id, record)?;
        self.set_row(table, row_id, row);
        Ok(())
    }

    /// Number of writes staged so far.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_write_then_read() {
        let store = LocalStore::new();
        store.set_row("inventory", "p1", row(json!({"stock": 10})));

        assert_eq!(store.get_cell("inventory", "p1", "stock"), Some(json!(10)));
        assert_eq!(store.row_count("inventory"), 1);
        assert_eq!(store.table_names(), vec!["inventory".to_string()]);
    }

    #[test]
    fn test_reads_are_copies() {
        let store = LocalStore::new();
        store.set_row("inventory", "p1", row(json!({"stock": 10})));

        let mut copy = store.get_row("inventory", "p1").unwrap();
        copy.insert("stock".into(), json!(0));

        assert_eq!(store.get_cell("inventory", "p1", "stock"), Some(json!(10)));
    }

    #[test]
    fn test_set_cell_creates_row() {
        let store = LocalStore::new();
        store.set_cell("products", "p1", "name", json!("Beans"));
        store.set_cell("products", "p1", "barcode", json!("96385074"));

        let r = store.get_row("products", "p1").unwrap();
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_deletes() {
        let store = LocalStore::new();
        store.set_row("a", "1", Row::new());
        store.set_row("a", "2", Row::new());
        store.set_row("b", "1", Row::new());

        assert!(store.del_row("a", "1"));
        assert!(!store.del_row("a", "1"));
        assert_eq!(store.row_count("a"), 1);

        assert!(store.del_table("a"));
        assert!(!store.del_table("a"));
        assert_eq!(store.table_names(), vec!["b".to_string()]);

        assert!(store.del_row("b", "1"));
        assert!(store.table_names().is_empty());
    }

    #[test]
    fn test_missing_reads() {
        let store = LocalStore::new();
        assert!(store.get_table("nope").is_empty());
        assert!(store.get_row("nope", "x").is_none());
        assert!(store.get_cell("nope", "x", "y").is_none());
        assert_eq!(store.row_count("nope"), 0);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let store = LocalStore::new();
        let mut rx = store.subscribe();

        store.set_row("sales", "s1", Row::new());
        store.set_cell("sales", "s1", "status", json!("completed"));
        store.del_row("sales", "s1");

        assert_eq!(rx.recv().await.unwrap().change, StoreChange::RowSet);
        assert_eq!(
            rx.recv().await.unwrap().change,
            StoreChange::CellSet {
                column: "status".into()
            }
        );
        let deleted = rx.recv().await.unwrap();
        assert_eq!(deleted.change, StoreChange::RowDeleted);
        assert_eq!(deleted.row_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_batch_commits_all() {
        let store = LocalStore::new();
        let mut rx = store.subscribe();
        store.set_row("inventory", "p1", row(json!({"stock": 10})));
        rx.recv().await.unwrap();

        let seen: Result<Option<Row>, DbError> = store.batch(|b| {
            b.set_row("inventory", "p1", row(json!({"stock": 6})));
            b.set_row("stock_updates", "a1", row(json!({"old_stock": 10})));
            // Staged writes are visible inside the batch.
            Ok(b.get_row("inventory", "p1"))
        });

        assert_eq!(seen.unwrap().unwrap()["stock"], json!(6));
        assert_eq!(store.get_cell("inventory", "p1", "stock"), Some(json!(6)));
        assert_eq!(store.row_count("stock_updates"), 1);
        assert_eq!(rx.recv().await.unwrap().table, "inventory");
        assert_eq!(rx.recv().await.unwrap().table, "stock_updates");
    }

    #[test]
    fn test_batch_error_writes_nothing() {
        let store = LocalStore::new();
        store.set_row("inventory", "p1", row(json!({"stock": 10})));
        let mut rx = store.subscribe();

        let result: Result<(), &str> = store.batch(|b| {
            b.set_row("inventory", "p1", row(json!({"stock": 0})));
            b.del_row("inventory", "p1");
            Err("abort")
        });

        assert!(result.is_err());
        assert_eq!(store.get_cell("inventory", "p1", "stock"), Some(json!(10)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_batch_table_view_includes_staged_writes() {
        let store = LocalStore::new();
        store.set_row("q", "a", Row::new());
        store.set_row("q", "b", Row::new());

        let ids: Vec<String> = store
            .batch(|b| {
                b.del_row("q", "a");
                b.set_row("q", "c", Row::new());
                Ok::<_, DbError>(b.get_table("q").into_keys().collect())
            })
            .unwrap();

        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_typed_records() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Thing {
            id: String,
            n: i64,
        }

        let store = LocalStore::new();
        let thing = Thing {
            id: "t1".into(),
            n: 3,
        };
        store.put_record("things", "t1", &thing).unwrap();

        assert_eq!(store.get_record::<Thing>("things", "t1").unwrap(), Some(thing));
        assert_eq!(store.records::<Thing>("things").unwrap().len(), 1);

        store.set_cell("things", "t1", "n", json!("not a number"));
        assert!(matches!(
            store.get_record::<Thing>("things", "t1"),
            Err(DbError::CorruptRow { .. })
        ));
    }

    #[test]
    fn test_snapshot_and_load() {
        let store = LocalStore::new();
        store.set_row("a", "1", row(json!({"x": 1})));
        let snap = store.snapshot();

        let other = LocalStore::new();
        other.load_tables(snap);
        assert_eq!(other.get_cell("a", "1", "x"), Some(json!(1)));
    }
}
