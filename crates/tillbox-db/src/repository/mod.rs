//! # Repository Module
//!
//! Typed access to the local store and device storage.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Typed Over Untyped                                   │
//! │                                                                         │
//! │  Terminal / StockManager                                               │
//! │       │                                                                 │
//! │       │  inventory.get("p1") -> Option<InventoryRecord>                │
//! │       ▼                                                                 │
//! │  InventoryRepository                                                   │
//! │       │                                                                 │
//! │       │  store.get_row("inventory", "p1") -> Option<Row>               │
//! │       ▼                                                                 │
//! │  LocalStore (JSON rows)                                                │
//! │                                                                         │
//! │  A row that fails to decode is a DbError::CorruptRow, never a panic.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CategoryRepository`](category::CategoryRepository) - Catalog groupings
//! - [`ProductRepository`](product::ProductRepository) - Catalog records
//! - [`InventoryRepository`](inventory::InventoryRepository) - Stock rows keyed by product
//! - [`SaleRepository`](sale::SaleRepository) - Committed sales and items
//! - [`StockAdjustmentRepository`](stock::StockAdjustmentRepository) - Stock audit log
//! - [`MetricsRepository`](metrics::MetricsRepository) - Daily totals
//! - [`KvRepository`](kv::KvRepository) - Named documents in SQLite

pub mod category;
pub mod inventory;
pub mod kv;
pub mod metrics;
pub mod product;
pub mod sale;
pub mod stock;
