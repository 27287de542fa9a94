//! # tillbox-db: Local Store & Device Storage for Tillbox
//!
//! Everything the terminal keeps on the device: the in-memory local store that
//! serves every read, the typed repositories over it, the stock engine, the
//! recovery log, backups, and the SQLite database those are saved into.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tillbox Data Flow                                │
//! │                                                                         │
//! │  Terminal::complete_sale                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    tillbox-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ StockManager  │    │  Repositories │    │ RecoveryQueue│  │   │
//! │  │   │  (stock.rs)   │    │ (sale, metrics│    │ BackupService│  │   │
//! │  │   └───────┬───────┘    └───────┬───────┘    └──────┬───────┘  │   │
//! │  │           └────────────┬───────┘                   │          │   │
//! │  │                        ▼                           │          │   │
//! │  │   ┌─────────────────────────────────┐              │          │   │
//! │  │   │ LocalStore (store.rs)           │──events──► AutoSaver    │   │
//! │  │   │ table → row id → JSON row       │              │          │   │
//! │  │   └─────────────────────────────────┘              │          │   │
//! │  └────────────────────────────────────────────────────┼──────────┘   │
//! │       │ StorePersister                                │ files        │
//! │       ▼                                               ▼              │
//! │  ┌──────────────────────────────┐   ┌────────────────────────────┐  │
//! │  │ SQLite: store_rows, kv_store │   │ backups/backup_*.json      │  │
//! │  └──────────────────────────────┘   └────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - LocalStore, store events, atomic batches
//! - [`repository`] - Typed repositories (product, inventory, sale, ...)
//! - [`stock`] - Stock invariants and the atomic sale batch
//! - [`recovery`] - Recovery log of sales not yet in a backup
//! - [`backup`] - Snapshot files and restore
//! - [`persister`] - Saving the store into SQLite, auto-saver task
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tillbox_db::{Database, DbConfig, LocalStore, StockManager};
//!
//! let db = Database::new(DbConfig::new("path/to/tillbox.db")).await?;
//! let store = LocalStore::new();
//! db.persister(store.clone()).load().await?;
//!
//! let stock = StockManager::new(store.clone());
//! let remaining = stock.sell_product("p1", 2)?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backup;
pub mod error;
pub mod migrations;
pub mod persister;
pub mod pool;
pub mod recovery;
pub mod repository;
pub mod stock;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use backup::{BackupFile, BackupInfo, BackupService, BackupSnapshot, RestoreSummary};
pub use error::{DbError, DbResult};
pub use persister::{AutoSaver, AutoSaverHandle, StorePersister};
pub use pool::{Database, DbConfig};
pub use recovery::RecoveryQueue;
pub use stock::StockManager;
pub use store::{tables, LocalStore, Row, StoreBatch, StoreChange, StoreEvent};

// Repository re-exports for convenience
pub use repository::category::CategoryRepository;
pub use repository::inventory::InventoryRepository;
pub use repository::kv::KvRepository;
pub use repository::metrics::MetricsRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::stock::StockAdjustmentRepository;
