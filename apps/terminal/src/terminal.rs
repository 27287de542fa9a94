//! # Terminal
//!
//! Wires the store, stock, cart, recovery, sync and backup components of one
//! device together.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Terminal::open                                  │
//! │                                                                         │
//! │  1. Database::new         open tillbox.db, run migrations              │
//! │  2. persister.load()      store_rows ──► LocalStore                    │
//! │  3. recovery.load_queue() kv_store["recovery_queue"] ──► memory        │
//! │  4. build components      StockManager, SyncQueue, CartEngine, ...     │
//! │  5. recover()             replay sales the store lost in a crash       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## UI Boundary
//! [`Terminal::complete_sale`] never returns an error. Every result becomes a
//! [`SaleOutcome`] the screen can render directly:
//! ```json
//! { "status": "rejected", "code": "INSUFFICIENT_STOCK", "message": "..." }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use tillbox_core::validation::validate_price;
use tillbox_core::{
    CoreError, InventoryRecord, Money, PaymentMethod, Product, SaleWithItems, StockChange,
};
use tillbox_db::{
    BackupFile, BackupInfo, BackupService, Database, DbConfig, DbError, InventoryRepository,
    LocalStore, MetricsRepository, ProductRepository, RecoveryQueue, RestoreSummary,
    SaleRepository, StockAdjustmentRepository, StockManager, StorePersister,
};
use tillbox_sync::SyncQueue;

use crate::cart::{CartEngine, CommittedSale};
use crate::config::TerminalConfig;
use crate::error::{TerminalError, TerminalResult};
use crate::tasks::BackgroundTasks;

// =============================================================================
// Sale Outcome
// =============================================================================

/// Machine-readable reason a sale did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    EmptyCart,
    CartBusy,
    InsufficientStock,
    NotFound,
    ValidationError,
    Internal,
}

impl RejectCode {
    fn from_error(err: &TerminalError) -> Self {
        match err.as_domain() {
            Some(CoreError::EmptyCart) => RejectCode::EmptyCart,
            Some(CoreError::CartBusy) => RejectCode::CartBusy,
            Some(CoreError::InsufficientStock { .. }) => RejectCode::InsufficientStock,
            Some(
                CoreError::ProductNotFound(_)
                | CoreError::InventoryNotFound(_)
                | CoreError::LineNotFound(_),
            ) => RejectCode::NotFound,
            Some(
                CoreError::Validation(_)
                | CoreError::CartTooLarge { .. }
                | CoreError::QuantityTooLarge { .. },
            ) => RejectCode::ValidationError,
            None => match err {
                TerminalError::Db(DbError::NotFound { .. }) => RejectCode::NotFound,
                _ => RejectCode::Internal,
            },
        }
    }
}

/// What the cashier sees after a completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub sale: SaleWithItems,
    pub stock_changes: Vec<StockChange>,
    /// Products this sale left at or below the low-stock threshold.
    pub low_stock: Vec<String>,
}

/// Result of [`Terminal::complete_sale`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaleOutcome {
    Completed(Receipt),
    Rejected { code: RejectCode, message: String },
}

impl SaleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SaleOutcome::Completed(_))
    }

    fn rejected(err: &TerminalError) -> Self {
        let code = RejectCode::from_error(err);
        if code == RejectCode::Internal {
            error!(error = %err, "Sale failed");
        }
        SaleOutcome::Rejected {
            code,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Terminal
// =============================================================================

/// One point-of-sale device.
#[derive(Debug, Clone)]
pub struct Terminal {
    config: TerminalConfig,
    db: Database,
    store: LocalStore,
    persister: StorePersister,
    stock: StockManager,
    products: ProductRepository,
    inventory: InventoryRepository,
    sales: SaleRepository,
    metrics: MetricsRepository,
    recovery: RecoveryQueue,
    sync: SyncQueue,
    cart: CartEngine,
    backups: BackupService,
}

impl Terminal {
    /// Opens the device database under the configured data directory.
    pub async fn open(config: TerminalConfig) -> TerminalResult<Self> {
        let db = Database::new(DbConfig::new(config.database_path()?)).await?;
        Self::open_with_database(config, db).await
    }

    /// Builds a terminal on an already open database.
    pub async fn open_with_database(config: TerminalConfig, db: Database) -> TerminalResult<Self> {
        let store = LocalStore::new();
        let persister = db.persister(store.clone());
        persister.load().await?;

        let recovery = RecoveryQueue::new(db.kv());
        recovery.load_queue().await?;

        let stock = StockManager::new(store.clone())
            .with_low_stock_threshold(config.inventory.low_stock_threshold);
        let sync = SyncQueue::new(store.clone(), config.sync.clone());
        let cart = CartEngine::new(
            store.clone(),
            stock.clone(),
            recovery.clone(),
            sync.clone(),
            config.device.user_id.clone(),
        );
        let backups = BackupService::new(
            store.clone(),
            recovery.clone(),
            persister.clone(),
            config.backup_dir()?,
        );

        let terminal = Terminal {
            products: ProductRepository::new(store.clone()),
            inventory: InventoryRepository::new(store.clone()),
            sales: SaleRepository::new(store.clone()),
            metrics: MetricsRepository::new(store.clone()),
            config,
            db,
            store,
            persister,
            stock,
            recovery,
            sync,
            cart,
            backups,
        };

        let replayed = terminal.recover().await?;
        info!(
            device_id = %terminal.config.device.id,
            device_name = %terminal.config.device.name,
            products = terminal.products.count(),
            queued_sync = terminal.sync.len(),
            replayed,
            "Terminal ready"
        );

        Ok(terminal)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn persister(&self) -> &StorePersister {
        &self.persister
    }

    pub fn cart(&self) -> &CartEngine {
        &self.cart
    }

    pub fn stock(&self) -> &StockManager {
        &self.stock
    }

    pub fn sync_queue(&self) -> &SyncQueue {
        &self.sync
    }

    pub fn recovery(&self) -> &RecoveryQueue {
        &self.recovery
    }

    pub fn backups(&self) -> &BackupService {
        &self.backups
    }

    pub fn sales(&self) -> &SaleRepository {
        &self.sales
    }

    // =========================================================================
    // Sales
    // =========================================================================

    /// Commits the cart. Never fails; see [`SaleOutcome`].
    pub async fn complete_sale(&self, payment_method: PaymentMethod) -> SaleOutcome {
        match self.cart.commit(payment_method).await {
            Ok(CommittedSale {
                sale,
                stock_changes,
            }) => {
                let threshold = self.stock.low_stock_threshold();
                let low_stock: Vec<String> = stock_changes
                    .iter()
                    .filter(|c| c.new_stock <= threshold)
                    .map(|c| c.product_id.clone())
                    .collect();
                if !low_stock.is_empty() {
                    info!(products = ?low_stock, threshold, "Low stock after sale");
                }
                SaleOutcome::Completed(Receipt {
                    sale,
                    stock_changes,
                    low_stock,
                })
            }
            Err(e) => SaleOutcome::rejected(&e),
        }
    }

    // =========================================================================
    // Catalog & Stock
    // =========================================================================

    /// Adds or replaces a product and its inventory on this device.
    pub fn import_product(
        &self,
        product: &Product,
        stock: i64,
        buy_price: Money,
        sell_price: Money,
    ) -> TerminalResult<InventoryRecord> {
        validate_price("buy_price", buy_price).map_err(CoreError::from)?;
        validate_price("sell_price", sell_price).map_err(CoreError::from)?;

        let record = InventoryRecord::new(
            product.id.clone(),
            self.config.device.user_id.clone(),
            stock,
            buy_price,
            sell_price,
        );
        self.products.upsert(product)?;
        self.inventory.upsert(&record)?;
        self.enqueue_inventory(&product.id);

        info!(product_id = %product.id, stock, "Product imported");
        Ok(record)
    }

    /// Adds stock and queues the new level for the backend.
    pub fn restock(&self, product_id: &str, quantity: i64) -> TerminalResult<i64> {
        let new_stock = self.stock.restock_product(product_id, quantity)?;
        self.enqueue_inventory(product_id);
        Ok(new_stock)
    }

    pub fn low_stock_items(&self) -> TerminalResult<Vec<InventoryRecord>> {
        Ok(self.stock.get_low_stock_items()?)
    }

    fn enqueue_inventory(&self, product_id: &str) {
        match self.inventory.get(product_id) {
            Ok(Some(record)) => {
                if let Err(e) = self.sync.enqueue_inventory(&record) {
                    warn!(product_id = %product_id, error = %e, "Failed to enqueue inventory for sync");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(product_id = %product_id, error = %e, "Unreadable inventory row"),
        }
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Replays recovery entries whose sale never reached saved storage.
    ///
    /// ## When This Occurs
    /// The device died after the recovery log was written but before the
    /// auto-saver flushed the store. The sale, its stock decrement and
    /// metrics are written in one batch, so a saved store holds all of them
    /// or none; a missing sale row means the stock is redone too.
    ///
    /// Returns the number of sales replayed.
    pub async fn recover(&self) -> TerminalResult<usize> {
        let audit = StockAdjustmentRepository::new(self.store.clone());
        let mut replayed = 0;

        for entry in self.recovery.items().await {
            let sale_id = &entry.sale.id;
            if self.sales.exists(sale_id) {
                continue;
            }

            if audit.has_sale(sale_id) {
                debug!(sale_id = %sale_id, "Stock already applied for recovered sale");
                self.insert_sale_only(&entry)?;
            } else {
                match self.stock.commit_sale(&entry) {
                    Ok(changes) => {
                        for change in &changes {
                            self.enqueue_inventory(&change.product_id);
                        }
                    }
                    Err(e) if e.as_domain().is_some() => {
                        warn!(sale_id = %sale_id, error = %e, "Stock not replayed for recovered sale");
                        self.insert_sale_only(&entry)?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            if let Err(e) = self.sync.enqueue_sale(&entry) {
                warn!(sale_id = %sale_id, error = %e, "Failed to enqueue recovered sale");
            }

            info!(sale_id = %sale_id, total = %entry.sale.total_amount, "Sale recovered");
            replayed += 1;
        }

        if replayed > 0 {
            self.persister.save().await?;
        }
        Ok(replayed)
    }

    /// Writes a recovered sale and its metrics without touching stock.
    fn insert_sale_only(&self, entry: &SaleWithItems) -> TerminalResult<()> {
        self.sales.insert(entry)?;
        if let Err(e) = self.metrics.record_sale(entry) {
            warn!(sale_id = %entry.sale.id, error = %e, "Failed to update daily metrics");
        }
        Ok(())
    }

    // =========================================================================
    // Backups
    // =========================================================================

    /// Writes a backup, then prunes old ones down to `backup.keep`.
    pub async fn create_backup(&self) -> TerminalResult<BackupInfo> {
        backup_and_prune(&self.backups, self.config.backup.keep).await
    }

    /// Replaces the whole store with a backup. Destructive.
    ///
    /// Anything still in the cart is dropped, and queued sync items are
    /// whatever the backup held.
    pub async fn restore_backup(&self, file_name: &str) -> TerminalResult<RestoreSummary> {
        self.cart.clear();
        let summary = self.backups.restore_from_backup(file_name).await?;
        self.sync.wake();
        Ok(summary)
    }

    pub async fn list_backups(&self) -> TerminalResult<Vec<BackupFile>> {
        Ok(self.backups.list_backups().await?)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Writes the store to device storage now.
    pub async fn save(&self) -> TerminalResult<usize> {
        Ok(self.persister.save().await?)
    }

    /// Starts the auto-saver, sync worker and backup timer.
    pub fn start_background(&self) -> TerminalResult<BackgroundTasks> {
        BackgroundTasks::start(self)
    }

    /// Final save and database close. Stop background tasks first.
    pub async fn shutdown(&self) -> TerminalResult<()> {
        let rows = self.persister.save().await?;
        self.db.close().await;
        info!(rows, at = %Utc::now(), "Terminal shut down");
        Ok(())
    }
}

/// Creates a backup and keeps only the newest `keep` files.
///
/// A failed prune is logged; the backup itself still counts.
pub(crate) async fn backup_and_prune(
    backups: &BackupService,
    keep: usize,
) -> TerminalResult<BackupInfo> {
    let info = backups.create_backup().await?;
    match backups.prune_backups(keep).await {
        Ok(0) => {}
        Ok(removed) => info!(removed, keep, "Old backups pruned"),
        Err(e) => warn!(error = %e, "Failed to prune old backups"),
    }
    Ok(info)
}
