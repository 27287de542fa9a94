//! # Cart Engine
//!
//! Owns the in-progress transaction and turns it into a committed sale.
//!
//! ## Commit Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          commit(payment)                                │
//! │                                                                         │
//! │  1. cart.begin_commit()          EmptyCart / CartBusy ──► error        │
//! │  2. can_sell(line) for each line InsufficientStock ──► abort, error    │
//! │  3. build_sale()                 totals from the same line math        │
//! │  4. stock.commit_sale(sale)      stock + sale + metrics, one batch     │
//! │     ─────────────── the sale is committed past this line ────────────  │
//! │  5. recovery.add · sync.enqueue_*                                      │
//! │     (failures are logged, the sale stands)                             │
//! │  6. cart.finish_commit()         back to Empty                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Thread Safety
//! The cart sits behind a `std::sync::Mutex`. The lock is only taken for
//! short synchronous steps and is never held across an `.await`; the
//! `Committing` phase keeps other edits out while the commit awaits.
//! A [`CommitGuard`] leaves `Committing` even if the commit future is
//! dropped part way.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use tillbox_core::cart::build_sale;
use tillbox_core::{
    Cart, CartLine, CartPhase, CartTotals, CoreError, PaymentMethod, SaleWithItems, StockChange,
};
use tillbox_db::{InventoryRepository, LocalStore, ProductRepository, RecoveryQueue, StockManager};
use tillbox_sync::SyncQueue;

use crate::error::TerminalResult;

/// A sale that made it through stock commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedSale {
    pub sale: SaleWithItems,
    /// New stock levels, one per distinct product.
    pub stock_changes: Vec<StockChange>,
}

/// The cart plus everything a commit writes to.
#[derive(Debug, Clone)]
pub struct CartEngine {
    cart: Arc<Mutex<Cart>>,
    stock: StockManager,
    products: ProductRepository,
    inventory: InventoryRepository,
    recovery: RecoveryQueue,
    sync: SyncQueue,
    user_id: String,
}

impl CartEngine {
    pub fn new(
        store: LocalStore,
        stock: StockManager,
        recovery: RecoveryQueue,
        sync: SyncQueue,
        user_id: impl Into<String>,
    ) -> Self {
        CartEngine {
            cart: Arc::new(Mutex::new(Cart::new())),
            stock,
            products: ProductRepository::new(store.clone()),
            inventory: InventoryRepository::new(store),
            recovery,
            sync,
            user_id: user_id.into(),
        }
    }

    /// A panic while holding the lock leaves a cart that is still valid data.
    fn lock(&self) -> MutexGuard<'_, Cart> {
        self.cart.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// Adds `quantity` of a product at its current shelf price.
    ///
    /// Stock is not checked here; commit does that against live levels.
    pub fn add_product(&self, product_id: &str, quantity: i64) -> TerminalResult<CartTotals> {
        let product = self.products.require(product_id)?;
        let inventory = self.inventory.require(product_id)?;

        let mut cart = self.lock();
        cart.add_line(&product, &inventory, quantity)?;
        debug!(product_id = %product_id, quantity, lines = cart.line_count(), "Added to cart");
        Ok(cart.totals())
    }

    pub fn remove_line(&self, product_id: &str) -> TerminalResult<CartTotals> {
        let mut cart = self.lock();
        cart.remove_line(product_id)?;
        Ok(cart.totals())
    }

    pub fn update_quantity(&self, product_id: &str, quantity: i64) -> TerminalResult<CartTotals> {
        let mut cart = self.lock();
        cart.update_quantity(product_id, quantity)?;
        Ok(cart.totals())
    }

    /// Empties the cart. Ignored while a commit is in flight.
    pub fn clear(&self) {
        let mut cart = self.lock();
        if cart.phase() == CartPhase::Committing {
            warn!("Clear ignored during commit");
            return;
        }
        cart.clear();
    }

    pub fn totals(&self) -> CartTotals {
        self.lock().totals()
    }

    pub fn lines(&self) -> Vec<CartLine> {
        self.lock().lines().to_vec()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Sells everything in the cart.
    ///
    /// ## Errors
    /// - `EmptyCart`, `CartBusy` from the cart phase
    /// - `InsufficientStock` for the first line that can't be sold; nothing
    ///   is written and the cart keeps its lines
    ///
    /// Once the sale and its stock are written the sale is returned even if
    /// a later write fails. The recovery log or a later replay covers those
    /// gaps.
    pub async fn commit(&self, payment_method: PaymentMethod) -> TerminalResult<CommittedSale> {
        let lines = self.lock().begin_commit()?;
        let mut guard = CommitGuard {
            cart: &self.cart,
            sold: false,
        };

        self.check_stock(&lines)?;

        let sale = build_sale(&lines, &self.user_id, payment_method, Utc::now());
        let stock_changes = self.stock.commit_sale(&sale)?;
        guard.sold = true;

        self.record(&sale, &stock_changes).await;
        drop(guard);

        info!(
            sale_id = %sale.sale.id,
            total = %sale.sale.total_amount,
            profit = %sale.sale.total_profit,
            items = sale.items.len(),
            payment = sale.sale.payment_method.as_str(),
            "Sale committed"
        );

        Ok(CommittedSale {
            sale,
            stock_changes,
        })
    }

    fn check_stock(&self, lines: &[CartLine]) -> TerminalResult<()> {
        for line in lines {
            if !self.stock.can_sell(&line.product_id, line.quantity) {
                let available = self
                    .stock
                    .current_stock(&line.product_id)
                    .ok()
                    .flatten()
                    .unwrap_or(0);
                info!(
                    product_id = %line.product_id,
                    available,
                    requested = line.quantity,
                    "Sale rejected: insufficient stock"
                );
                return Err(CoreError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    available,
                    requested: line.quantity,
                }
                .into());
            }
        }

        Ok(())
    }

    /// Every write that follows a successful sale commit.
    async fn record(&self, sale: &SaleWithItems, stock_changes: &[StockChange]) {
        let sale_id = &sale.sale.id;

        if let Err(e) = self.recovery.add(sale.clone()).await {
            error!(sale_id = %sale_id, error = %e, "Failed to append sale to recovery queue");
        }

        if let Err(e) = self.sync.enqueue_sale(sale) {
            warn!(sale_id = %sale_id, error = %e, "Failed to enqueue sale for sync");
        }

        for change in stock_changes {
            match self.inventory.get(&change.product_id) {
                Ok(Some(record)) => {
                    if let Err(e) = self.sync.enqueue_inventory(&record) {
                        warn!(
                            product_id = %change.product_id,
                            error = %e,
                            "Failed to enqueue inventory for sync"
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(product_id = %change.product_id, error = %e, "Unreadable inventory row"),
            }
        }
    }
}

/// Moves the cart out of `Committing` when the commit ends, including when
/// its future is dropped.
struct CommitGuard<'a> {
    cart: &'a Mutex<Cart>,
    /// The sale is in the store; the cart empties instead of reopening.
    sold: bool,
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        let mut cart = self.cart.lock().unwrap_or_else(PoisonError::into_inner);
        if cart.phase() != CartPhase::Committing {
            return;
        }
        if self.sold {
            cart.finish_commit();
        } else {
            cart.abort_commit();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::TerminalError;
    use std::time::Duration;
    use tillbox_core::{InventoryRecord, Money, Product};
    use tillbox_db::{Database, DbConfig, MetricsRepository, SaleRepository};
    use tillbox_sync::SyncSettings;

    pub(crate) fn product(id: &str, name: &str) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            category: None,
            barcode: None,
            description: None,
        }
    }

    /// p1: €3.00 (cost €2.00) × 10, p2: €5.00 (cost €3.00) × 4.
    pub(crate) fn seed(store: &LocalStore) {
        let products = ProductRepository::new(store.clone());
        let inventory = InventoryRepository::new(store.clone());

        products.upsert(&product("p1", "Cola")).unwrap();
        products.upsert(&product("p2", "Crisps")).unwrap();
        inventory
            .upsert(&InventoryRecord::new(
                "p1",
                "owner",
                10,
                Money::from_cents(200),
                Money::from_cents(300),
            ))
            .unwrap();
        inventory
            .upsert(&InventoryRecord::new(
                "p2",
                "owner",
                4,
                Money::from_cents(300),
                Money::from_cents(500),
            ))
            .unwrap();
    }

    struct Fixture {
        engine: CartEngine,
        store: LocalStore,
        stock: StockManager,
        recovery: RecoveryQueue,
        sync: SyncQueue,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = LocalStore::new();
        seed(&store);

        let stock = StockManager::new(store.clone());
        let recovery = RecoveryQueue::new(db.kv());
        let sync = SyncQueue::new(store.clone(), SyncSettings::default());
        let engine = CartEngine::new(
            store.clone(),
            stock.clone(),
            recovery.clone(),
            sync.clone(),
            "owner",
        );

        Fixture {
            engine,
            store,
            stock,
            recovery,
            sync,
        }
    }

    #[tokio::test]
    async fn test_commit_eleven_euro_cart() {
        let f = fixture().await;
        f.engine.add_product("p1", 2).unwrap();
        let totals = f.engine.add_product("p2", 1).unwrap();
        assert_eq!(totals.total_amount.cents(), 1100);

        let committed = f.engine.commit(PaymentMethod::Cash).await.unwrap();

        assert_eq!(committed.sale.sale.total_amount.cents(), 1100);
        assert_eq!(committed.sale.sale.total_profit.cents(), 400);
        assert_eq!(committed.sale.items.len(), 2);
        let items_total: i64 = committed.sale.items.iter().map(|i| i.total_price.cents()).sum();
        assert_eq!(items_total, 1100);

        assert_eq!(f.stock.current_stock("p1").unwrap(), Some(8));
        assert_eq!(f.stock.current_stock("p2").unwrap(), Some(3));
        assert_eq!(committed.stock_changes.len(), 2);

        assert!(f.engine.is_empty());
        assert_eq!(f.engine.totals().phase, CartPhase::Empty);

        let sales = SaleRepository::new(f.store.clone());
        assert!(sales.exists(&committed.sale.sale.id));
        assert_eq!(f.recovery.len().await, 1);

        // Sale, two items, two inventory upserts.
        assert_eq!(f.sync.len(), 5);

        let metric = MetricsRepository::new(f.store.clone())
            .get(committed.sale.sale.business_date())
            .unwrap()
            .unwrap();
        assert_eq!(metric.transaction_count, 1);
        assert_eq!(metric.items_sold, 3);
    }

    #[tokio::test]
    async fn test_insufficient_stock_changes_nothing() {
        let f = fixture().await;
        f.engine.add_product("p1", 2).unwrap();
        f.engine.add_product("p2", 5).unwrap();

        let err = f.engine.commit(PaymentMethod::Card).await.unwrap_err();
        assert_eq!(
            err.as_domain(),
            Some(&CoreError::InsufficientStock {
                product_id: "p2".into(),
                available: 4,
                requested: 5,
            })
        );

        assert_eq!(f.stock.current_stock("p1").unwrap(), Some(10));
        assert_eq!(f.stock.current_stock("p2").unwrap(), Some(4));
        assert_eq!(f.store.row_count(tillbox_db::tables::SALES), 0);
        assert!(f.recovery.is_empty().await);
        assert!(f.sync.is_empty());

        // Cart keeps its lines and can be edited again.
        assert_eq!(f.engine.lines().len(), 2);
        assert_eq!(f.engine.totals().phase, CartPhase::Accumulating);
        f.engine.update_quantity("p2", 4).unwrap();
        f.engine.commit(PaymentMethod::Card).await.unwrap();
        assert_eq!(f.stock.current_stock("p2").unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let f = fixture().await;
        let err = f.engine.commit(PaymentMethod::Cash).await.unwrap_err();
        assert_eq!(err.as_domain(), Some(&CoreError::EmptyCart));

        f.engine.add_product("p1", 1).unwrap();
        f.engine.remove_line("p1").unwrap();
        let err = f.engine.commit(PaymentMethod::Cash).await.unwrap_err();
        assert_eq!(err.as_domain(), Some(&CoreError::EmptyCart));
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let f = fixture().await;
        let err = f.engine.add_product("nope", 1).unwrap_err();
        assert!(matches!(err, TerminalError::Db(_)));
        assert!(f.engine.is_empty());
    }

    #[tokio::test]
    async fn test_stock_is_checked_at_commit_not_add() {
        let f = fixture().await;
        f.engine.add_product("p2", 3).unwrap();

        // Someone else sells two in between.
        f.stock.sell_product("p2", 2).unwrap();

        let err = f.engine.commit(PaymentMethod::Cash).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InsufficientStock { available: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_commit_leaves_committing() {
        let f = fixture().await;
        f.engine.add_product("p1", 2).unwrap();

        // A zero timeout drops the commit wherever it first yields.
        let _ = tokio::time::timeout(Duration::ZERO, f.engine.commit(PaymentMethod::Cash)).await;
        assert_ne!(f.engine.totals().phase, CartPhase::Committing);

        // The sale either landed and emptied the cart, or nothing was sold.
        let sold = f.store.row_count(tillbox_db::tables::SALES) == 1;
        assert_eq!(f.engine.is_empty(), sold);
        assert_eq!(f.stock.current_stock("p1").unwrap(), Some(if sold { 8 } else { 10 }));

        f.engine.add_product("p2", 1).unwrap();
        f.engine.commit(PaymentMethod::Cash).await.unwrap();
    }

    #[test]
    fn test_commit_guard() {
        let cart = Mutex::new(Cart::new());
        cart.lock()
            .unwrap()
            .add_line(
                &product("p1", "Cola"),
                &InventoryRecord::new(
                    "p1",
                    "owner",
                    10,
                    Money::from_cents(200),
                    Money::from_cents(300),
                ),
                1,
            )
            .unwrap();

        cart.lock().unwrap().begin_commit().unwrap();
        drop(CommitGuard {
            cart: &cart,
            sold: false,
        });
        assert_eq!(cart.lock().unwrap().phase(), CartPhase::Accumulating);
        assert_eq!(cart.lock().unwrap().line_count(), 1);

        cart.lock().unwrap().begin_commit().unwrap();
        drop(CommitGuard {
            cart: &cart,
            sold: true,
        });
        assert_eq!(cart.lock().unwrap().phase(), CartPhase::Empty);
    }
}
