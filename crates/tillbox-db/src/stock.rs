//! # Stock Manager
//!
//! Enforces stock invariants on top of the local store.
//!
//! ## Invariants
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Stock Invariants                                   │
//! │                                                                         │
//! │  1. stock ≥ 0 after every operation                                    │
//! │  2. Every change writes exactly one stock_updates audit row            │
//! │  3. A failed operation writes nothing                                  │
//! │                                                                         │
//! │  sell_product(p1, 4)            stock 10                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────── one store batch ────────────────┐                   │
//! │  │  re-read inventory/p1     (lock held)           │                   │
//! │  │  10 ≥ 4 ?  ── no ──► InsufficientStock, drop    │                   │
//! │  │     │ yes                                       │                   │
//! │  │  inventory/p1.stock = 6                         │                   │
//! │  │  stock_updates/<id> = { 10 → 6, sale }          │                   │
//! │  └─────────────────────────────────────────────────┘                   │
//! │                                                                         │
//! │  apply_sale_batch([p1×2, p2×1]) does the same for every line at once:  │
//! │  all lines are checked before any line is written.                     │
//! │  commit_sale(sale) adds the sale, its items and the day's metrics to   │
//! │  that same batch.                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{debug, info, warn};

use tillbox_core::validation::{validate_positive, validate_restock_quantity};
use tillbox_core::{
    new_id, AdjustmentReason, CoreError, InventoryRecord, SaleWithItems, StockAdjustmentRecord,
    StockChange, StockRequest, DEFAULT_LOW_STOCK_THRESHOLD,
};

use crate::error::{DbError, DbResult};
use crate::repository::metrics::stage_sale_metrics;
use crate::repository::sale::stage_sale;
use crate::store::{tables, LocalStore, StoreBatch};

/// Stock operations for the local store.
#[derive(Debug, Clone)]
pub struct StockManager {
    store: LocalStore,
    low_stock_threshold: i64,
}

impl StockManager {
    pub fn new(store: LocalStore) -> Self {
        StockManager {
            store,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }

    /// Sets the level at or below which stock counts as low.
    pub fn with_low_stock_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold
    }

    /// Current stock for a product, if it has inventory.
    pub fn current_stock(&self, product_id: &str) -> DbResult<Option<i64>> {
        Ok(self
            .store
            .get_record::<InventoryRecord>(tables::INVENTORY, product_id)?
            .map(|r| r.stock))
    }

    /// Whether `quantity` units could be sold right now.
    ///
    /// False when the product has no inventory, the quantity is not positive,
    /// or the row can't be read.
    pub fn can_sell(&self, product_id: &str, quantity: i64) -> bool {
        if quantity <= 0 {
            return false;
        }
        match self.current_stock(product_id) {
            Ok(Some(stock)) => stock >= quantity,
            Ok(None) => false,
            Err(e) => {
                warn!(product_id = %product_id, error = %e, "Unreadable inventory row");
                false
            }
        }
    }

    /// Sells `quantity` units and returns the new stock level.
    ///
    /// ## Errors
    /// - `Domain(Validation)` for a non-positive quantity
    /// - `Domain(InventoryNotFound)` when the product has no inventory
    /// - `Domain(InsufficientStock)` when stock < quantity (nothing written)
    pub fn sell_product(&self, product_id: &str, quantity: i64) -> DbResult<i64> {
        validate_positive("quantity", quantity)?;

        let change = self.store.batch(|b| {
            apply_change(b, product_id, -quantity, AdjustmentReason::Sale, None)
        })?;

        info!(
            product_id = %product_id,
            quantity,
            new_stock = change.new_stock,
            "Product sold"
        );
        Ok(change.new_stock)
    }

    /// Adds `quantity` units and returns the new stock level.
    pub fn restock_product(&self, product_id: &str, quantity: i64) -> DbResult<i64> {
        validate_restock_quantity(quantity)?;

        let change = self.store.batch(|b| {
            apply_change(b, product_id, quantity, AdjustmentReason::Restock, None)
        })?;

        info!(
            product_id = %product_id,
            quantity,
            new_stock = change.new_stock,
            "Product restocked"
        );
        Ok(change.new_stock)
    }

    /// Whether stock is at or below the low-stock threshold.
    ///
    /// Products without inventory are not reported as low.
    pub fn is_low_stock(&self, product_id: &str) -> bool {
        match self.current_stock(product_id) {
            Ok(Some(stock)) => stock <= self.low_stock_threshold,
            _ => false,
        }
    }

    /// Every active inventory record at or below the threshold, lowest first.
    pub fn get_low_stock_items(&self) -> DbResult<Vec<InventoryRecord>> {
        let mut low: Vec<InventoryRecord> = self
            .store
            .records::<InventoryRecord>(tables::INVENTORY)?
            .into_iter()
            .filter(|r| r.is_active && r.stock <= self.low_stock_threshold)
            .collect();
        low.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.product_id.cmp(&b.product_id)));
        Ok(low)
    }

    /// Sells every requested line in one store batch, or none of them.
    ///
    /// Requests for the same product are summed before checking, so two lines
    /// of 4 against stock 6 fail instead of both passing individually.
    ///
    /// ## Returns
    /// One [`StockChange`] per distinct product, in first-seen order.
    pub fn apply_sale_batch(&self, requests: &[StockRequest]) -> DbResult<Vec<StockChange>> {
        let totals = sum_requests(requests)?;
        let changes = self.store.batch(|b| stage_sale_stock(b, &totals, None))?;

        debug!(lines = changes.len(), "Sale batch applied");
        Ok(changes)
    }

    /// Writes a sale together with its stock decrement and daily metrics.
    ///
    /// The inventory rows, audit rows, sale row, item rows and the day's
    /// metric row land in one store batch, so no saved snapshot holds the
    /// decrement without the sale. A stock failure writes nothing.
    pub fn commit_sale(&self, sale: &SaleWithItems) -> DbResult<Vec<StockChange>> {
        let requests: Vec<StockRequest> = sale
            .items
            .iter()
            .map(|item| StockRequest {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
            })
            .collect();
        let totals = sum_requests(&requests)?;

        let changes = self.store.batch(|b| {
            let changes = stage_sale_stock(b, &totals, Some(sale.sale.id.as_str()))?;
            stage_sale(b, sale)?;
            stage_sale_metrics(b, sale)?;
            Ok::<_, DbError>(changes)
        })?;

        debug!(
            sale_id = %sale.sale.id,
            products = changes.len(),
            "Sale and stock written"
        );
        Ok(changes)
    }
}

/// Per-product totals in first-seen order.
fn sum_requests(requests: &[StockRequest]) -> DbResult<Vec<(&str, i64)>> {
    let mut totals: Vec<(&str, i64)> = Vec::new();
    for request in requests {
        validate_positive("quantity", request.quantity)?;
        match totals
            .iter_mut()
            .find(|(product_id, _)| *product_id == request.product_id)
        {
            Some((_, quantity)) => *quantity += request.quantity,
            None => totals.push((request.product_id.as_str(), request.quantity)),
        }
    }
    Ok(totals)
}

fn stage_sale_stock(
    b: &mut StoreBatch<'_>,
    totals: &[(&str, i64)],
    sale_id: Option<&str>,
) -> DbResult<Vec<StockChange>> {
    // Check everything first so the error names the first short line.
    for &(product_id, requested) in totals {
        let available = read_inventory(b, product_id)?.stock;
        if available < requested {
            return Err(DbError::Domain(CoreError::InsufficientStock {
                product_id: product_id.to_string(),
                available,
                requested,
            }));
        }
    }

    totals
        .iter()
        .map(|&(product_id, requested)| {
            apply_change(b, product_id, -requested, AdjustmentReason::Sale, sale_id)
        })
        .collect()
}

fn read_inventory(b: &StoreBatch<'_>, product_id: &str) -> DbResult<InventoryRecord> {
    b.get_record::<InventoryRecord>(tables::INVENTORY, product_id)?
        .ok_or_else(|| DbError::Domain(CoreError::InventoryNotFound(product_id.to_string())))
}

/// Applies a signed delta plus its audit row inside a batch.
fn apply_change(
    b: &mut StoreBatch<'_>,
    product_id: &str,
    delta: i64,
    reason: AdjustmentReason,
    sale_id: Option<&str>,
) -> DbResult<StockChange> {
    let mut record = read_inventory(b, product_id)?;
    let old_stock = record.stock;
    let new_stock = old_stock + delta;

    if new_stock < 0 {
        return Err(DbError::Domain(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            available: old_stock,
            requested: -delta,
        }));
    }

    let now = Utc::now();
    record.stock = new_stock;
    record.updated_at = now;
    b.put_record(tables::INVENTORY, product_id, &record)?;

    let adjustment = StockAdjustmentRecord {
        id: new_id(),
        product_id: product_id.to_string(),
        old_stock,
        new_stock,
        reason,
        sale_id: sale_id.map(str::to_string),
        created_at: now,
    };
    b.put_record(tables::STOCK_UPDATES, &adjustment.id, &adjustment)?;

    Ok(StockChange {
        product_id: product_id.to_string(),
        old_stock,
        new_stock,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::inventory::InventoryRepository;
    use crate::repository::metrics::MetricsRepository;
    use crate::repository::sale::SaleRepository;
    use crate::repository::stock::StockAdjustmentRepository;
    use tillbox_core::cart::build_sale;
    use tillbox_core::{CartLine, Money, PaymentMethod};

    fn setup(stocks: &[(&str, i64)]) -> (LocalStore, StockManager) {
        let store = LocalStore::new();
        let inventory = InventoryRepository::new(store.clone());
        for (product_id, stock) in stocks {
            inventory
                .upsert(&InventoryRecord::new(
                    *product_id,
                    "u1",
                    *stock,
                    Money::from_cents(100),
                    Money::from_cents(300),
                ))
                .unwrap();
        }
        let manager = StockManager::new(store.clone());
        (store, manager)
    }

    fn request(product_id: &str, quantity: i64) -> StockRequest {
        StockRequest {
            product_id: product_id.into(),
            quantity,
        }
    }

    #[test]
    fn test_sell_then_oversell() {
        let (store, stock) = setup(&[("p1", 10)]);

        assert_eq!(stock.sell_product("p1", 4).unwrap(), 6);

        let err = stock.sell_product("p1", 10).unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InsufficientStock {
                available: 6,
                requested: 10,
                ..
            })
        ));
        assert_eq!(stock.current_stock("p1").unwrap(), Some(6));

        // One audit row for the sale, none for the failure.
        let audit = StockAdjustmentRepository::new(store).list().unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!((audit[0].old_stock, audit[0].new_stock), (10, 6));
        assert_eq!(audit[0].reason, AdjustmentReason::Sale);
    }

    #[test]
    fn test_can_sell() {
        let (_, stock) = setup(&[("p1", 3)]);
        assert!(stock.can_sell("p1", 3));
        assert!(!stock.can_sell("p1", 4));
        assert!(!stock.can_sell("p1", 0));
        assert!(!stock.can_sell("nope", 1));
    }

    #[test]
    fn test_sell_exact_stock_reaches_zero() {
        let (_, stock) = setup(&[("p1", 3)]);
        assert_eq!(stock.sell_product("p1", 3).unwrap(), 0);
        assert!(stock.sell_product("p1", 1).is_err());
    }

    #[test]
    fn test_invalid_quantities() {
        let (_, stock) = setup(&[("p1", 3)]);
        assert!(matches!(
            stock.sell_product("p1", 0),
            Err(DbError::Domain(CoreError::Validation(_)))
        ));
        assert!(stock.restock_product("p1", -5).is_err());
        assert!(matches!(
            stock.sell_product("nope", 1),
            Err(DbError::Domain(CoreError::InventoryNotFound(_)))
        ));
    }

    #[test]
    fn test_restock_is_audited() {
        let (store, stock) = setup(&[("p1", 2)]);
        assert_eq!(stock.restock_product("p1", 20).unwrap(), 22);

        let audit = StockAdjustmentRepository::new(store)
            .for_product("p1")
            .unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].reason, AdjustmentReason::Restock);
    }

    #[test]
    fn test_low_stock() {
        let (_, stock) = setup(&[("p1", 10), ("p2", 11), ("p3", 0)]);
        assert!(stock.is_low_stock("p1"));
        assert!(!stock.is_low_stock("p2"));
        assert!(!stock.is_low_stock("missing"));

        let low: Vec<String> = stock
            .get_low_stock_items()
            .unwrap()
            .into_iter()
            .map(|r| r.product_id)
            .collect();
        assert_eq!(low, vec!["p3", "p1"]);

        let strict = stock.clone().with_low_stock_threshold(0);
        assert_eq!(strict.get_low_stock_items().unwrap().len(), 1);
    }

    #[test]
    fn test_batch_all_or_nothing() {
        let (store, stock) = setup(&[("p1", 5), ("p2", 1)]);

        let err = stock
            .apply_sale_batch(&[request("p1", 2), request("p2", 3)])
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InsufficientStock { product_id, .. }) if product_id == "p2"
        ));
        assert_eq!(stock.current_stock("p1").unwrap(), Some(5));
        assert_eq!(store.row_count(tables::STOCK_UPDATES), 0);

        let changes = stock
            .apply_sale_batch(&[request("p1", 2), request("p2", 1)])
            .unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].new_stock, 3);
        assert_eq!(changes[1].new_stock, 0);
        assert_eq!(store.row_count(tables::STOCK_UPDATES), 2);
    }

    #[test]
    fn test_batch_sums_duplicate_products() {
        let (_, stock) = setup(&[("p1", 6)]);
        assert!(stock
            .apply_sale_batch(&[request("p1", 4), request("p1", 4)])
            .is_err());

        let changes = stock
            .apply_sale_batch(&[request("p1", 3), request("p1", 3)])
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_stock, 0);
    }

    fn line(product_id: &str, quantity: i64) -> CartLine {
        CartLine {
            product_id: product_id.into(),
            inventory_id: product_id.into(),
            name: product_id.to_uppercase(),
            unit_price: Money::from_cents(300),
            buy_price: Money::from_cents(100),
            quantity,
        }
    }

    #[test]
    fn test_commit_sale_writes_sale_with_stock() {
        let (store, stock) = setup(&[("p1", 10), ("p2", 4)]);
        let sale = build_sale(
            &[line("p1", 2), line("p2", 1)],
            "u1",
            PaymentMethod::Cash,
            Utc::now(),
        );

        let changes = stock.commit_sale(&sale).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(stock.current_stock("p1").unwrap(), Some(8));

        let sales = SaleRepository::new(store.clone());
        assert!(sales.exists(&sale.sale.id));
        assert_eq!(sales.items_for(&sale.sale.id).unwrap().len(), 2);
        let metric = MetricsRepository::new(store.clone())
            .get(sale.sale.business_date())
            .unwrap()
            .unwrap();
        assert_eq!(metric.transaction_count, 1);
        let audit = StockAdjustmentRepository::new(store.clone());
        assert_eq!(audit.count(), 2);
        assert!(audit.has_sale(&sale.sale.id));
        assert!(audit
            .list()
            .unwrap()
            .iter()
            .all(|r| r.sale_id.as_deref() == Some(sale.sale.id.as_str())));
    }

    #[test]
    fn test_commit_sale_short_stock_writes_nothing() {
        let (store, stock) = setup(&[("p1", 10), ("p2", 1)]);
        let sale = build_sale(
            &[line("p1", 2), line("p2", 3)],
            "u1",
            PaymentMethod::Card,
            Utc::now(),
        );

        assert!(matches!(
            stock.commit_sale(&sale),
            Err(DbError::Domain(CoreError::InsufficientStock { .. }))
        ));
        assert_eq!(stock.current_stock("p1").unwrap(), Some(10));
        assert_eq!(store.row_count(tables::SALES), 0);
        assert_eq!(store.row_count(tables::SALE_ITEMS), 0);
        assert_eq!(store.row_count(tables::DAILY_METRICS), 0);
        assert_eq!(store.row_count(tables::STOCK_UPDATES), 0);
    }
}
