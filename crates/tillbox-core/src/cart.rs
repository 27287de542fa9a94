//! # Cart
//!
//! The in-progress transaction: lines, quantities, totals and profit.
//!
//! ## Cart Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cart Phases                                      │
//! │                                                                         │
//! │   ┌─────────┐  add_line   ┌──────────────┐  begin_commit ┌───────────┐ │
//! │   │  Empty  │────────────►│ Accumulating │──────────────►│Committing │ │
//! │   └─────────┘             └──────────────┘               └─────┬─────┘ │
//! │        ▲                     ▲    │  remove_line               │       │
//! │        │                     │    │  (may hold zero lines)     │       │
//! │        │                     └────┘                            │       │
//! │        │                     ▲  abort_commit                   │       │
//! │        │                     └─────────────────────────────────┤       │
//! │        │                        finish_commit / clear          │       │
//! │        └───────────────────────────────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cart itself does no I/O. The terminal's CartEngine drives the commit:
//! it takes the line snapshot from [`Cart::begin_commit`], applies stock
//! changes, and then calls [`Cart::finish_commit`] or [`Cart::abort_commit`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{
    new_id, InventoryRecord, PaymentMethod, Product, SaleItem, SaleRecord, SaleStatus,
    SaleWithItems, StockRequest,
};
use crate::validation::{validate_cart_size, validate_quantity};
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

// =============================================================================
// Cart Line
// =============================================================================

/// A line in the cart.
///
/// ## Price Freezing
/// `unit_price` and `buy_price` are copied from the inventory record when the
/// line is first added. Later price edits do not change an open cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub inventory_id: String,
    /// Product name at time of adding (frozen)
    pub name: String,
    pub unit_price: Money,
    pub buy_price: Money,
    pub quantity: i64,
}

impl CartLine {
    pub fn from_inventory(product: &Product, inventory: &InventoryRecord, quantity: i64) -> Self {
        CartLine {
            product_id: product.id.clone(),
            inventory_id: inventory.id.clone(),
            name: product.name.clone(),
            unit_price: inventory.sell_price,
            buy_price: inventory.buy_price,
            quantity,
        }
    }

    /// unit_price × quantity
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// (unit_price − buy_price) × quantity
    #[inline]
    pub fn line_profit(&self) -> Money {
        (self.unit_price - self.buy_price).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Cart Phase
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CartPhase {
    /// No lines have been added since the last clear.
    #[default]
    Empty,
    /// Lines are being added or removed. May hold zero lines after removals.
    Accumulating,
    /// A commit is in flight; the cart rejects edits.
    Committing,
}

// =============================================================================
// Cart
// =============================================================================

/// The in-progress transaction.
///
/// ## Invariants
/// - Lines are unique by `product_id` (adding again merges quantities)
/// - Every quantity is in 1..=999
/// - At most 100 distinct lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    phase: CartPhase,
    created_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    pub fn new() -> Self {
        Cart {
            lines: Vec::new(),
            phase: CartPhase::Empty,
            created_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> CartPhase {
        self.phase
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, product_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Adds a product or merges into its existing line.
    ///
    /// ## Errors
    /// - `CartBusy` while a commit is in flight
    /// - `Validation` for a quantity outside 1..=999
    /// - `QuantityTooLarge` if the merged quantity would exceed 999
    /// - `CartTooLarge` when adding a 101st distinct line
    pub fn add_line(
        &mut self,
        product: &Product,
        inventory: &InventoryRecord,
        quantity: i64,
    ) -> CoreResult<()> {
        self.ensure_editable()?;
        validate_quantity(quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            let merged = line.quantity + quantity;
            if merged > MAX_LINE_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: merged,
                    max: MAX_LINE_QUANTITY,
                });
            }
            line.quantity = merged;
        } else {
            validate_cart_size(self.lines.len())
                .map_err(|_| CoreError::CartTooLarge { max: MAX_CART_LINES })?;
            self.lines
                .push(CartLine::from_inventory(product, inventory, quantity));
        }

        self.phase = CartPhase::Accumulating;
        Ok(())
    }

    /// Drops the line for a product.
    ///
    /// Removing the last line leaves the cart `Accumulating` with zero lines;
    /// callers see it as empty through [`Cart::is_empty`].
    pub fn remove_line(&mut self, product_id: &str) -> CoreResult<()> {
        self.ensure_editable()?;

        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() == before {
            return Err(CoreError::LineNotFound(product_id.to_string()));
        }
        Ok(())
    }

    /// Sets a line's quantity. Zero removes the line.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_line(product_id);
        }

        self.ensure_editable()?;
        validate_quantity(quantity)?;

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::LineNotFound(product_id.to_string()))?;
        line.quantity = quantity;
        Ok(())
    }

    /// Empties the cart and returns it to `Empty`.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.phase = CartPhase::Empty;
        self.created_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Σ unit_price × quantity
    pub fn total_amount(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Σ (unit_price − buy_price) × quantity
    pub fn total_profit(&self) -> Money {
        self.lines.iter().map(CartLine::line_profit).sum()
    }

    pub fn totals(&self) -> CartTotals {
        CartTotals::from(self)
    }

    // -------------------------------------------------------------------------
    // Commit protocol
    // -------------------------------------------------------------------------

    /// Enters `Committing` and returns a snapshot of the lines to sell.
    ///
    /// ## Errors
    /// - `EmptyCart` when there are no lines (phase unchanged)
    /// - `CartBusy` when a commit is already in flight
    pub fn begin_commit(&mut self) -> CoreResult<Vec<CartLine>> {
        self.ensure_editable()?;
        if self.lines.is_empty() {
            return Err(CoreError::EmptyCart);
        }
        self.phase = CartPhase::Committing;
        Ok(self.lines.clone())
    }

    /// Returns a failed commit to `Accumulating` with its lines intact.
    pub fn abort_commit(&mut self) {
        if self.phase == CartPhase::Committing {
            self.phase = CartPhase::Accumulating;
        }
    }

    /// Completes a commit: the cart is cleared back to `Empty`.
    pub fn finish_commit(&mut self) {
        self.clear();
    }

    fn ensure_editable(&self) -> CoreResult<()> {
        if self.phase == CartPhase::Committing {
            return Err(CoreError::CartBusy);
        }
        Ok(())
    }
}

// =============================================================================
// Cart Totals
// =============================================================================

/// Cart summary for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartTotals {
    pub line_count: usize,
    pub total_quantity: i64,
    pub total_amount: Money,
    pub total_profit: Money,
    pub phase: CartPhase,
}

impl From<&Cart> for CartTotals {
    fn from(cart: &Cart) -> Self {
        CartTotals {
            line_count: cart.line_count(),
            total_quantity: cart.total_quantity(),
            total_amount: cart.total_amount(),
            total_profit: cart.total_profit(),
            phase: cart.phase(),
        }
    }
}

// =============================================================================
// Sale Building
// =============================================================================

/// Stock decrements needed to sell the given lines.
pub fn stock_requests(lines: &[CartLine]) -> Vec<StockRequest> {
    lines
        .iter()
        .map(|l| StockRequest {
            product_id: l.product_id.clone(),
            quantity: l.quantity,
        })
        .collect()
}

/// Builds the immutable sale record and its items from committed lines.
///
/// `total_amount` is computed from the same line totals written to the items,
/// so the two always agree.
pub fn build_sale(
    lines: &[CartLine],
    user_id: &str,
    payment_method: PaymentMethod,
    created_at: DateTime<Utc>,
) -> SaleWithItems {
    let sale_id = new_id();

    let items: Vec<SaleItem> = lines
        .iter()
        .map(|l| SaleItem {
            id: new_id(),
            sale_id: sale_id.clone(),
            inventory_id: l.inventory_id.clone(),
            product_id: l.product_id.clone(),
            quantity: l.quantity,
            unit_price: l.unit_price,
            total_price: l.line_total(),
        })
        .collect();

    let sale = SaleRecord {
        id: sale_id,
        user_id: user_id.to_string(),
        total_amount: items.iter().map(|i| i.total_price).sum(),
        total_profit: lines.iter().map(CartLine::line_profit).sum(),
        payment_method,
        status: SaleStatus::Completed,
        created_at,
    };

    SaleWithItems { sale, items }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            category: None,
            barcode: None,
            description: None,
        }
    }

    fn inventory(product_id: &str, buy: i64, sell: i64) -> InventoryRecord {
        InventoryRecord::new(
            product_id,
            "u1",
            50,
            Money::from_cents(buy),
            Money::from_cents(sell),
        )
    }

    fn eleven_euro_cart() -> Cart {
        let mut cart = Cart::new();
        cart.add_line(&product("p1"), &inventory("p1", 100, 300), 2)
            .unwrap();
        cart.add_line(&product("p2"), &inventory("p2", 400, 500), 1)
            .unwrap();
        cart
    }

    #[test]
    fn test_totals_and_profit() {
        let cart = eleven_euro_cart();

        assert_eq!(cart.total_amount(), Money::from_cents(1100));
        // (3-1)*2 + (5-4)*1 = 5
        assert_eq!(cart.total_profit(), Money::from_cents(500));
        assert_eq!(cart.total_quantity(), 3);
        assert_eq!(cart.phase(), CartPhase::Accumulating);
    }

    #[test]
    fn test_add_same_product_merges() {
        let mut cart = Cart::new();
        let inv = inventory("p1", 100, 300);
        cart.add_line(&product("p1"), &inv, 2).unwrap();
        cart.add_line(&product("p1"), &inv, 3).unwrap();

        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.line("p1").unwrap().quantity, 5);
    }

    #[test]
    fn test_prices_frozen_at_add() {
        let mut cart = Cart::new();
        let mut inv = inventory("p1", 100, 300);
        cart.add_line(&product("p1"), &inv, 1).unwrap();

        inv.sell_price = Money::from_cents(900);
        cart.add_line(&product("p1"), &inv, 1).unwrap();

        assert_eq!(cart.total_amount(), Money::from_cents(600));
    }

    #[test]
    fn test_quantity_limits() {
        let mut cart = Cart::new();
        let inv = inventory("p1", 100, 300);

        assert!(matches!(
            cart.add_line(&product("p1"), &inv, 0),
            Err(CoreError::Validation(_))
        ));
        cart.add_line(&product("p1"), &inv, 999).unwrap();
        assert_eq!(
            cart.add_line(&product("p1"), &inv, 1),
            Err(CoreError::QuantityTooLarge {
                requested: 1000,
                max: MAX_LINE_QUANTITY
            })
        );
    }

    #[test]
    fn test_line_limit() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_LINES {
            let id = format!("p{}", i);
            cart.add_line(&product(&id), &inventory(&id, 1, 2), 1)
                .unwrap();
        }
        assert_eq!(
            cart.add_line(&product("extra"), &inventory("extra", 1, 2), 1),
            Err(CoreError::CartTooLarge { max: MAX_CART_LINES })
        );
    }

    #[test]
    fn test_remove_last_line_reports_empty() {
        let mut cart = Cart::new();
        cart.add_line(&product("p1"), &inventory("p1", 100, 300), 1)
            .unwrap();
        cart.remove_line("p1").unwrap();

        assert!(cart.is_empty());
        assert_eq!(cart.phase(), CartPhase::Accumulating);
        assert_eq!(
            cart.remove_line("p1"),
            Err(CoreError::LineNotFound("p1".to_string()))
        );
    }

    #[test]
    fn test_update_quantity_zero_removes() {
        let mut cart = eleven_euro_cart();
        cart.update_quantity("p1", 0).unwrap();
        assert_eq!(cart.line_count(), 1);

        cart.update_quantity("p2", 4).unwrap();
        assert_eq!(cart.total_amount(), Money::from_cents(2000));
    }

    #[test]
    fn test_commit_protocol() {
        let mut cart = Cart::new();
        assert_eq!(cart.begin_commit(), Err(CoreError::EmptyCart));
        assert_eq!(cart.phase(), CartPhase::Empty);

        let mut cart = eleven_euro_cart();
        let lines = cart.begin_commit().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(cart.phase(), CartPhase::Committing);
        assert_eq!(
            cart.add_line(&product("p3"), &inventory("p3", 1, 2), 1),
            Err(CoreError::CartBusy)
        );
        assert_eq!(cart.begin_commit(), Err(CoreError::CartBusy));

        cart.abort_commit();
        assert_eq!(cart.phase(), CartPhase::Accumulating);
        assert_eq!(cart.line_count(), 2);

        cart.begin_commit().unwrap();
        cart.finish_commit();
        assert!(cart.is_empty());
        assert_eq!(cart.phase(), CartPhase::Empty);
    }

    #[test]
    fn test_build_sale() {
        let cart = eleven_euro_cart();
        let built = build_sale(cart.lines(), "u1", PaymentMethod::Cash, Utc::now());

        assert_eq!(built.sale.total_amount, Money::from_cents(1100));
        assert_eq!(built.sale.total_profit, Money::from_cents(500));
        assert_eq!(built.items.len(), 2);
        assert!(built.items.iter().all(|i| i.sale_id == built.sale.id));

        let item_sum: Money = built.items.iter().map(|i| i.total_price).sum();
        assert_eq!(item_sum, built.sale.total_amount);
    }

    #[test]
    fn test_stock_requests() {
        let cart = eleven_euro_cart();
        let requests = stock_requests(cart.lines());
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].product_id, "p1");
        assert_eq!(requests[0].quantity, 2);
    }
}
