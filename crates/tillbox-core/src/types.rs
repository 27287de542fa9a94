//! # Domain Types
//!
//! Records stored in the local store and shipped to the backend.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │ InventoryRecord │   │   SaleRecord    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  product_id     │   │  id (UUID)      │       │
//! │  │  name           │   │  stock ≥ 0      │   │  total_amount   │       │
//! │  │  barcode        │   │  buy/sell price │   │  total_profit   │       │
//! │  └─────────────────┘   └─────────────────┘   └────────┬────────┘       │
//! │                                                       │ 1..n           │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌────────▼────────┐       │
//! │  │ StockAdjustment │   │   DailyMetric   │   │    SaleItem     │       │
//! │  │  old → new      │   │  per YYYY-MM-DD │   │  frozen prices  │       │
//! │  │  sale | restock │   │                 │   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every record carries a UUID v4 `id` generated on the device, so records can
//! be created offline and mirrored to the backend without coordination.
//! Inventory is the exception in lookups: it is keyed by `product_id` because a
//! device owns exactly one inventory row per product.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;

/// Generates a fresh record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Catalog
// =============================================================================

/// A catalog grouping for products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// A product in the catalog.
///
/// Products are never deleted while sale items still reference them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Category id, if the product is grouped.
    #[serde(default)]
    pub category: Option<String>,

    /// Barcode (EAN-13, UPC-A, etc.).
    #[serde(default)]
    pub barcode: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

// =============================================================================
// Inventory
// =============================================================================

/// The stock level and prices of one product on this device.
///
/// ## Invariants
/// - `stock` is never negative
/// - Only StockManager writes `stock` during normal operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryRecord {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub stock: i64,
    /// Purchase cost per unit.
    pub buy_price: Money,
    /// Shelf price per unit.
    pub sell_price: Money,
    pub is_active: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Creates an active inventory record with a fresh id.
    pub fn new(
        product_id: impl Into<String>,
        user_id: impl Into<String>,
        stock: i64,
        buy_price: Money,
        sell_price: Money,
    ) -> Self {
        InventoryRecord {
            id: new_id(),
            product_id: product_id.into(),
            user_id: user_id.into(),
            stock,
            buy_price,
            sell_price,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    /// Margin earned on one unit at current prices.
    #[inline]
    pub fn unit_margin(&self) -> Money {
        self.sell_price - self.buy_price
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// The status of a recorded sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Sale has been paid and finalized.
    #[default]
    Completed,
    /// Sale was refunded after completion.
    Refunded,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "completed",
            SaleStatus::Refunded => "refunded",
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    #[default]
    Cash,
    /// Card payment on an external terminal.
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale. Immutable once written.
///
/// `total_amount` always equals the sum of its items' `total_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRecord {
    pub id: String,
    pub user_id: String,
    pub total_amount: Money,
    pub total_profit: Money,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleRecord {
    /// Calendar day the sale belongs to, as used for daily metrics.
    pub fn business_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

/// A line item in a sale.
/// Prices are frozen at the moment the line was added to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub inventory_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
    /// unit_price × quantity
    pub total_price: Money,
}

/// A sale together with its line items.
///
/// This is the shape kept in the recovery log: everything needed to rebuild
/// the sale in the store if the device dies before the next backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleWithItems {
    #[serde(flatten)]
    #[ts(flatten)]
    pub sale: SaleRecord,
    pub items: Vec<SaleItem>,
}

impl SaleWithItems {
    /// Total units across all lines.
    pub fn items_sold(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

// =============================================================================
// Stock Adjustments
// =============================================================================

/// Why a stock level changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    Sale,
    Restock,
}

/// Append-only audit row written for every sell and restock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdjustmentRecord {
    pub id: String,
    pub product_id: String,
    pub old_stock: i64,
    pub new_stock: i64,
    pub reason: AdjustmentReason,
    /// Sale that caused the change, for adjustments written with their sale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub sale_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Result of one applied stock mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockChange {
    pub product_id: String,
    pub old_stock: i64,
    pub new_stock: i64,
}

/// A requested decrement in a batch sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRequest {
    pub product_id: String,
    pub quantity: i64,
}

// =============================================================================
// Daily Metrics
// =============================================================================

/// Running totals for one business day, keyed by `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailyMetric {
    pub date: String,
    pub total_sales: Money,
    pub total_profit: Money,
    pub transaction_count: i64,
    pub items_sold: i64,
}

impl DailyMetric {
    pub fn empty(date: NaiveDate) -> Self {
        DailyMetric {
            date: date.format("%Y-%m-%d").to_string(),
            total_sales: Money::zero(),
            total_profit: Money::zero(),
            transaction_count: 0,
            items_sold: 0,
        }
    }

    /// Folds one committed sale into the day's totals.
    pub fn record_sale(&mut self, sale: &SaleWithItems) {
        self.total_sales += sale.sale.total_amount;
        self.total_profit += sale.sale.total_profit;
        self.transaction_count += 1;
        self.items_sold += sale.items_sold();
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sale() -> SaleWithItems {
        let sale = SaleRecord {
            id: "s1".into(),
            user_id: "u1".into(),
            total_amount: Money::from_cents(1100),
            total_profit: Money::from_cents(400),
            payment_method: PaymentMethod::Cash,
            status: SaleStatus::Completed,
            created_at: Utc::now(),
        };
        let items = vec![
            SaleItem {
                id: "i1".into(),
                sale_id: "s1".into(),
                inventory_id: "inv1".into(),
                product_id: "p1".into(),
                quantity: 2,
                unit_price: Money::from_cents(300),
                total_price: Money::from_cents(600),
            },
            SaleItem {
                id: "i2".into(),
                sale_id: "s1".into(),
                inventory_id: "inv2".into(),
                product_id: "p2".into(),
                quantity: 1,
                unit_price: Money::from_cents(500),
                total_price: Money::from_cents(500),
            },
        ];
        SaleWithItems { sale, items }
    }

    #[test]
    fn test_sale_status_default() {
        assert_eq!(SaleStatus::default(), SaleStatus::Completed);
        assert_eq!(SaleStatus::Completed.as_str(), "completed");
    }

    #[test]
    fn test_sale_with_items_flattens() {
        let sale = sample_sale();
        let value = serde_json::to_value(&sale).unwrap();
        assert_eq!(value["id"], "s1");
        assert_eq!(value["total_amount"], 1100);
        assert_eq!(value["payment_method"], "cash");
        assert_eq!(value["items"].as_array().unwrap().len(), 2);

        let back: SaleWithItems = serde_json::from_value(value).unwrap();
        assert_eq!(back, sale);
    }

    #[test]
    fn test_daily_metric_record_sale() {
        let sale = sample_sale();
        let mut metric = DailyMetric::empty(sale.sale.business_date());
        metric.record_sale(&sale);
        metric.record_sale(&sale);

        assert_eq!(metric.total_sales, Money::from_cents(2200));
        assert_eq!(metric.total_profit, Money::from_cents(800));
        assert_eq!(metric.transaction_count, 2);
        assert_eq!(metric.items_sold, 6);
        assert_eq!(metric.date.len(), 10);
    }

    #[test]
    fn test_inventory_unit_margin() {
        let inv = InventoryRecord::new("p1", "u1", 10, Money::from_cents(100), Money::from_cents(300));
        assert_eq!(inv.unit_margin(), Money::from_cents(200));
        assert!(inv.is_active);
    }
}
