//! # Stock Adjustment Repository
//!
//! Read side of the append-only `stock_updates` audit log. Rows are written by
//! [`StockManager`](crate::stock::StockManager) inside the same batch as the
//! stock change they describe.

use serde_json::Value;

use tillbox_core::StockAdjustmentRecord;

use crate::error::DbResult;
use crate::store::{decode_row, tables, LocalStore};

#[derive(Debug, Clone)]
pub struct StockAdjustmentRepository {
    store: LocalStore,
}

impl StockAdjustmentRepository {
    pub fn new(store: LocalStore) -> Self {
        StockAdjustmentRepository { store }
    }

    /// Whole log, oldest first.
    pub fn list(&self) -> DbResult<Vec<StockAdjustmentRecord>> {
        let mut records: Vec<StockAdjustmentRecord> = self.store.records(tables::STOCK_UPDATES)?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Log entries for one product, oldest first.
    pub fn for_product(&self, product_id: &str) -> DbResult<Vec<StockAdjustmentRecord>> {
        let wanted = Value::String(product_id.to_string());
        let mut records = self
            .store
            .get_table(tables::STOCK_UPDATES)
            .into_iter()
            .filter(|(_, row)| row.get("product_id") == Some(&wanted))
            .map(|(row_id, row)| decode_row(tables::STOCK_UPDATES, &row_id, row))
            .collect::<DbResult<Vec<StockAdjustmentRecord>>>()?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Whether the log already holds adjustments written for a sale.
    pub fn has_sale(&self, sale_id: &str) -> bool {
        let wanted = Value::String(sale_id.to_string());
        self.store
            .get_table(tables::STOCK_UPDATES)
            .values()
            .any(|row| row.get("sale_id") == Some(&wanted))
    }

    pub fn count(&self) -> usize {
        self.store.row_count(tables::STOCK_UPDATES)
    }
}
