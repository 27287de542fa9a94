//! # Inventory Repository
//!
//! Stock rows, keyed by `product_id` (one owning user per device).
//!
//! Stock levels change only through [`StockManager`](crate::stock::StockManager).
//! This repository writes whole records for catalog import and price edits.

use chrono::Utc;
use tracing::debug;

use tillbox_core::validation::{validate_inventory, validate_price};
use tillbox_core::{InventoryRecord, Money};

use crate::error::{DbError, DbResult};
use crate::store::{tables, LocalStore};

#[derive(Debug, Clone)]
pub struct InventoryRepository {
    store: LocalStore,
}

impl InventoryRepository {
    pub fn new(store: LocalStore) -> Self {
        InventoryRepository { store }
    }

    pub fn get(&self, product_id: &str) -> DbResult<Option<InventoryRecord>> {
        self.store.get_record(tables::INVENTORY, product_id)
    }

    pub fn require(&self, product_id: &str) -> DbResult<InventoryRecord> {
        self.get(product_id)?
            .ok_or_else(|| DbError::not_found("Inventory", product_id))
    }

    pub fn list(&self) -> DbResult<Vec<InventoryRecord>> {
        self.store.records(tables::INVENTORY)
    }

    pub fn list_active(&self) -> DbResult<Vec<InventoryRecord>> {
        Ok(self.list()?.into_iter().filter(|r| r.is_active).collect())
    }

    /// Inserts or replaces an inventory record.
    pub fn upsert(&self, record: &InventoryRecord) -> DbResult<()> {
        validate_inventory(record)?;
        debug!(product_id = %record.product_id, stock = record.stock, "Upserting inventory");
        self.store
            .put_record(tables::INVENTORY, &record.product_id, record)
    }

    /// Changes prices without touching stock.
    pub fn set_prices(
        &self,
        product_id: &str,
        buy_price: Money,
        sell_price: Money,
    ) -> DbResult<InventoryRecord> {
        validate_price("buy_price", buy_price)?;
        validate_price("sell_price", sell_price)?;

        self.store.batch(|b| {
            let mut record: InventoryRecord = b
                .get_record(tables::INVENTORY, product_id)?
                .ok_or_else(|| DbError::not_found("Inventory", product_id))?;
            record.buy_price = buy_price;
            record.sell_price = sell_price;
            record.updated_at = Utc::now();
            b.put_record(tables::INVENTORY, product_id, &record)?;
            Ok(record)
        })
    }
}
