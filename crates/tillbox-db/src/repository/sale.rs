//! # Sale Repository
//!
//! Committed sales and their line items. Both are immutable once written.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert(SaleWithItems)                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────── one store batch ──────────────────────────┐     │
//! │  │  sales/<sale.id>        ◄── SaleRecord                        │     │
//! │  │  sale_items/<item.id>   ◄── SaleItem × n                      │     │
//! │  └───────────────────────────────────────────────────────────────┘     │
//! │                                                                         │
//! │  Readers never see a sale without its items.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::Value;
use tracing::debug;

use tillbox_core::{SaleItem, SaleRecord, SaleWithItems};

use crate::error::DbResult;
use crate::store::{decode_row, tables, LocalStore, StoreBatch};

#[derive(Debug, Clone)]
pub struct SaleRepository {
    store: LocalStore,
}

impl SaleRepository {
    pub fn new(store: LocalStore) -> Self {
        SaleRepository { store }
    }

    /// Writes a sale and all of its items atomically.
    pub fn insert(&self, sale: &SaleWithItems) -> DbResult<()> {
        debug!(
            sale_id = %sale.sale.id,
            items = sale.items.len(),
            "Writing sale"
        );

        self.store.batch(|b| stage_sale(b, sale))
    }

    pub fn exists(&self, sale_id: &str) -> bool {
        self.store.has_row(tables::SALES, sale_id)
    }

    pub fn get(&self, sale_id: &str) -> DbResult<Option<SaleRecord>> {
        self.store.get_record(tables::SALES, sale_id)
    }

    pub fn get_with_items(&self, sale_id: &str) -> DbResult<Option<SaleWithItems>> {
        let Some(sale) = self.get(sale_id)? else {
            return Ok(None);
        };
        let items = self.items_for(sale_id)?;
        Ok(Some(SaleWithItems { sale, items }))
    }

    /// Items belonging to a sale.
    pub fn items_for(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let wanted = Value::String(sale_id.to_string());
        self.store
            .get_table(tables::SALE_ITEMS)
            .into_iter()
            .filter(|(_, row)| row.get("sale_id") == Some(&wanted))
            .map(|(row_id, row)| decode_row(tables::SALE_ITEMS, &row_id, row))
            .collect()
    }

    /// All sales, newest first.
    pub fn list(&self) -> DbResult<Vec<SaleRecord>> {
        let mut sales: Vec<SaleRecord> = self.store.records(tables::SALES)?;
        sales.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sales)
    }

    pub fn count(&self) -> usize {
        self.store.row_count(tables::SALES)
    }
}

/// Writes the sale row and its item rows inside an open batch.
pub(crate) fn stage_sale(b: &mut StoreBatch<'_>, sale: &SaleWithItems) -> DbResult<()> {
    b.put_record(tables::SALES, &sale.sale.id, &sale.sale)?;
    for item in &sale.items {
        b.put_record(tables::SALE_ITEMS, &item.id, item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tillbox_core::cart::build_sale;
    use tillbox_core::{CartLine, Money, PaymentMethod};

    fn sample() -> SaleWithItems {
        let lines = vec![
            CartLine {
                product_id: "p1".into(),
                inventory_id: "inv1".into(),
                name: "One".into(),
                unit_price: Money::from_cents(300),
                buy_price: Money::from_cents(100),
                quantity: 2,
            },
            CartLine {
                product_id: "p2".into(),
                inventory_id: "inv2".into(),
                name: "Two".into(),
                unit_price: Money::from_cents(500),
                buy_price: Money::from_cents(400),
                quantity: 1,
            },
        ];
        build_sale(&lines, "u1", PaymentMethod::Cash, Utc::now())
    }

    #[test]
    fn test_insert_and_read_back() {
        let store = LocalStore::new();
        let repo = SaleRepository::new(store.clone());
        let sale = sample();

        repo.insert(&sale).unwrap();

        assert!(repo.exists(&sale.sale.id));
        assert_eq!(store.row_count(tables::SALE_ITEMS), 2);

        let back = repo.get_with_items(&sale.sale.id).unwrap().unwrap();
        assert_eq!(back.sale, sale.sale);
        assert_eq!(back.items.len(), 2);

        let item_sum: Money = back.items.iter().map(|i| i.total_price).sum();
        assert_eq!(item_sum, back.sale.total_amount);
    }

    #[test]
    fn test_items_filtered_by_sale() {
        let repo = SaleRepository::new(LocalStore::new());
        let a = sample();
        let b = sample();
        repo.insert(&a).unwrap();
        repo.insert(&b).unwrap();

        assert_eq!(repo.count(), 2);
        assert_eq!(repo.items_for(&a.sale.id).unwrap().len(), 2);
        assert!(repo.get_with_items("missing").unwrap().is_none());
    }
}
