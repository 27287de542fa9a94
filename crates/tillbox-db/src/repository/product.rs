//! # Product Repository
//!
//! Catalog records.
//!
//! ## Deletion Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  delete("p1")                                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  any sale_items row with product_id = "p1"?                            │
//! │       │                                                                 │
//! │       ├── yes → DbError::InUse (history must keep resolving)           │
//! │       │                                                                 │
//! │       └── no  → product row and its inventory row removed              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::Value;
use tracing::info;

use tillbox_core::validation::{validate_barcode, validate_product_name};
use tillbox_core::Product;

use crate::error::{DbError, DbResult};
use crate::store::{tables, LocalStore};

/// Typed access to the `products` table.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(store.clone());
/// let product = repo.find_by_barcode("5901234123457")?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    store: LocalStore,
}

impl ProductRepository {
    pub fn new(store: LocalStore) -> Self {
        ProductRepository { store }
    }

    pub fn get(&self, id: &str) -> DbResult<Option<Product>> {
        self.store.get_record(tables::PRODUCTS, id)
    }

    /// Gets a product or fails with `NotFound`.
    pub fn require(&self, id: &str) -> DbResult<Product> {
        self.get(id)?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// All products sorted by name.
    pub fn list(&self) -> DbResult<Vec<Product>> {
        let mut products: Vec<Product> = self.store.records(tables::PRODUCTS)?;
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    pub fn find_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        Ok(self
            .store
            .records::<Product>(tables::PRODUCTS)?
            .into_iter()
            .find(|p| p.barcode.as_deref() == Some(barcode)))
    }

    /// Inserts or replaces a product after validating name and barcode.
    pub fn upsert(&self, product: &Product) -> DbResult<()> {
        validate_product_name(&product.name)?;
        if let Some(barcode) = &product.barcode {
            validate_barcode(barcode)?;
        }
        self.store.put_record(tables::PRODUCTS, &product.id, product)
    }

    /// Removes a product and its inventory row.
    ///
    /// ## Errors
    /// - `InUse` if any sale item references the product
    /// - `NotFound` if there is no such product
    pub fn delete(&self, id: &str) -> DbResult<()> {
        let referenced = self
            .store
            .get_table(tables::SALE_ITEMS)
            .values()
            .any(|row| row.get("product_id") == Some(&Value::String(id.to_string())));
        if referenced {
            return Err(DbError::InUse {
                entity: "Product".to_string(),
                id: id.to_string(),
            });
        }

        if !self.store.del_row(tables::PRODUCTS, id) {
            return Err(DbError::not_found("Product", id));
        }
        self.store.del_row(tables::INVENTORY, id);

        info!(product_id = %id, "Product deleted");
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.store.row_count(tables::PRODUCTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product(id: &str, name: &str, barcode: Option<&str>) -> Product {
        Product {
            id: id.into(),
            name: name.into(),
            category: None,
            barcode: barcode.map(Into::into),
            description: None,
        }
    }

    #[test]
    fn test_upsert_and_lookup() {
        let repo = ProductRepository::new(LocalStore::new());
        repo.upsert(&product("p1", "Beans", Some("96385074"))).unwrap();
        repo.upsert(&product("p2", "Apples", None)).unwrap();

        assert_eq!(repo.count(), 2);
        assert_eq!(repo.list().unwrap()[0].name, "Apples");
        assert_eq!(
            repo.find_by_barcode("96385074").unwrap().unwrap().id,
            "p1"
        );
        assert!(matches!(repo.require("zz"), Err(DbError::NotFound { .. })));
    }

    #[test]
    fn test_upsert_rejects_bad_input() {
        let repo = ProductRepository::new(LocalStore::new());
        assert!(matches!(
            repo.upsert(&product("p1", "", None)),
            Err(DbError::Domain(_))
        ));
        assert!(repo.upsert(&product("p1", "Beans", Some("abc"))).is_err());
        assert_eq!(repo.count(), 0);
    }

    #[test]
    fn test_delete_refuses_referenced_product() {
        let store = LocalStore::new();
        let repo = ProductRepository::new(store.clone());
        repo.upsert(&product("p1", "Beans", None)).unwrap();
        store.set_row(
            tables::SALE_ITEMS,
            "i1",
            json!({"product_id": "p1"}).as_object().cloned().unwrap(),
        );

        assert!(matches!(repo.delete("p1"), Err(DbError::InUse { .. })));
        assert!(repo.get("p1").unwrap().is_some());

        store.del_row(tables::SALE_ITEMS, "i1");
        repo.delete("p1").unwrap();
        assert!(repo.get("p1").unwrap().is_none());
    }
}
