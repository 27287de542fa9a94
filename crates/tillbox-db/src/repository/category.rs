//! # Category Repository

use tillbox_core::validation::validate_product_name;
use tillbox_core::Category;

use crate::error::{DbError, DbResult};
use crate::store::{tables, LocalStore};

#[derive(Debug, Clone)]
pub struct CategoryRepository {
    store: LocalStore,
}

impl CategoryRepository {
    pub fn new(store: LocalStore) -> Self {
        CategoryRepository { store }
    }

    pub fn get(&self, id: &str) -> DbResult<Option<Category>> {
        self.store.get_record(tables::CATEGORIES, id)
    }

    /// All categories sorted by name.
    pub fn list(&self) -> DbResult<Vec<Category>> {
        let mut categories: Vec<Category> = self.store.records(tables::CATEGORIES)?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    pub fn upsert(&self, category: &Category) -> DbResult<()> {
        validate_product_name(&category.name)?;
        self.store
            .put_record(tables::CATEGORIES, &category.id, category)
    }

    /// Removes a category. Products keep their now-dangling reference.
    pub fn delete(&self, id: &str) -> DbResult<()> {
        if !self.store.del_row(tables::CATEGORIES, id) {
            return Err(DbError::not_found("Category", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_sorted() {
        let repo = CategoryRepository::new(LocalStore::new());
        for (id, name) in [("c1", "Snacks"), ("c2", "Coffee")] {
            repo.upsert(&Category {
                id: id.into(),
                name: name.into(),
            })
            .unwrap();
        }

        let names: Vec<String> = repo.list().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Coffee", "Snacks"]);

        repo.delete("c1").unwrap();
        assert!(matches!(repo.delete("c1"), Err(DbError::NotFound { .. })));
    }
}
