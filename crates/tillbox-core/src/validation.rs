//! # Validation Module
//!
//! Input validation utilities for Tillbox.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI collaborators                                             │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Cart / StockManager (Rust)                                   │
//! │  └── THIS MODULE: quantities, prices, identifiers                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Stock invariants                                             │
//! │  └── stock ≥ quantity re-checked at write time                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tillbox_core::validation::{validate_barcode, validate_quantity};
//!
//! validate_barcode("5901234123457").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::InventoryRecord;
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY, MAX_RESTOCK_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty
/// - Must be between 1 and 200 characters
///
/// ## Example
/// ```rust
/// use tillbox_core::validation::validate_product_name;
///
/// assert!(validate_product_name("Espresso Beans 1kg").is_ok());
/// assert!(validate_product_name("").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a barcode.
///
/// ## Rules
/// - Digits only
/// - 8 to 14 digits (EAN-8 through GTIN-14)
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();

    if barcode.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if !barcode.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must contain only digits".to_string(),
        });
    }

    if !(8..=14).contains(&barcode.len()) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must be 8 to 14 digits".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Cart: Add Line                                                         │
/// │                                                                         │
/// │  Cashier enters quantity: 5                                            │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(5) ← THIS FUNCTION                                  │
/// │       │                                                                 │
/// │       ├── qty <= 0? → Error: "quantity must be positive"               │
/// │       │                                                                 │
/// │       ├── qty > 999? → Error: "quantity must be between 1 and 999"     │
/// │       │                                                                 │
/// │       └── OK → Proceed with add_line                                   │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    validate_positive("quantity", qty)?;

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a quantity passed to a stock mutation.
pub fn validate_positive(field: &str, qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a restock quantity.
///
/// ## Rules
/// - Must be positive
/// - Must not exceed MAX_RESTOCK_QUANTITY
pub fn validate_restock_quantity(qty: i64) -> ValidationResult<()> {
    validate_positive("restock quantity", qty)?;

    if qty > MAX_RESTOCK_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "restock quantity".to_string(),
            min: 1,
            max: MAX_RESTOCK_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price.
///
/// ## Example
/// ```rust
/// use tillbox_core::money::Money;
/// use tillbox_core::validation::validate_price;
///
/// assert!(validate_price("sell_price", Money::from_cents(1099)).is_ok());
/// assert!(validate_price("sell_price", Money::zero()).is_ok());
/// assert!(validate_price("sell_price", Money::from_cents(-100)).is_err());
/// ```
pub fn validate_price(field: &str, price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates cart size before adding a new distinct line.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 0,
            max: MAX_CART_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Record Validators
// =============================================================================

/// Validates an inventory record before it is written by an import or restore.
pub fn validate_inventory(record: &InventoryRecord) -> ValidationResult<()> {
    if record.product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "product_id".to_string(),
        });
    }

    if record.stock < 0 {
        return Err(ValidationError::Negative {
            field: "stock".to_string(),
        });
    }

    validate_price("buy_price", record.buy_price)?;
    validate_price("sell_price", record.sell_price)?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_product_name() {
        assert!(validate_product_name("Espresso Beans 1kg").is_ok());
        assert!(validate_product_name("").is_err());
        assert!(validate_product_name("   ").is_err());
        assert!(validate_product_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("5901234123457").is_ok());
        assert!(validate_barcode("96385074").is_ok());
        assert!(validate_barcode("").is_err());
        assert!(validate_barcode("12ab5678").is_err());
        assert!(validate_barcode("1234").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_restock_quantity() {
        assert!(validate_restock_quantity(5000).is_ok());
        assert!(validate_restock_quantity(0).is_err());
        assert!(validate_restock_quantity(MAX_RESTOCK_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(0).is_ok());
        assert!(validate_cart_size(MAX_CART_LINES - 1).is_ok());
        assert!(validate_cart_size(MAX_CART_LINES).is_err());
    }

    #[test]
    fn test_validate_inventory() {
        let mut inv =
            InventoryRecord::new("p1", "u1", 5, Money::from_cents(100), Money::from_cents(200));
        assert!(validate_inventory(&inv).is_ok());

        inv.stock = -1;
        assert_eq!(
            validate_inventory(&inv),
            Err(ValidationError::Negative {
                field: "stock".to_string()
            })
        );
    }
}
