//! # Error Types
//!
//! Domain-specific error types for tillbox-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tillbox-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tillbox-db errors                                                     │
//! │  └── DbError          - Store, device storage and backup failures      │
//! │                                                                         │
//! │  tillbox-sync errors                                                   │
//! │  └── SyncError        - Remote mutation failures (retried)             │
//! │                                                                         │
//! │  terminal app                                                          │
//! │  └── SaleOutcome      - What the UI sees (never an error)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SaleOutcome → UI        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These represent business rule violations. None of them leave partial state
/// behind: an operation that returns one of these changed nothing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Product cannot be found in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// No inventory row exists for the product.
    #[error("No inventory for product {0}")]
    InventoryNotFound(String),

    /// Insufficient stock to complete the sale.
    ///
    /// ## When This Occurs
    /// - Selling more than the current stock
    /// - A cart line passed the check when added, but stock dropped since
    ///
    /// ## User Workflow
    /// ```text
    /// Complete sale (p1 qty: 5)
    ///      │
    ///      ▼
    /// can_sell(p1, 5): stock=3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: "p1", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Cart untouched, UI shows "Only 3 in stock"
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Commit was requested on a cart with no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// The cart is mid-commit and cannot be changed.
    #[error("Cart is committing, try again")]
    CartBusy,

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// No cart line for the product.
    #[error("Product {0} is not in the cart")]
    LineNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before business logic runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} cannot be negative")]
    Negative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid barcode).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p1".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for p1: available 3, requested 5"
        );
        assert_eq!(CoreError::EmptyCart.to_string(), "Cart is empty");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
