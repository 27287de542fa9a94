//! # tillbox-core: Pure Business Logic for Tillbox
//!
//! This crate is the **heart** of Tillbox. It contains the domain records,
//! money arithmetic and cart math as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tillbox Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 UI collaborators (out of scope)                 │   │
//! │  │     get current stock · enqueue a sale · request a backup       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 Terminal (apps/terminal)                        │   │
//! │  │        CartEngine commit · background sync · backups            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tillbox-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   cart    │  │ validation│  │   │
//! │  │   │ Inventory │  │   Money   │  │   Cart    │  │   rules   │  │   │
//! │  │   │   Sale    │  │           │  │ CartLine  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE • NO NETWORK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              tillbox-db (LocalStore + device storage)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, InventoryRecord, SaleRecord, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`cart`] - In-progress transaction and its totals
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tillbox_core::money::Money;
//!
//! let price = Money::from_cents(300); // €3.00
//! let line = price.multiply_quantity(2);
//! assert_eq!(line.cents(), 600);
//! assert_eq!(line.to_decimal_string(), "6.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartLine, CartPhase, CartTotals};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line in the cart.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Maximum units accepted by a single restock.
pub const MAX_RESTOCK_QUANTITY: i64 = 100_000;

/// Stock level at or below which a product is considered low on stock.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;
