//! # Terminal Error Type
//!
//! Unified error type for terminal operations.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Terminal                           │
//! │                                                                         │
//! │  CoreError ──┐                                                         │
//! │  DbError ────┼──► TerminalError ──┬──► complete_sale: SaleOutcome      │
//! │  SyncError ──┘                    │    (never an error at the UI)      │
//! │                                   │                                     │
//! │                                   └──► backup / restore / startup:      │
//! │                                        propagated to the caller         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use tillbox_core::CoreError;
use tillbox_db::DbError;
use tillbox_sync::SyncError;

pub type TerminalResult<T> = Result<T, TerminalError>;

#[derive(Debug, Error)]
pub enum TerminalError {
    /// Configuration could not be loaded or is invalid.
    ///
    /// ## When This Occurs
    /// - Malformed `terminal.toml`
    /// - Online mode without a backend URL
    /// - No platform data directory and no `[storage] data_dir`
    #[error("Configuration error: {0}")]
    Config(String),

    /// A business rule rejected the operation.
    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TerminalError {
    /// The business-rule error behind this one, wherever it was raised.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            TerminalError::Domain(e) => Some(e),
            TerminalError::Db(e) => e.as_domain(),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for TerminalError {
    fn from(err: toml::de::Error) -> Self {
        TerminalError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TerminalError {
    fn from(err: toml::ser::Error) -> Self {
        TerminalError::Config(err.to_string())
    }
}
