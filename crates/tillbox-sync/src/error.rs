//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Remote              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  Rejected (HTTP status) │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  InvalidPayload         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Storage      │  │     Queue       │                              │
//! │  │                 │  │                 │                              │
//! │  │  DatabaseError  │  │  ItemNotFound   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid backend URL.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The backend could not be reached.
    ///
    /// ## When This Occurs
    /// - Device is offline
    /// - DNS failure, refused connection, TLS failure
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The backend answered with a non-success status.
    #[error("Backend rejected mutation (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// A queued payload no longer decodes into its mutation kind.
    #[error("Invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },

    /// Failed to serialize a mutation.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local store or device storage failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Queue Errors
    // =========================================================================
    /// No queue item or dead letter with this id.
    #[error("Sync item not found: {0}")]
    ItemNotFound(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal sync error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<tillbox_db::DbError> for SyncError {
    fn from(err: tillbox_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if a later attempt of the same mutation may succeed.
    ///
    /// ## Retryable Errors
    /// - Connection failures and timeouts
    /// - HTTP 408, 429 and 5xx
    ///
    /// ## Non-Retryable Errors
    /// - Other HTTP 4xx (the backend refuses this payload)
    /// - Configuration and payload errors
    ///
    /// The queue still retries every failure up to the item's limit; this
    /// only decides how loudly a failure is logged.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_) | SyncError::Timeout(_) => true,
            SyncError::Rejected { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(self, SyncError::InvalidConfig(_) | SyncError::InvalidUrl(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());
        assert!(SyncError::Rejected {
            status: 503,
            message: "down".into()
        }
        .is_retryable());
        assert!(SyncError::Rejected {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());

        assert!(!SyncError::Rejected {
            status: 409,
            message: "duplicate key".into()
        }
        .is_retryable());
        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::InvalidUrl("ftp://x".into()).is_config_error());
        assert!(!SyncError::Timeout(1).is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::Rejected {
            status: 400,
            message: "column \"foo\" does not exist".into(),
        };
        assert!(err.to_string().contains("HTTP 400"));
        assert!(err.to_string().contains("foo"));
    }
}
