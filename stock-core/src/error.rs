//! Error types for the inventory core

use crate::guardrail::AllocationBreach;
use crate::sanitize::SanitizationError;
use thiserror::Error;

/// Result type for inventory operations
pub type Result<T> = std::result::Result<T, Error>;

/// Inventory errors
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced item code does not exist
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Item creation with a code that already exists
    #[error("Duplicate item code: {0}")]
    DuplicateCode(String),

    /// Negative threshold or ceiling below threshold
    #[error("Invalid threshold: min_threshold={min_threshold}, max_ceiling={max_ceiling}")]
    InvalidThreshold {
        /// Requested minimum threshold
        min_threshold: i64,
        /// Requested maximum ceiling
        max_ceiling: i64,
    },

    /// Dispatch would consume reserved stock
    #[error("Allocation breach: {0}")]
    AllocationBreach(AllocationBreach),

    /// Resulting stock would go below zero
    #[error("Negative stock result: current_stock={current_stock}, quantity_change={quantity_change}")]
    NegativeStockResult {
        /// Stock on hand when the mutation was evaluated
        current_stock: i64,
        /// Requested change
        quantity_change: i64,
    },

    /// Principal lacks the role required for the operation
    #[error("Forbidden: {principal} may not {operation}")]
    Forbidden {
        /// Principal id
        principal: String,
        /// Operation name
        operation: &'static str,
    },

    /// Malformed mutation or allocation request
    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),

    /// Free-text or code input rejected by the sanitizer
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] SanitizationError),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for business-rule rejections the caller should present to the user,
    /// false for infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::ItemNotFound(_)
                | Error::DuplicateCode(_)
                | Error::InvalidThreshold { .. }
                | Error::AllocationBreach(_)
                | Error::NegativeStockResult { .. }
                | Error::Forbidden { .. }
                | Error::InvalidMutation(_)
                | Error::InvalidInput(_)
        )
    }

    /// Breach breakdown, if this is an allocation breach
    pub fn allocation_breach(&self) -> Option<&AllocationBreach> {
        match self {
            Error::AllocationBreach(breach) => Some(breach),
            _ => None,
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breach_is_rejection() {
        let err = Error::AllocationBreach(AllocationBreach {
            current_stock: 10,
            allocated_stock: 5,
            available_for_use: 5,
            requested_change: 6,
        });
        assert!(err.is_rejection());
        assert_eq!(err.allocation_breach().unwrap().requested_change, 6);
    }

    #[test]
    fn test_storage_is_not_rejection() {
        let err = Error::Storage("disk full".to_string());
        assert!(!err.is_rejection());
        assert!(err.allocation_breach().is_none());
    }

    #[test]
    fn test_forbidden_message() {
        let err = Error::Forbidden {
            principal: "staff-1".to_string(),
            operation: "read transaction history",
        };
        assert_eq!(err.to_string(), "Forbidden: staff-1 may not read transaction history");
    }
}
