//! Error types for the wallet ledger

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Amount is zero or negative
    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(Decimal),

    /// Arithmetic would leave the representable range
    #[error("Amount overflow: {0}")]
    Overflow(String),

    /// Spend or transfer exceeds the available balance
    #[error("Insufficient balance for {user_id}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        /// Wallet owner
        user_id: String,
        /// Balance at the time of the check
        balance: Decimal,
        /// Requested amount
        requested: Decimal,
    },

    /// Operation requires a wallet that does not exist
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// Sliding-window quota exceeded
    #[error("Rate limit exceeded for user: {0}")]
    RateLimited(String),

    /// Wallet lock could not be acquired in time
    #[error("Wallet busy: {0}")]
    Busy(String),

    /// Versioned write lost against a concurrent writer
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Request is missing a required field
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Transfer request is malformed (e.g. sender equals recipient)
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    /// Imported wallet data is inconsistent
    #[error("Invalid wallet data: {0}")]
    InvalidWallet(String),

    /// Invariant violation (conservation, non-negativity)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Metrics export error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code, used in service responses and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidAmount(_) => "invalid_amount",
            Error::Overflow(_) => "overflow",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::WalletNotFound(_) => "wallet_not_found",
            Error::RateLimited(_) => "rate_limited",
            Error::Busy(_) => "busy",
            Error::Conflict(_) => "conflict",
            Error::InvalidRequest(_) => "invalid_request",
            Error::InvalidTransfer(_) => "invalid_transfer",
            Error::InvalidWallet(_) => "invalid_wallet",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Json(_) => "json",
            Error::Metrics(_) => "metrics",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }

    /// Business-rule rejection the caller can act on
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Error::InvalidAmount(_)
                | Error::Overflow(_)
                | Error::InsufficientBalance { .. }
                | Error::WalletNotFound(_)
                | Error::RateLimited(_)
                | Error::InvalidRequest(_)
                | Error::InvalidTransfer(_)
                | Error::InvalidWallet(_)
        )
    }

    /// Whether repeating the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Busy(_) | Error::Conflict(_) | Error::RateLimited(_) | Error::Storage(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
