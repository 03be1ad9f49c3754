//! Error types for ad-credits storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// Record already exists.
    #[error("already exists")]
    AlreadyExists,

    /// Insufficient credits for deduction.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Idempotency key already used.
    #[error("duplicate key: {key}")]
    DuplicateKey {
        /// The key that was reused.
        key: String,
    },

    /// Applying the change would overflow the balance.
    #[error("balance overflow: balance={balance}, change={change}")]
    BalanceOverflow {
        /// Current balance.
        balance: i64,
        /// Rejected change.
        change: i64,
    },
}
