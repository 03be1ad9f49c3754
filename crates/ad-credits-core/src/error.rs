//! Error types for ad-credits.

use crate::ids::IdError;

/// Result type for credit operations.
pub type Result<T> = std::result::Result<T, CreditError>;

/// Errors that can occur in credit operations.
#[derive(Debug, thiserror::Error)]
pub enum CreditError {
    /// Insufficient credits for the operation.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// No balance row exists for the user.
    #[error("account not found: {user_id}")]
    AccountNotFound {
        /// The user ID that was not found.
        user_id: String,
    },

    /// A balance row already exists for the user.
    #[error("account already exists: {user_id}")]
    AccountAlreadyExists {
        /// The user ID that already exists.
        user_id: String,
    },

    /// The action has no entry in the cost table.
    #[error("unknown action: {action}")]
    UnknownAction {
        /// The action that was looked up.
        action: String,
    },

    /// Invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A refund for the same original debit was already issued.
    #[error("duplicate refund: {key}")]
    DuplicateRefund {
        /// The reference the refund was keyed on.
        key: String,
    },

    /// The refund does not match the debit it references.
    #[error("invalid refund: {0}")]
    InvalidRefund(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
