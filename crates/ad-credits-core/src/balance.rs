//! Balance cache types.
//!
//! A `CreditBalance` is the denormalized running total of a user's ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Credits granted on registration unless configured otherwise.
pub const DEFAULT_WELCOME_CREDITS: i64 = 15;

/// The cached credit total for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// The user ID (from the auth provider).
    pub user_id: UserId,

    /// Current credit total. Never negative in steady state.
    pub total_credits: i64,

    /// When the balance row was created.
    pub created_at: DateTime<Utc>,

    /// When the balance was last changed.
    pub updated_at: DateTime<Utc>,
}

impl CreditBalance {
    /// Create a new balance row holding `initial_credits`.
    #[must_use]
    pub fn new(user_id: UserId, initial_credits: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            total_credits: initial_credits,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the balance covers a spend of `cost`.
    #[must_use]
    pub fn has_sufficient_credits(&self, cost: i64) -> bool {
        self.total_credits >= cost
    }

    /// Apply a signed delta and bump `updated_at`, returning the new total.
    ///
    /// Returns `None` and leaves the balance untouched if the total would overflow.
    #[must_use]
    pub fn apply(&mut self, change: i64) -> Option<i64> {
        let total = self.total_credits.checked_add(change)?;
        self.total_credits = total;
        self.updated_at = Utc::now();
        Some(total)
    }
}
