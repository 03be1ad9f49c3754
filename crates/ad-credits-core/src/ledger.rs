//! Credit ledger entries.
//!
//! Every change to a balance is recorded as an immutable, signed ledger entry.
//! The ledger is the audit source of truth; the balance cache is derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntryId, UserId};

/// Well-known ledger reasons that are not cost-table actions.
pub mod reasons {
    /// Credits granted when a user first registers.
    pub const WELCOME_CREDITS: &str = "welcome_credits";

    /// Compensation for a paid action that failed after deduction.
    pub const CREDIT_REFUND: &str = "credit_refund";

    /// Credits bought through checkout.
    pub const CREDIT_PURCHASE: &str = "credit_purchase";

    /// Promotional credits.
    pub const BONUS_CREDITS: &str = "bonus_credits";
}

/// A single append-only change to a user's credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub id: EntryId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Signed delta. Positive = credit added, negative = credit spent.
    pub change: i64,

    /// Action or category the change is attributed to.
    pub reason: String,

    /// Free-text reference (campaign id, ad id, original entry id).
    pub ref_id: Option<String>,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl CreditLedgerEntry {
    fn new(user_id: UserId, change: i64, reason: String, ref_id: Option<String>) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            change,
            reason,
            ref_id,
            created_at: Utc::now(),
        }
    }

    /// Create a spend for a paid action.
    #[must_use]
    pub fn debit(
        user_id: UserId,
        action: impl Into<String>,
        cost: i64,
        ref_id: Option<String>,
    ) -> Self {
        Self::new(user_id, -cost.abs(), action.into(), ref_id) // Always negative
    }

    /// Create a compensating refund.
    #[must_use]
    pub fn refund(user_id: UserId, amount: i64, ref_id: Option<String>) -> Self {
        Self::new(
            user_id,
            amount.abs(),
            reasons::CREDIT_REFUND.to_string(),
            ref_id,
        )
    }

    /// Create a grant (welcome, purchase or bonus credits).
    #[must_use]
    pub fn grant(
        user_id: UserId,
        amount: i64,
        reason: impl Into<String>,
        ref_id: Option<String>,
    ) -> Self {
        Self::new(user_id, amount.abs(), reason.into(), ref_id)
    }

    /// Credits required to apply this entry (zero for credits).
    #[must_use]
    pub const fn required_credits(&self) -> i64 {
        if self.change < 0 {
            -self.change
        } else {
            0
        }
    }

    /// Whether this entry spends credits.
    #[must_use]
    pub const fn is_spend(&self) -> bool {
        self.change < 0
    }

    /// Whether this entry adds credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        self.change > 0
    }
}
