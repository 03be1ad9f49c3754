//! Request and response types for the ad-credits client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Registration response.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Balance after welcome credits.
    pub total_credits: i64,
    /// Created timestamp.
    pub created_at: String,
}

/// Balance response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Current balance in credits.
    pub total_credits: i64,
    /// Last update timestamp.
    pub updated_at: String,
}

/// Cost table response.
#[derive(Debug, Clone, Deserialize)]
pub struct CostsResponse {
    /// Credits charged per action.
    pub costs: BTreeMap<String, i64>,
}

/// Consume request.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumeRequest {
    /// Action about to be performed.
    pub action: String,
    /// Campaign or ad the action is for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
}

/// Consume response.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumeResponse {
    /// Whether credits were deducted.
    pub success: bool,
    /// Ledger entry recording the spend.
    pub entry_id: String,
    /// Credits deducted.
    pub cost: i64,
    /// Balance after deduction.
    pub balance: i64,
}

/// Refund request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefundRequest {
    /// Action whose work failed.
    pub action: String,
    /// Credits to return.
    pub amount: i64,
    /// Free-text reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    /// Spend being reversed (`entry_id` from [`ConsumeResponse`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_entry_id: Option<String>,
}

impl RefundRequest {
    /// Refund exactly what a consume charged, keyed to its entry so it is issued once.
    #[must_use]
    pub fn reversing(action: impl Into<String>, consumed: &ConsumeResponse) -> Self {
        Self {
            action: action.into(),
            amount: consumed.cost,
            ref_id: None,
            original_entry_id: Some(consumed.entry_id.clone()),
        }
    }
}

/// Refund response.
#[derive(Debug, Clone, Deserialize)]
pub struct RefundResponse {
    /// Ledger entry recording the refund.
    pub entry_id: String,
    /// Balance after the refund.
    pub balance: i64,
}

/// Grant request (service key).
#[derive(Debug, Clone, Serialize)]
pub struct GrantRequest {
    /// User to credit.
    pub user_id: String,
    /// Credits to add.
    pub amount: i64,
    /// Ledger reason (server default: `credit_purchase`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Payment reference, credited at most once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
}

/// Grant response.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantResponse {
    /// Balance after the grant.
    pub balance: i64,
}

/// Ledger entry as returned by the history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerEntry {
    /// Entry ID.
    pub id: String,
    /// Signed credit change.
    pub change: i64,
    /// Action or category.
    pub reason: String,
    /// Reference.
    #[serde(default)]
    pub ref_id: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

/// History page.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    /// Entries (newest first).
    pub entries: Vec<LedgerEntry>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// Spend summary.
#[derive(Debug, Clone, Deserialize)]
pub struct UsageResponse {
    /// Credits spent per action.
    pub by_action: BTreeMap<String, i64>,
    /// Credits spent per UTC day.
    pub by_day: BTreeMap<String, i64>,
    /// Total credits spent.
    pub total_spent: i64,
}

/// API error response structure.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}
