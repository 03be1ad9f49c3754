//! Account registration handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use ad_credits_core::CreditBalance;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Current balance in credits.
    pub total_credits: i64,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&CreditBalance> for AccountResponse {
    fn from(balance: &CreditBalance) -> Self {
        Self {
            user_id: balance.user_id.to_string(),
            total_credits: balance.total_credits,
            created_at: balance.created_at.to_rfc3339(),
        }
    }
}

/// Register the calling user and grant welcome credits.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let balance = state.credits.register(auth.user_id)?;

    Ok(Json(AccountResponse::from(&balance)))
}
