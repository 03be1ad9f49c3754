//! Support endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use ad_credits_core::{CreditError, UserId};

use crate::auth::AdminAuth;
use crate::credits::BalanceAudit;
use crate::error::ApiError;
use crate::state::AppState;

/// Compare a user's cached balance with the sum of their ledger.
pub async fn audit_user(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceAudit>, ApiError> {
    let user_id = user_id
        .parse::<UserId>()
        .map_err(CreditError::from)?;

    let audit = state.credits.audit(user_id)?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user_id,
        consistent = audit.consistent,
        "Balance audited"
    );

    Ok(Json(audit))
}
