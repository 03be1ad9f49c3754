//! Credit balance, consume, refund and grant handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use ad_credits_core::{reasons, CreditError, EntryId, UserId};

use crate::auth::{AuthUser, ServiceAuth};
use crate::credits::{ConsumeOutcome, RefundRequest};
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Current balance in credits.
    pub total_credits: i64,
    /// Last update timestamp.
    pub updated_at: String,
}

/// Get current credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.credits.balance(auth.user_id)?;

    Ok(Json(BalanceResponse {
        total_credits: balance.total_credits,
        updated_at: balance.updated_at.to_rfc3339(),
    }))
}

/// Cost table response.
#[derive(Debug, Serialize)]
pub struct CostsResponse {
    /// Credits charged per action.
    pub costs: BTreeMap<String, i64>,
}

/// List the credit cost of every billable action.
pub async fn list_costs(State(state): State<Arc<AppState>>) -> Json<CostsResponse> {
    let costs = state
        .credits
        .costs()
        .iter()
        .map(|(action, cost)| (action.to_string(), cost))
        .collect();

    Json(CostsResponse { costs })
}

/// Consume credits request.
#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    /// Action about to be performed.
    pub action: String,
    /// Campaign or ad the action is for.
    pub ref_id: Option<String>,
}

/// Consume credits response.
#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    /// Always true; insufficient balances answer 402.
    pub success: bool,
    /// Ledger entry recording the spend. Pass it back when refunding.
    pub entry_id: String,
    /// Credits deducted.
    pub cost: i64,
    /// Balance after deduction.
    pub balance: i64,
}

/// Deduct the cost of an action before it is performed.
pub async fn consume_credits(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ConsumeRequest>,
) -> Result<Json<ConsumeResponse>, ApiError> {
    match state
        .credits
        .consume(auth.user_id, &body.action, body.ref_id)?
    {
        ConsumeOutcome::Consumed {
            entry_id,
            cost,
            balance,
        } => Ok(Json(ConsumeResponse {
            success: true,
            entry_id: entry_id.to_string(),
            cost,
            balance,
        })),
        ConsumeOutcome::Insufficient { balance, required } => {
            Err(ApiError::InsufficientCredits { balance, required })
        }
    }
}

/// Refund credits request.
#[derive(Debug, Deserialize)]
pub struct RefundCreditsRequest {
    /// Action whose work failed.
    pub action: String,
    /// Credits to return.
    pub amount: i64,
    /// Free-text reference.
    pub ref_id: Option<String>,
    /// Spend being reversed. Makes the refund single-use.
    pub original_entry_id: Option<String>,
}

/// Refund credits response.
#[derive(Debug, Serialize)]
pub struct RefundCreditsResponse {
    /// Ledger entry recording the refund.
    pub entry_id: String,
    /// Balance after the refund.
    pub balance: i64,
}

/// Return credits for an action that failed after consumption.
pub async fn refund_credits(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<RefundCreditsRequest>,
) -> Result<Json<RefundCreditsResponse>, ApiError> {
    let original_entry_id = body
        .original_entry_id
        .as_deref()
        .map(str::parse::<EntryId>)
        .transpose()
        .map_err(CreditError::from)?;

    let receipt = state.credits.refund(
        auth.user_id,
        &RefundRequest {
            action: body.action,
            amount: body.amount,
            ref_id: body.ref_id,
            original_entry_id,
        },
    )?;

    Ok(Json(RefundCreditsResponse {
        entry_id: receipt.entry_id.to_string(),
        balance: receipt.balance,
    }))
}

/// Grant credits request (service-to-service).
#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    /// User to credit.
    pub user_id: String,
    /// Credits to add.
    pub amount: i64,
    /// Ledger reason (default: `credit_purchase`).
    pub reason: Option<String>,
    /// Payment reference. Each reference is credited at most once.
    pub ref_id: Option<String>,
}

/// Grant credits response.
#[derive(Debug, Serialize)]
pub struct GrantCreditsResponse {
    /// Balance after the grant.
    pub balance: i64,
}

/// Add purchased or promotional credits to a user.
pub async fn grant_credits(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<GrantCreditsRequest>,
) -> Result<Json<GrantCreditsResponse>, ApiError> {
    let user_id = body
        .user_id
        .parse::<UserId>()
        .map_err(CreditError::from)?;
    let reason = body.reason.as_deref().unwrap_or(reasons::CREDIT_PURCHASE);

    tracing::info!(
        service = %service.service_name,
        user_id = %user_id,
        amount = body.amount,
        reason = %reason,
        "Credit grant requested"
    );

    let balance = state
        .credits
        .grant(user_id, body.amount, reason, body.ref_id)?;

    Ok(Json(GrantCreditsResponse { balance }))
}
