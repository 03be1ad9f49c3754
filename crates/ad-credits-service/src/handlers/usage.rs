//! Usage reporting handlers: history, CSV export and spend summaries.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use ad_credits_core::CreditLedgerEntry;

use crate::auth::AuthUser;
use crate::credits::MAX_HISTORY_LIMIT;
use crate::error::ApiError;
use crate::state::AppState;

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of entries to return (default and cap: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    MAX_HISTORY_LIMIT
}

/// Ledger entry response.
#[derive(Debug, Serialize)]
pub struct EntryResponse {
    /// Entry ID.
    pub id: String,
    /// Signed credit change.
    pub change: i64,
    /// Action or category.
    pub reason: String,
    /// Reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&CreditLedgerEntry> for EntryResponse {
    fn from(entry: &CreditLedgerEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            change: entry.change,
            reason: entry.reason.clone(),
            ref_id: entry.ref_id.clone(),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// History response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Entries (newest first).
    pub entries: Vec<EntryResponse>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List ledger history, newest first.
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    state.credits.balance(auth.user_id)?;

    let page = state
        .credits
        .usage_history(auth.user_id, query.limit, query.offset);

    Ok(Json(HistoryResponse {
        entries: page.entries.iter().map(EntryResponse::from).collect(),
        has_more: page.has_more,
    }))
}

/// Export ledger history as CSV (`created_at,reason,change,ref_id,id`).
pub async fn export_history_csv(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.credits.balance(auth.user_id)?;

    let page = state
        .credits
        .usage_history(auth.user_id, query.limit, query.offset);
    let body = history_to_csv(&page.entries)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"credit-history.csv\"",
            ),
        ],
        body,
    ))
}

fn history_to_csv(entries: &[CreditLedgerEntry]) -> Result<String, ApiError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    let csv_error = |e: csv::Error| ApiError::Internal(format!("CSV export failed: {e}"));

    writer
        .write_record(["created_at", "reason", "change", "ref_id", "id"])
        .map_err(csv_error)?;

    for entry in entries {
        writer
            .write_record([
                entry.created_at.to_rfc3339(),
                entry.reason.clone(),
                entry.change.to_string(),
                entry.ref_id.clone().unwrap_or_default(),
                entry.id.to_string(),
            ])
            .map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV export failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ApiError::Internal(e.to_string()))
}

/// Usage response.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// Credits spent per action.
    pub by_action: BTreeMap<String, i64>,
    /// Credits spent per UTC day (`YYYY-MM-DD`).
    pub by_day: BTreeMap<String, i64>,
    /// Total credits spent.
    pub total_spent: i64,
}

/// Summarise spending per action and per day.
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UsageResponse>, ApiError> {
    state.credits.balance(auth.user_id)?;

    let summary = state.credits.usage_summary(auth.user_id);
    let daily = state.credits.daily_usage(auth.user_id);

    Ok(Json(UsageResponse {
        by_action: summary.as_map().clone(),
        by_day: daily
            .iter()
            .map(|(day, spent)| (day.to_string(), spent))
            .collect(),
        total_spent: summary.total_spent(),
    }))
}
