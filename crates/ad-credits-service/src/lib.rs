//! Ad-credits HTTP API service.
//!
//! This crate meters paid actions (ad and image generation, copy rewrites,
//! insights) against a per-user credit balance:
//!
//! - Account registration with welcome credits
//! - Consume before the paid work, refund if it fails
//! - Usage history, CSV export and spend summaries
//! - Service-to-service credit grants and an admin balance audit
//!
//! # Authentication
//!
//! 1. **HS256 JWT bearer tokens** - For end-user requests
//! 2. **Service API keys** - For credit grants from backend services
//! 3. **Admin keys** - For support endpoints

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Axum handlers all return Result
#![allow(clippy::missing_errors_doc)]
// Handlers call the synchronous store but must be async for axum
#![allow(clippy::unused_async)]

pub mod auth;
pub mod config;
pub mod credits;
pub mod error;
pub mod forwarder;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{ServiceConfig, StorageBackend};
pub use credits::{
    BalanceAudit, ConsumeOutcome, CreditService, HistoryPage, RefundReceipt, RefundRequest,
};
pub use error::ApiError;
pub use forwarder::{ForwardError, SpendEvent, UsageForwarder};
pub use routes::create_router;
pub use state::AppState;
