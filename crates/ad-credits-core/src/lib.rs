//! Core types and utilities for ad-credits.
//!
//! This crate provides the foundational types used throughout the credit metering service:
//!
//! - **Identifiers**: `UserId`, `EntryId`
//! - **Ledger**: `CreditLedgerEntry` and the well-known `reasons`
//! - **Balances**: `CreditBalance`
//! - **Costs**: `CreditCostTable` and the named `actions`
//! - **Usage**: `UsageSummary`, `DailyUsage`
//!
//! # Credit Unit
//!
//! One credit pays for one unit of a paid AI action (an image, a set of ad copy
//! for one platform). Credits are whole numbers stored as `i64`; the ledger records
//! signed deltas and the balance cache holds their running sum.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod costs;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod usage;

pub use balance::{CreditBalance, DEFAULT_WELCOME_CREDITS};
pub use costs::{actions, CreditCostTable};
pub use error::{CreditError, Result};
pub use ids::{EntryId, IdError, UserId};
pub use ledger::{reasons, CreditLedgerEntry};
pub use usage::{DailyUsage, UsageSummary};
