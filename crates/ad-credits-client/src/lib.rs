//! Ad-credits client SDK.
//!
//! Front-end services use this crate to gate paid actions on the user's credit
//! balance: consume before the expensive call, refund if it fails.
//!
//! # Example
//!
//! ```no_run
//! use ad_credits_client::{CreditsClient, RefundRequest};
//!
//! # async fn generate_ad() -> Result<(), String> { Ok(()) }
//! # async fn example() -> Result<(), ad_credits_client::ClientError> {
//! let client = CreditsClient::new("http://ad-credits:8080", "user-jwt")?;
//!
//! let consumed = client
//!     .consume("meta_ad_generation", Some("campaign_42".into()))
//!     .await?;
//!
//! if generate_ad().await.is_err() {
//!     client.refund_detached(RefundRequest::reversing("meta_ad_generation", &consumed));
//! }
//!
//! println!("Balance: {} credits", client.balance().await?);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, CreditsClient};
pub use error::ClientError;
pub use types::*;
