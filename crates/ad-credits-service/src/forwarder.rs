//! Best-effort forwarding of spend events to an analytics webhook.
//!
//! Forwarding never blocks or fails a credit operation: callers hand the event to
//! [`UsageForwarder::spawn_forward`], which runs on the tokio runtime and only logs
//! failures.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

/// Error type for forwarding operations.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook answered with a non-success status.
    #[error("webhook returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// A spend event as posted to the analytics webhook.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SpendEvent {
    /// Ledger entry that recorded the spend.
    pub entry_id: String,
    /// User charged.
    pub user_id: String,
    /// Action the credits were spent on.
    pub action: String,
    /// Credits spent.
    pub cost: i64,
    /// Balance after the spend.
    pub balance: i64,
    /// Caller-supplied reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
}

/// Posts spend events to a webhook.
#[derive(Debug, Clone)]
pub struct UsageForwarder {
    client: Client,
    webhook_url: String,
}

impl UsageForwarder {
    /// Create a forwarder for `webhook_url`.
    ///
    /// # Errors
    ///
    /// Returns `ForwardError::Configuration` if the HTTP client cannot be built.
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, ForwardError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ForwardError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    /// Post one event and wait for the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the webhook rejects it.
    pub async fn forward(&self, event: &SpendEvent) -> Result<(), ForwardError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(event)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForwardError::Status {
                status: status.as_u16(),
            });
        }

        tracing::debug!(entry_id = %event.entry_id, "Spend event forwarded");
        Ok(())
    }

    /// Forward in the background. Failures are logged, never returned.
    ///
    /// Does nothing (besides a debug log) when called outside a tokio runtime.
    pub fn spawn_forward(self: &Arc<Self>, event: SpendEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(
                entry_id = %event.entry_id,
                "No runtime available, skipping spend event forwarding"
            );
            return;
        };

        let forwarder = Arc::clone(self);
        handle.spawn(async move {
            if let Err(e) = forwarder.forward(&event).await {
                tracing::warn!(
                    entry_id = %event.entry_id,
                    error = %e,
                    "Failed to forward spend event"
                );
            }
        });
    }
}
