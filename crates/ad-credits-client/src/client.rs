//! Ad-credits HTTP client implementation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Client, RequestBuilder};

use crate::error::ClientError;
use crate::types::{
    AccountResponse, ApiErrorResponse, BalanceResponse, ConsumeRequest, ConsumeResponse,
    CostsResponse, GrantRequest, GrantResponse, HistoryResponse, RefundRequest, RefundResponse,
    UsageResponse,
};

/// Ad-credits API client acting on behalf of one signed-in user.
///
/// The balance is memoised after the first read and kept current from consume
/// and refund responses; [`CreditsClient::refresh_balance`] bypasses the cache.
#[derive(Debug, Clone)]
pub struct CreditsClient {
    client: Client,
    base_url: String,
    user_token: String,
    service_api_key: Option<String>,
    service_name: String,
    cached_balance: Arc<Mutex<Option<i64>>>,
}

impl CreditsClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the ad-credits service (e.g., `"http://ad-credits:8080"`)
    /// * `user_token` - The signed-in user's JWT
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        user_token: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::with_options(base_url, user_token, ClientOptions::default())
    }

    /// Create a new client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        user_token: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_token: user_token.into(),
            service_api_key: options.service_api_key,
            service_name: options.service_name,
            cached_balance: Arc::new(Mutex::new(None)),
        })
    }

    /// Register the user, receiving the welcome credits.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the account already exists.
    pub async fn register(&self) -> Result<AccountResponse, ClientError> {
        let request = self.user_request(self.client.post(self.url("/v1/accounts")));
        let account: AccountResponse = self.send(request).await?;
        self.remember_balance(account.total_credits);
        Ok(account)
    }

    /// Current balance, served from the cache after the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the balance has to be fetched and the request fails.
    pub async fn balance(&self) -> Result<i64, ClientError> {
        let cached = *self.cache();
        if let Some(balance) = cached {
            return Ok(balance);
        }
        self.refresh_balance().await
    }

    /// Fetch the balance from the server and update the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the account does not exist.
    pub async fn refresh_balance(&self) -> Result<i64, ClientError> {
        let request = self.user_request(self.client.get(self.url("/v1/credits/balance")));
        let balance: BalanceResponse = self.send(request).await?;
        self.remember_balance(balance.total_credits);
        Ok(balance.total_credits)
    }

    /// Deduct the cost of `action` before performing it.
    ///
    /// # Errors
    ///
    /// - `ClientError::InsufficientCredits` if the balance does not cover the cost.
    /// - `ClientError::UnknownAction` if the action has no configured cost.
    /// - Other errors if the request fails.
    pub async fn consume(
        &self,
        action: impl Into<String>,
        ref_id: Option<String>,
    ) -> Result<ConsumeResponse, ClientError> {
        let body = ConsumeRequest {
            action: action.into(),
            ref_id,
        };
        let request = self
            .user_request(self.client.post(self.url("/v1/credits/consume")))
            .json(&body);

        match self.send::<ConsumeResponse>(request).await {
            Ok(consumed) => {
                self.remember_balance(consumed.balance);
                tracing::debug!(
                    action = %body.action,
                    cost = consumed.cost,
                    balance = consumed.balance,
                    "Credits consumed"
                );
                Ok(consumed)
            }
            Err(ClientError::InsufficientCredits { balance, required }) => {
                self.remember_balance(balance);
                Err(ClientError::InsufficientCredits { balance, required })
            }
            Err(e) => Err(e),
        }
    }

    /// Consume, reporting an insufficient balance as `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns any error other than `InsufficientCredits`.
    pub async fn try_consume(
        &self,
        action: impl Into<String>,
        ref_id: Option<String>,
    ) -> Result<bool, ClientError> {
        match self.consume(action, ref_id).await {
            Ok(consumed) => Ok(consumed.success),
            Err(ClientError::InsufficientCredits { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Return credits for an action that failed after consumption.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the amount is invalid, or the
    /// named spend was already refunded.
    pub async fn refund(&self, refund: &RefundRequest) -> Result<RefundResponse, ClientError> {
        let request = self
            .user_request(self.client.post(self.url("/v1/credits/refund")))
            .json(refund);
        let receipt: RefundResponse = self.send(request).await?;
        self.remember_balance(receipt.balance);
        Ok(receipt)
    }

    /// Refund in the background. Failures are logged and otherwise dropped.
    pub fn refund_detached(&self, refund: RefundRequest) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                action = %refund.action,
                amount = refund.amount,
                "No runtime available, refund dropped"
            );
            return;
        };

        let client = self.clone();
        handle.spawn(async move {
            if let Err(e) = client.refund(&refund).await {
                tracing::warn!(
                    action = %refund.action,
                    amount = refund.amount,
                    error = %e,
                    "Refund failed; user may be under-credited"
                );
            }
        });
    }

    /// Credits spent per action and per day.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn usage_summary(&self) -> Result<UsageResponse, ClientError> {
        let request = self.user_request(self.client.get(self.url("/v1/credits/usage")));
        self.send(request).await
    }

    /// One page of ledger history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn history(&self, limit: usize, offset: usize) -> Result<HistoryResponse, ClientError> {
        let request = self
            .user_request(self.client.get(self.url("/v1/credits/history")))
            .query(&[("limit", limit), ("offset", offset)]);
        self.send(request).await
    }

    /// The credit cost of every billable action.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn costs(&self) -> Result<CostsResponse, ClientError> {
        self.send(self.client.get(self.url("/v1/credits/costs"))).await
    }

    /// Grant credits to any user. Requires a service API key in [`ClientOptions`].
    ///
    /// # Errors
    ///
    /// - `ClientError::Configuration` if no service API key is configured.
    /// - `ClientError::DuplicateRefund` if `ref_id` was already credited.
    /// - Other errors if the request fails.
    pub async fn grant(&self, grant: &GrantRequest) -> Result<GrantResponse, ClientError> {
        let api_key = self
            .service_api_key
            .as_ref()
            .ok_or_else(|| ClientError::Configuration("service API key not set".into()))?;

        let request = self
            .client
            .post(self.url("/v1/credits/grant"))
            .header("x-api-key", api_key)
            .header("x-service-name", &self.service_name)
            .json(grant);
        self.send(request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn user_request(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("authorization", format!("Bearer {}", self.user_token))
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, Option<i64>> {
        self.cached_balance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remember_balance(&self, balance: i64) {
        *self.cache() = Some(balance);
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let code = api_error.error.code.as_str();
                let message = api_error.error.message;
                let detail = |key: &str| {
                    api_error
                        .error
                        .details
                        .as_ref()
                        .and_then(|d| d.get(key))
                        .cloned()
                };

                // Map specific error codes to typed errors
                match code {
                    "insufficient_credits" => Err(ClientError::InsufficientCredits {
                        balance: detail("balance")
                            .and_then(|v| v.as_i64())
                            .unwrap_or(0),
                        required: detail("required")
                            .and_then(|v| v.as_i64())
                            .unwrap_or(0),
                    }),
                    "unknown_action" => Err(ClientError::UnknownAction {
                        action: detail("action")
                            .and_then(|v| v.as_str().map(ToString::to_string))
                            .unwrap_or(message),
                    }),
                    "duplicate_refund" => Err(ClientError::DuplicateRefund { message }),
                    "not_found" => Err(ClientError::AccountNotFound),
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service API key, needed only for grants.
    pub service_api_key: Option<String>,
    /// Service name to include in service requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_api_key: None,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options for a backend service allowed to grant credits.
    #[must_use]
    pub fn for_service(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            service_api_key: Some(api_key.into()),
            service_name: name.into(),
            ..Self::default()
        }
    }
}
