//! Application state.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use ad_credits_store::Store;

use crate::config::ServiceConfig;
use crate::credits::CreditService;
use crate::forwarder::UsageForwarder;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Credit operations over the configured store.
    pub credits: Arc<CreditService>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Key and rules used to verify user JWTs. `None` rejects all user requests.
    pub jwt: Option<Arc<JwtVerifier>>,
}

/// HS256 verification key plus validation rules.
pub struct JwtVerifier {
    /// Decoding key derived from the shared secret.
    pub key: DecodingKey,
    /// Algorithm and audience checks.
    pub validation: Validation,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let forwarder = config
            .analytics_webhook_url
            .as_ref()
            .and_then(|url| match UsageForwarder::new(url.clone()) {
                Ok(forwarder) => {
                    tracing::info!(webhook_url = %url, "Spend event forwarding enabled");
                    Some(Arc::new(forwarder))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create usage forwarder");
                    None
                }
            });

        if forwarder.is_none() {
            tracing::warn!("Analytics webhook not configured - spend events will not be forwarded");
        }

        let mut credits = CreditService::new(
            store,
            Arc::new(config.costs.clone()),
            config.welcome_credits,
        );
        if let Some(forwarder) = forwarder {
            credits = credits.with_forwarder(forwarder);
        }

        let jwt = config.auth_jwt_secret.as_ref().map(|secret| {
            let mut validation = Validation::new(Algorithm::HS256);
            validation.set_audience(&[&config.auth_audience]);
            Arc::new(JwtVerifier {
                key: DecodingKey::from_secret(secret.as_bytes()),
                validation,
            })
        });

        if jwt.is_none() {
            tracing::warn!("AUTH_JWT_SECRET not set - user endpoints will reject all requests");
        }

        Self {
            credits: Arc::new(credits),
            config,
            jwt,
        }
    }
}
