//! Common test utilities for ad-credits integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};

use ad_credits_core::UserId;
use ad_credits_service::auth::JwtClaims;
use ad_credits_service::{create_router, AppState, ServiceConfig};
use ad_credits_store::MemoryStore;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const AUDIENCE: &str = "authenticated";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// The admin API key for support requests.
    pub admin_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness after adjusting the default test configuration.
    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            auth_jwt_secret: Some(JWT_SECRET.into()),
            auth_audience: AUDIENCE.into(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            max_body_bytes: 1024 * 1024,
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let state = AppState::new(Arc::new(MemoryStore::new()), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            test_user_id: UserId::generate(),
            service_api_key,
            admin_api_key,
        }
    }

    /// Get the authorization header for the test user.
    pub fn user_auth_header(&self) -> String {
        bearer_for(&self.test_user_id.to_string(), AUDIENCE, JWT_SECRET)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        bearer_for(&UserId::generate().to_string(), AUDIENCE, JWT_SECRET)
    }

    /// Register the test user and return the response body.
    pub async fn register(&self) -> serde_json::Value {
        let response = self
            .server
            .post("/v1/accounts")
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Consume credits for `action` as the test user.
    pub async fn consume(&self, action: &str) -> axum_test::TestResponse {
        self.server
            .post("/v1/credits/consume")
            .add_header("authorization", self.user_auth_header())
            .json(&serde_json::json!({ "action": action }))
            .await
    }

    /// Grant credits to the test user with the service key.
    pub async fn grant(&self, amount: i64, ref_id: Option<&str>) -> axum_test::TestResponse {
        self.server
            .post("/v1/credits/grant")
            .add_header("x-api-key", &self.service_api_key)
            .json(&serde_json::json!({
                "user_id": self.test_user_id.to_string(),
                "amount": amount,
                "ref_id": ref_id
            }))
            .await
    }

    /// Current balance of the test user.
    pub async fn balance(&self) -> i64 {
        let response = self
            .server
            .get("/v1/credits/balance")
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["total_credits"].as_i64().expect("balance is a number")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Mint an HS256 bearer token.
pub fn bearer_for(sub: &str, audience: &str, secret: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        sub: sub.to_string(),
        aud: Some(serde_json::json!(audience)),
        exp: now + 3600,
        iat: Some(now),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign token");

    format!("Bearer {token}")
}
