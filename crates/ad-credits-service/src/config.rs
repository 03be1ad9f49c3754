//! Service configuration.

use std::path::Path;

use ad_credits_core::{CreditCostTable, CreditError, DEFAULT_WELCOME_CREDITS};

/// Which `Store` implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-process store; state is lost on restart.
    Memory,
    /// `RocksDB` under `data_dir` (requires the `rocksdb-backend` feature).
    RocksDb,
}

impl std::str::FromStr for StorageBackend {
    type Err = CreditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rocksdb" | "rocks" => Ok(Self::RocksDb),
            other => Err(CreditError::Configuration(format!(
                "unknown storage backend: {other}"
            ))),
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Storage backend (default: memory).
    pub storage_backend: StorageBackend,

    /// Path to `RocksDB` data directory (default: "/data/ad-credits").
    pub data_dir: String,

    /// HS256 secret used to verify user JWTs.
    pub auth_jwt_secret: Option<String>,

    /// Expected JWT audience (default: "authenticated").
    pub auth_audience: String,

    /// Service API key for service-to-service auth (credit grants).
    pub service_api_key: Option<String>,

    /// Admin API key for support endpoints.
    pub admin_api_key: Option<String>,

    /// Analytics webhook receiving spend events (optional).
    pub analytics_webhook_url: Option<String>,

    /// Credits granted on registration.
    pub welcome_credits: i64,

    /// Credit cost table.
    pub costs: CreditCostTable,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables and the optional cost file.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::Configuration` if the storage backend is unknown or the
    /// cost file cannot be read or parsed.
    pub fn from_env() -> Result<Self, CreditError> {
        let storage_backend = std::env::var("STORAGE_BACKEND")
            .ok()
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(StorageBackend::Memory);

        let costs = match std::env::var("CREDIT_COSTS_FILE") {
            Ok(path) => load_cost_table(&path)?,
            Err(_) => CreditCostTable::default(),
        };

        Ok(Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            storage_backend,
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/ad-credits".into()),
            auth_jwt_secret: std::env::var("AUTH_JWT_SECRET").ok(),
            auth_audience: std::env::var("AUTH_AUDIENCE")
                .unwrap_or_else(|_| "authenticated".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            analytics_webhook_url: std::env::var("ANALYTICS_WEBHOOK_URL").ok(),
            welcome_credits: std::env::var("WELCOME_CREDITS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|credits: &i64| *credits >= 0)
                .unwrap_or(DEFAULT_WELCOME_CREDITS),
            costs,
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(64 * 1024), // 64KB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }
}

/// Load cost overrides from a JSON file and merge them over the defaults.
///
/// # Errors
///
/// Returns `CreditError::Configuration` if the file is missing or invalid.
pub fn load_cost_table(path: impl AsRef<Path>) -> Result<CreditCostTable, CreditError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        CreditError::Configuration(format!("cannot read cost file {}: {e}", path.display()))
    })?;

    let table = CreditCostTable::from_json_overrides(&contents)?;
    tracing::info!(path = %path.display(), actions = table.len(), "Loaded credit cost table");
    Ok(table)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            storage_backend: StorageBackend::Memory,
            data_dir: "/data/ad-credits".into(),
            auth_jwt_secret: None,
            auth_audience: "authenticated".into(),
            service_api_key: None,
            admin_api_key: None,
            analytics_webhook_url: None,
            welcome_credits: DEFAULT_WELCOME_CREDITS,
            costs: CreditCostTable::default(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_parses() {
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!("RocksDB".parse::<StorageBackend>().unwrap(), StorageBackend::RocksDb);
        assert!("postgres".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn cost_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("costs.json");
        std::fs::write(&path, r#"{"image_generation": 7}"#).unwrap();

        let table = load_cost_table(&path).unwrap();
        assert_eq!(table.cost_of("image_generation").unwrap(), 7);
        assert_eq!(table.cost_of("meta_ad_generation").unwrap(), 5);
    }

    #[test]
    fn missing_cost_file_is_a_configuration_error() {
        let err = load_cost_table("/nonexistent/costs.json").unwrap_err();
        assert!(matches!(err, CreditError::Configuration(_)));
    }
}
