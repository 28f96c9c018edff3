use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_PICKUP_TOKEN_VALIDITY_DAYS: i64 = 30;
const DEFAULT_PICKUP_SECRET_TTL_DAYS: i64 = 7;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const DEFAULT_EMAIL_WORKER_INTERVAL_SECS: u64 = 60;
const DEFAULT_EMAIL_BATCH_SIZE: u64 = 10;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration load error: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Public base URL of the storefront (redirect targets, pickup links)
    pub app_url: String,

    /// Payment gateway API base URL
    pub payment_api_base: String,

    /// Payment gateway secret API key
    pub payment_secret_key: String,

    /// Secret used to verify inbound payment webhooks
    pub payment_webhook_secret: String,

    /// Accepted clock skew for webhook signatures (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub payment_webhook_tolerance_secs: i64,

    /// Email transport API base URL
    pub email_api_base: String,

    /// Email transport API key
    pub email_api_key: String,

    /// Sender address for transactional email
    #[validate(email)]
    pub email_from: String,

    /// JWT secret for staff sessions (minimum 32 characters)
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Staff JWT lifetime in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: usize,

    /// Staff account email
    #[validate(email)]
    pub admin_email: String,

    /// Argon2 hash of the staff account password
    pub admin_password_hash: String,

    /// Pickup token validity window in days
    #[serde(default = "default_pickup_token_validity_days")]
    pub pickup_token_validity_days: i64,

    /// How long the clear pickup secret stays available for email rendering
    #[serde(default = "default_pickup_secret_ttl_days")]
    pub pickup_secret_ttl_days: i64,

    /// Email queue drain interval (seconds)
    #[serde(default = "default_email_worker_interval_secs")]
    pub email_worker_interval_secs: u64,

    /// Max queue entries processed per drain
    #[serde(default = "default_email_batch_size")]
    pub email_batch_size: u64,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_jwt_expiration() -> usize {
    3600
}

fn default_pickup_token_validity_days() -> i64 {
    DEFAULT_PICKUP_TOKEN_VALIDITY_DAYS
}

fn default_pickup_secret_ttl_days() -> i64 {
    DEFAULT_PICKUP_SECRET_TTL_DAYS
}

fn default_webhook_tolerance_secs() -> i64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_email_worker_interval_secs() -> u64 {
    DEFAULT_EMAIL_WORKER_INTERVAL_SECS
}

fn default_email_batch_size() -> u64 {
    DEFAULT_EMAIL_BATCH_SIZE
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

impl AppConfig {
    /// Programmatic constructor used by tests and tooling; production code
    /// goes through [`load_config`].
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            app_url: "http://localhost:3000".to_string(),
            payment_api_base: "https://pay.example.test".to_string(),
            payment_secret_key: "sk_test_placeholder".to_string(),
            payment_webhook_secret: "whsec_test_placeholder".to_string(),
            payment_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            email_api_base: "https://mail.example.test".to_string(),
            email_api_key: "mk_test_placeholder".to_string(),
            email_from: "boutique@comptoir.example".to_string(),
            jwt_secret,
            jwt_expiration: default_jwt_expiration(),
            admin_email: "staff@comptoir.example".to_string(),
            admin_password_hash: String::new(),
            pickup_token_validity_days: default_pickup_token_validity_days(),
            pickup_secret_ttl_days: default_pickup_secret_ttl_days(),
            email_worker_interval_secs: default_email_worker_interval_secs(),
            email_batch_size: default_email_batch_size(),
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Loads configuration from `config/default.toml`, an environment-specific
/// file, and `APP__`-prefixed environment variables, in that order.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // Secrets (jwt_secret, payment keys, webhook secret) have no defaults:
    // they MUST come from a config file or the environment.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://comptoir.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("app_url", "http://localhost:3000")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    for required in ["jwt_secret", "payment_webhook_secret", "payment_secret_key"] {
        if config.get_string(required).is_err() {
            error!(
                "{} is not configured. Set APP__{} or add it to a config file.",
                required,
                required.to_uppercase()
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{} is required but not configured",
                required
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("comptoir_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(filter_directive)
            .json()
            .try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programmatic_config_has_sane_defaults() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "0123456789abcdef0123456789abcdef".into(),
            "127.0.0.1".into(),
            18080,
            "test".into(),
        );
        assert_eq!(cfg.pickup_token_validity_days, 30);
        assert_eq!(cfg.pickup_secret_ttl_days, 7);
        assert_eq!(cfg.payment_webhook_tolerance_secs, 300);
        assert!(!cfg.is_production());
    }
}
