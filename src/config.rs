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
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Application configuration structure with validation
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

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// JWT secret used to authenticate the order-listing endpoint
    #[validate(length(min = 32))]
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

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

    /// Currency the payment gateway charges in (minor units of this currency)
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Country applied to shipping addresses that omit one
    #[serde(default = "default_country")]
    pub default_country: String,

    /// Payment gateway API base URL
    #[serde(default)]
    pub gateway_api_url: Option<String>,

    /// Payment gateway key id (basic-auth user)
    #[serde(default)]
    pub gateway_key_id: Option<String>,

    /// Payment gateway key secret; also keys payment-signature verification
    #[serde(default)]
    pub gateway_key_secret: Option<String>,

    /// Gateway HTTP timeout (seconds)
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    /// Transactional email provider endpoint
    #[serde(default)]
    pub email_api_url: Option<String>,

    /// Transactional email provider API key
    #[serde(default)]
    pub email_api_key: Option<String>,

    /// Sender identity for outbound email
    #[serde(default = "default_email_from_name")]
    pub email_from_name: String,
    #[serde(default = "default_email_from_address")]
    pub email_from_address: String,

    /// Optional reply-to address for outbound email
    #[serde(default)]
    pub email_reply_to: Option<String>,

    /// Per-attempt email send timeout (seconds)
    #[serde(default = "default_email_timeout_secs")]
    pub email_timeout_secs: u64,

    /// Maximum delivery attempts for a confirmation email
    #[serde(default = "default_notification_max_attempts")]
    pub notification_max_attempts: u32,

    /// Base backoff delay between attempts (seconds, scaled linearly)
    #[serde(default = "default_notification_backoff_secs")]
    pub notification_backoff_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_jwt_secret() -> String {
    DEV_DEFAULT_JWT_SECRET.to_string()
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
fn default_currency() -> String {
    "INR".to_string()
}
fn default_country() -> String {
    "India".to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    30
}
fn default_email_from_name() -> String {
    "Storefront".to_string()
}
fn default_email_from_address() -> String {
    "noreply@example.com".to_string()
}
fn default_email_timeout_secs() -> u64 {
    60
}
fn default_notification_max_attempts() -> u32 {
    3
}
fn default_notification_backoff_secs() -> u64 {
    3
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("dev")
    }

    /// A configuration suitable for tests: in-memory SQLite, no external
    /// providers configured.
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 0,
            environment: "test".into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            cors_allowed_origins: None,
            jwt_secret: default_jwt_secret(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            default_currency: default_currency(),
            default_country: default_country(),
            gateway_api_url: None,
            gateway_key_id: None,
            gateway_key_secret: None,
            gateway_timeout_secs: default_gateway_timeout_secs(),
            email_api_url: None,
            email_api_key: None,
            email_from_name: default_email_from_name(),
            email_from_address: default_email_from_address(),
            email_reply_to: None,
            email_timeout_secs: default_email_timeout_secs(),
            notification_max_attempts: default_notification_max_attempts(),
            notification_backoff_secs: default_notification_backoff_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
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

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let cfg = AppConfig::for_tests();
        assert_eq!(cfg.default_currency, "INR");
        assert_eq!(cfg.default_country, "India");
        assert_eq!(cfg.notification_max_attempts, 3);
        assert_eq!(cfg.notification_backoff_secs, 3);
        assert_eq!(cfg.email_timeout_secs, 60);
        assert!(cfg.gateway_key_secret.is_none());
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut cfg = AppConfig::for_tests();
        cfg.jwt_secret = "short".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_is_development() {
        let mut cfg = AppConfig::for_tests();
        cfg.environment = "development".into();
        assert!(cfg.is_development());
        cfg.environment = "production".into();
        assert!(!cfg.is_development());
    }
}
