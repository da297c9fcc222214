use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_TAX_PERCENTAGE: f64 = 10.0;
const DEFAULT_SERVICE_PERCENTAGE: f64 = 5.0;
const DEFAULT_CURRENCY: &str = "IDR";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] ConfigError),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),
}

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
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

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

    /// Secret used to verify staff bearer tokens (HS256)
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Tax applied to the order subtotal, in percent (e.g. 10.0)
    #[serde(default = "default_tax_percentage")]
    #[validate(custom = "validate_percentage")]
    pub tax_percentage: f64,

    /// Service charge applied to the order subtotal, in percent
    #[serde(default = "default_service_percentage")]
    #[validate(custom = "validate_percentage")]
    pub service_percentage: f64,

    /// Currency code sent to the payment gateway
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Decimal places kept on computed charges (0 for IDR)
    #[serde(default)]
    #[validate(range(max = 4))]
    pub amount_scale: u32,

    /// Midtrans server key, also the webhook signature secret
    #[serde(default)]
    pub midtrans_server_key: String,

    /// "sandbox" or "production"
    #[serde(default = "default_midtrans_environment")]
    #[validate(custom = "validate_midtrans_environment")]
    pub midtrans_environment: String,

    /// Overrides for the gateway base URLs (tests, proxies)
    #[serde(default)]
    pub midtrans_snap_url: Option<String>,
    #[serde(default)]
    pub midtrans_api_url: Option<String>,

    /// Upper bound for any single gateway HTTP call
    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub gateway_timeout_secs: u64,

    /// Lifetime of a hosted payment page
    #[serde(default = "default_payment_expiry_minutes")]
    pub payment_expiry_minutes: u32,

    /// Sessions older than this are ended by the sweeper
    #[serde(default = "default_session_expiry_hours")]
    #[validate(range(min = 1))]
    pub session_expiry_hours: u32,

    #[serde(default = "default_session_sweep_interval_secs")]
    pub session_sweep_interval_secs: u64,

    /// Capacity of the post-commit event queue
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Per-subscriber buffer of the live update hub
    #[serde(default = "default_fanout_capacity")]
    #[validate(range(min = 1))]
    pub fanout_capacity: usize,

    /// Requests one client may make per window; 0 turns limiting off
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,

    #[serde(default = "default_rate_limit_window_secs")]
    #[validate(range(min = 1))]
    pub rate_limit_window_secs: u64,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
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
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            jwt_secret,
            tax_percentage: default_tax_percentage(),
            service_percentage: default_service_percentage(),
            currency: default_currency(),
            amount_scale: 0,
            midtrans_server_key: String::new(),
            midtrans_environment: default_midtrans_environment(),
            midtrans_snap_url: None,
            midtrans_api_url: None,
            gateway_timeout_secs: default_gateway_timeout_secs(),
            payment_expiry_minutes: default_payment_expiry_minutes(),
            session_expiry_hours: default_session_expiry_hours(),
            session_sweep_interval_secs: default_session_sweep_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            fanout_capacity: default_fanout_capacity(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn session_expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.session_expiry_hours))
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.is_production() && self.midtrans_server_key.trim().is_empty() {
            let mut err = ValidationError::new("midtrans_server_key_required");
            err.message =
                Some("Set APP__MIDTRANS_SERVER_KEY before running in production".into());
            errors.add("midtrans_server_key", err);
        }

        if self.is_production() && self.midtrans_environment != "production" {
            let mut err = ValidationError::new("midtrans_environment_mismatch");
            err.message = Some("Production must talk to the production gateway".into());
            errors.add("midtrans_environment", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
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

fn default_tax_percentage() -> f64 {
    DEFAULT_TAX_PERCENTAGE
}

fn default_service_percentage() -> f64 {
    DEFAULT_SERVICE_PERCENTAGE
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_midtrans_environment() -> String {
    "sandbox".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    10
}

fn default_payment_expiry_minutes() -> u32 {
    60
}

fn default_session_expiry_hours() -> u32 {
    6
}

fn default_session_sweep_interval_secs() -> u64 {
    300
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_fanout_capacity() -> usize {
    256
}

fn default_rate_limit_requests() -> u32 {
    120
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_percentage(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        let mut err = ValidationError::new("percentage");
        err.message = Some("Percentages must be finite values between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

fn validate_midtrans_environment(value: &str) -> Result<(), ValidationError> {
    match value {
        "sandbox" | "production" => Ok(()),
        _ => {
            let mut err = ValidationError::new("midtrans_environment");
            err.message = Some("Must be one of: sandbox, production".into());
            Err(err)
        }
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("table_order_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://table_order.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET (minimum 32 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
