use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "FERRETERIA";

/// Application configuration with validation.
///
/// Loaded from `config/default.toml`, an environment-specific overlay and
/// `FERRETERIA_*` environment variables, in that order.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1, max = 512))]
    pub max_connections: u32,

    /// Runtime environment name ("development", "test", "production")
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log filter directive for tracing-subscriber
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// IVA rate applied by invoice posting (13% for this deployment)
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,

    /// Warehouse credited by purchase receipts and debited by sales
    /// fulfillment when no branch-specific warehouse applies.
    pub default_warehouse_id: Option<i64>,

    /// Hours an idempotency record stays replayable
    #[serde(default = "default_idempotency_ttl_hours")]
    #[validate(range(min = 1, max = 720))]
    pub idempotency_ttl_hours: i64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_tax_rate() -> Decimal {
    dec!(0.13)
}

fn default_idempotency_ttl_hours() -> i64 {
    24
}

impl AppConfig {
    /// Builds a configuration from files and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("FERRETERIA_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let builder = Config::builder()
            .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
            .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        info!(environment = %config.environment, "configuration loaded");
        Ok(config)
    }

    /// Minimal configuration for tests and embedded use.
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: default_max_connections(),
            environment: "test".to_string(),
            log_level: default_log_level(),
            tax_rate: default_tax_rate(),
            default_warehouse_id: None,
            idempotency_ttl_hours: default_idempotency_ttl_hours(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Initializes the tracing subscriber from the configured log filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
