//! Worker configuration.
//!
//! Strongly-typed configuration loaded via the `config` crate from
//! environment variables, e.g. `DATABASE_URL`, `NATS__URL`,
//! `NATS__DELIVERY_TIMEOUT_SECS`.

use serde::Deserialize;

/// Worker configuration.
#[derive(Debug, Deserialize)]
pub struct WorkerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Maximum database connections.
    #[serde(default = "default_max_db_connections")]
    pub max_db_connections: u32,

    /// NATS configuration.
    pub nats: NatsSettings,
}

/// NATS connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NatsSettings {
    /// NATS server URL.
    pub url: String,

    /// Delivery request timeout in seconds.
    #[serde(default)]
    pub delivery_timeout_secs: Option<u64>,
}

fn default_max_db_connections() -> u32 {
    5
}

impl WorkerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
