//! Application configuration

use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::MoonExtractionsError;

/// Scope a credential must carry to read corporation mining extractions
pub const MINING_SCOPE: &str = "esi-industry.read_corporation_mining.v1";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Hard cap on `per_page`
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,
    /// Return past extractions when no status filter is given
    #[serde(default)]
    pub include_completed: bool,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Minimum time between two runs for one corporation, unless forced
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_sync_interval")]
    pub interval: Duration,
    /// External API requests per minute
    #[serde(default = "default_api_rate_limit")]
    pub api_rate_limit: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Ceiling for a single run
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    /// Backoff before attempt `n + 1` is `n * retry_backoff`
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: Duration,
    #[serde(default = "default_required_scope")]
    pub required_scope: String,
    /// Dispatch all corporations every `interval` while serving
    #[serde(default)]
    pub schedule: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_results() -> u32 {
    1000
}

fn default_per_page() -> u32 {
    50
}

fn default_sync_interval() -> Duration {
    Duration::from_secs(900)
}

fn default_api_rate_limit() -> u32 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_required_scope() -> String {
    MINING_SCOPE.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_results: default_max_results(),
            default_per_page: default_per_page(),
            include_completed: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: default_sync_interval(),
            api_rate_limit: default_api_rate_limit(),
            max_attempts: default_max_attempts(),
            timeout: default_timeout(),
            retry_backoff: default_retry_backoff(),
            required_scope: default_required_scope(),
            schedule: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("MOONEXTRACTIONS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<(), MoonExtractionsError> {
        self.database.validate()?;
        self.api.validate()?;
        self.sync.validate()
    }
}

fn invalid(message: &str) -> MoonExtractionsError {
    MoonExtractionsError::ConfigurationError {
        message: message.to_string(),
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), MoonExtractionsError> {
        if self.url.trim().is_empty() {
            return Err(invalid("Database URL cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(invalid("Database max_connections must be greater than zero"));
        }
        Ok(())
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<(), MoonExtractionsError> {
        if self.max_results == 0 {
            return Err(invalid("API max_results must be greater than zero"));
        }
        if self.default_per_page == 0 {
            return Err(invalid("API default_per_page must be greater than zero"));
        }
        Ok(())
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), MoonExtractionsError> {
        if self.api_rate_limit == 0 {
            return Err(invalid("Sync api_rate_limit must be greater than zero"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("Sync max_attempts must be greater than zero"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("Sync timeout must be greater than zero"));
        }
        if self.required_scope.trim().is_empty() {
            return Err(invalid("Sync required_scope cannot be empty"));
        }
        Ok(())
    }
}
