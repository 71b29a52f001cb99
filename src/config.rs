use std::env;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite:database.db";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub fetch_timeout: Duration,
    /// Zero disables the category catalog cache.
    pub category_cache_ttl: Duration,
    pub log_level: String,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a whole number of seconds, got {value:?}")]
    InvalidSeconds { name: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let seconds = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match lookup(name) {
                None => Ok(Duration::from_secs(default)),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidSeconds { name, value }),
            }
        };

        let fetch_timeout = seconds("SCORES_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;
        if fetch_timeout.is_zero() {
            return Err(ConfigError::MustBePositive("SCORES_FETCH_TIMEOUT_SECS"));
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            fetch_timeout,
            category_cache_ttl: seconds("SCORES_CATEGORY_CACHE_TTL_SECS", 0)?,
            log_level: lookup("SCORES_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}
