use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub exchange: ExchangeConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Redis backs the exchange rate memoization. Without a URL the service
/// calls the provider on every lookup.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub rate_ttl_secs: u64,
}

impl RedisConfig {
    pub fn enabled_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PaginationConfig {
    pub default_size: u32,
    pub max_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_size: 20,
            max_size: 2000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8085)?
            .set_default("server.workers", 4)?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("redis.rate_ttl_secs", 3600)?
            .set_default("exchange.base_url", "https://v6.exchangerate-api.com/v6")?
            .set_default("exchange.api_key", "")?
            .set_default("exchange.timeout_secs", 10)?
            .set_default("pagination.default_size", 20)?
            .set_default("pagination.max_size", 2000)?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("ACCOUNT_ENGINE")
                .separator("__")
                .try_parsing(true),
        );

        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(redis_url) = env::var("REDIS_URL") {
            builder = builder.set_override("redis.url", redis_url)?;
        }

        if let Ok(api_key) = env::var("EXCHANGE_RATE_API_KEY") {
            builder = builder.set_override("exchange.api_key", api_key)?;
        }

        if let Ok(port) = env::var("ACCOUNT_ENGINE_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.server.workers == 0 {
            return Err("At least one server worker is required".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL is required".to_string());
        }

        if self.exchange.base_url.is_empty() {
            return Err("Exchange rate provider URL is required".to_string());
        }

        if self.exchange.api_key.is_empty() {
            return Err("Exchange rate provider API key is required".to_string());
        }

        if self.pagination.default_size == 0 || self.pagination.max_size == 0 {
            return Err("Page sizes must be positive".to_string());
        }

        if self.pagination.default_size > self.pagination.max_size {
            return Err("Default page size cannot exceed the maximum page size".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8085,
                workers: 1,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/accounts".to_string(),
                max_connections: 5,
                min_connections: 1,
            },
            redis: RedisConfig {
                url: None,
                rate_ttl_secs: 60,
            },
            exchange: ExchangeConfig {
                base_url: "https://rates.example".to_string(),
                api_key: "key".to_string(),
                timeout_secs: 5,
            },
            pagination: PaginationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_rejects_missing_api_key() {
        let mut config = sample();
        config.exchange.api_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_page_sizes() {
        let mut config = sample();
        config.pagination.default_size = 50;
        config.pagination.max_size = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_redis_url_disables_cache() {
        let mut config = sample();
        assert_eq!(config.redis.enabled_url(), None);

        config.redis.url = Some("  ".to_string());
        assert_eq!(config.redis.enabled_url(), None);

        config.redis.url = Some("redis://localhost:6379".to_string());
        assert_eq!(config.redis.enabled_url(), Some("redis://localhost:6379"));
    }
}
