//! Exchange rate lookup against the external rate-table provider, with
//! optional redis memoization per base currency.

use crate::currency;
use crate::errors::{AccountEngineError, Result};
use crate::metrics;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, warn};

const CACHE_KEY_PREFIX: &str = "account-engine:rates";

/// Conversion rates quoted for one base currency. Keys are kept sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    #[serde(default)]
    pub result: Option<String>,
    pub base_code: String,
    #[serde(default)]
    pub conversion_rates: BTreeMap<String, Decimal>,
}

impl RateTable {
    pub fn rate(&self, currency: &str) -> Option<Decimal> {
        self.conversion_rates.get(currency).copied()
    }

    /// Codes quoted with a usable (positive) rate.
    pub fn quoted_currencies(&self) -> Vec<String> {
        self.conversion_rates
            .iter()
            .filter(|(_, rate)| **rate > Decimal::ZERO)
            .map(|(code, _)| code.clone())
            .collect()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateTableSource: Send + Sync {
    /// Rate table for `base`. Fails with an invalid currency error when the
    /// provider cannot serve it.
    async fn rates_for(&self, base: &str) -> Result<RateTable>;
}

/// Client for the exchange rate provider.
pub struct ExchangeRateClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl ExchangeRateClient {
    pub fn new(base_url: String, api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AccountEngineError::Internal(format!("HTTP client setup failed: {}", e)))?;

        Ok(ExchangeRateClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn latest_url(&self, base: &str) -> String {
        format!("{}/{}/latest/{}", self.base_url, self.api_key, base)
    }
}

#[async_trait]
impl RateTableSource for ExchangeRateClient {
    async fn rates_for(&self, base: &str) -> Result<RateTable> {
        currency::validate(base)?;

        let response = self
            .client
            .get(self.latest_url(base))
            .send()
            .await
            .map_err(|e| {
                error!("Rate lookup for {} failed: {}", base, redacted(e));
                metrics::record_rate_lookup("transport_error");
                AccountEngineError::InvalidCurrency(base.to_string())
            })?;

        if !response.status().is_success() {
            error!("Rate lookup for {} returned status {}", base, response.status());
            metrics::record_rate_lookup("rejected");
            return Err(AccountEngineError::InvalidCurrency(base.to_string()));
        }

        let table = response.json::<RateTable>().await.map_err(|e| {
            error!("Failed to parse rate table for {}: {}", base, redacted(e));
            metrics::record_rate_lookup("decode_error");
            AccountEngineError::InvalidCurrency(base.to_string())
        })?;

        metrics::record_rate_lookup("success");
        info!(
            "Fetched {} conversion rates for base {}",
            table.conversion_rates.len(),
            base
        );

        Ok(table)
    }
}

/// Request URLs carry the API key, so errors are rendered without them.
fn redacted(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

/// Memoizes rate tables in redis for a bounded time. Concurrent misses may
/// each fetch and overwrite the entry; any of the results is acceptable.
/// Redis failures fall through to the wrapped source.
pub struct CachedRateSource<S> {
    inner: S,
    redis: ConnectionManager,
    ttl_secs: u64,
}

impl<S: RateTableSource> CachedRateSource<S> {
    pub fn new(inner: S, redis: ConnectionManager, ttl_secs: u64) -> Self {
        CachedRateSource {
            inner,
            redis,
            ttl_secs,
        }
    }

    async fn cached(&self, key: &str) -> Option<RateTable> {
        match self.redis.clone().get::<_, Option<String>>(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(table) => Some(table),
                Err(e) => {
                    warn!("Discarding undecodable cached rate table {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Redis error reading {}: {}", key, e);
                None
            }
        }
    }

    async fn store(&self, key: &str, table: &RateTable) {
        let json = match serde_json::to_string(table) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize rate table {}: {}", key, e);
                return;
            }
        };

        let written: redis::RedisResult<()> =
            self.redis.clone().set_ex(key, json, self.ttl_secs).await;
        if let Err(e) = written {
            warn!("Redis error writing {}: {}", key, e);
        }
    }
}

#[async_trait]
impl<S: RateTableSource> RateTableSource for CachedRateSource<S> {
    async fn rates_for(&self, base: &str) -> Result<RateTable> {
        currency::validate(base)?;

        let key = cache_key(base);
        if let Some(table) = self.cached(&key).await {
            metrics::RATE_CACHE_HITS.inc();
            return Ok(table);
        }
        metrics::RATE_CACHE_MISSES.inc();

        let table = self.inner.rates_for(base).await?;
        self.store(&key, &table).await;

        Ok(table)
    }
}

fn cache_key(base: &str) -> String {
    format!("{}:{}", CACHE_KEY_PREFIX, base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decodes_provider_payload() {
        let payload = r#"{
            "result": "success",
            "base_code": "EUR",
            "conversion_rates": {"USD": 1.0843, "AED": 3.9821, "EUR": 1}
        }"#;

        let table: RateTable = serde_json::from_str(payload).unwrap();
        assert_eq!(table.base_code, "EUR");
        assert_eq!(table.rate("AED"), Some(dec!(3.9821)));
        assert_eq!(table.rate("EUR"), Some(dec!(1)));
        assert_eq!(table.rate("GBP"), None);
        assert_eq!(table.quoted_currencies(), vec!["AED", "EUR", "USD"]);
    }

    #[test]
    fn test_unusable_rates_are_not_quoted() {
        let table: RateTable = serde_json::from_str(
            r#"{"base_code": "AED", "conversion_rates": {"EUR": 0.25, "GBP": 0, "USD": -1}}"#,
        )
        .unwrap();

        assert_eq!(table.quoted_currencies(), vec!["EUR"]);
        assert_eq!(table.rate("GBP"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_url_layout() {
        let client =
            ExchangeRateClient::new("https://rates.example/v6/".to_string(), "k3y".to_string(), 5)
                .unwrap();
        assert_eq!(client.latest_url("AED"), "https://rates.example/v6/k3y/latest/AED");
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("USD"), "account-engine:rates:USD");
    }

    #[tokio::test]
    async fn test_client_rejects_unknown_base_without_calling_out() {
        let client =
            ExchangeRateClient::new("http://127.0.0.1:9".to_string(), "k".to_string(), 1).unwrap();

        let err = client.rates_for("XYZ").await.unwrap_err();
        assert!(matches!(err, AccountEngineError::InvalidValue { field: "currency", .. }));
    }

    #[tokio::test]
    async fn test_transport_errors_are_logged_without_api_key() {
        let err = Client::new()
            .get("http://127.0.0.1:9/SECRETKEY123/latest/EUR")
            .send()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SECRETKEY123"));

        let rendered = redacted(err);
        assert!(!rendered.contains("SECRETKEY123"));
        assert!(!rendered.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_provider_reports_invalid_currency() {
        let client =
            ExchangeRateClient::new("http://127.0.0.1:9".to_string(), "k".to_string(), 1).unwrap();

        let err = client.rates_for("EUR").await.unwrap_err();
        assert_eq!(err.to_string(), "invalid currency: EUR, not found in api call");
    }

    // Redis tests need a reachable server and are ignored by default.
    // Run with: REDIS_URL=redis://... cargo test -- --ignored

    async fn redis_connection() -> ConnectionManager {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url).unwrap();
        ConnectionManager::new(client).await.unwrap()
    }

    async fn fresh_key(conn: &mut ConnectionManager, base: &str) -> String {
        let key = cache_key(base);
        let _: () = conn.del(&key).await.unwrap();
        key
    }

    fn usd_quote(base: &str) -> RateTable {
        let mut conversion_rates = BTreeMap::new();
        conversion_rates.insert("USD".to_string(), dec!(1.1));
        RateTable {
            result: Some("success".to_string()),
            base_code: base.to_string(),
            conversion_rates,
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_cache_hit_skips_provider() {
        let mut conn = redis_connection().await;
        let key = fresh_key(&mut conn, "CHF").await;

        let mut inner = MockRateTableSource::new();
        inner
            .expect_rates_for()
            .with(eq("CHF"))
            .times(1)
            .returning(|base| Ok(usd_quote(base)));
        let source = CachedRateSource::new(inner, conn.clone(), 60);

        let first = source.rates_for("CHF").await.unwrap();
        let second = source.rates_for("CHF").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.rate("USD"), Some(dec!(1.1)));

        let ttl: i64 = conn.ttl(&key).await.unwrap();
        assert!(ttl > 0 && ttl <= 60);
    }

    #[tokio::test]
    #[ignore]
    async fn test_failed_lookup_is_not_cached() {
        let mut conn = redis_connection().await;
        let key = fresh_key(&mut conn, "NOK").await;

        let mut inner = MockRateTableSource::new();
        inner
            .expect_rates_for()
            .times(2)
            .returning(|base| Err(AccountEngineError::InvalidCurrency(base.to_string())));
        let source = CachedRateSource::new(inner, conn.clone(), 60);

        for _ in 0..2 {
            let err = source.rates_for("NOK").await.unwrap_err();
            assert_eq!(err.to_string(), "invalid currency: NOK, not found in api call");
        }

        let cached: Option<String> = conn.get(&key).await.unwrap();
        assert_eq!(cached, None);
    }

    #[tokio::test]
    #[ignore]
    async fn test_unreadable_entry_falls_through_to_provider() {
        let mut conn = redis_connection().await;

        // GET on a hash fails with WRONGTYPE
        let wrong_type = fresh_key(&mut conn, "SEK").await;
        let _: () = conn.hset(&wrong_type, "rates", "x").await.unwrap();
        let garbage = fresh_key(&mut conn, "DKK").await;
        let _: () = conn.set(&garbage, "not a rate table").await.unwrap();

        let mut inner = MockRateTableSource::new();
        inner
            .expect_rates_for()
            .times(2)
            .returning(|base| Ok(usd_quote(base)));
        let source = CachedRateSource::new(inner, conn.clone(), 60);

        assert_eq!(source.rates_for("SEK").await.unwrap(), usd_quote("SEK"));
        assert_eq!(source.rates_for("DKK").await.unwrap(), usd_quote("DKK"));

        // The fresh tables replaced the bad entries.
        let stored: Option<String> = conn.get(&wrong_type).await.unwrap();
        let stored: RateTable = serde_json::from_str(&stored.unwrap()).unwrap();
        assert_eq!(stored.base_code, "SEK");
    }
}
