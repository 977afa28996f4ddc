use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_metrics(&registry).expect("metrics can be registered");
        registry
    };

    // Business metrics
    pub static ref ACCOUNT_OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("account_operations_total", "Account operations by outcome"),
        &["operation", "status"]
    ).expect("metric can be created");

    pub static ref ACCOUNTS_CREATED: IntCounter = IntCounter::new(
        "accounts_created_total",
        "Total accounts created"
    ).expect("metric can be created");

    // Exchange rate provider metrics
    pub static ref RATE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("rate_lookups_total", "Exchange rate provider calls by outcome"),
        &["status"]
    ).expect("metric can be created");

    // Redis cache metrics
    pub static ref RATE_CACHE_HITS: IntCounter = IntCounter::new(
        "rate_cache_hits_total",
        "Total rate table cache hits"
    ).expect("metric can be created");

    pub static ref RATE_CACHE_MISSES: IntCounter = IntCounter::new(
        "rate_cache_misses_total",
        "Total rate table cache misses"
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(ACCOUNT_OPERATIONS.clone()))?;
    registry.register(Box::new(ACCOUNTS_CREATED.clone()))?;
    registry.register(Box::new(RATE_LOOKUPS.clone()))?;
    registry.register(Box::new(RATE_CACHE_HITS.clone()))?;
    registry.register(Box::new(RATE_CACHE_MISSES.clone()))?;
    Ok(())
}

pub fn record_operation(operation: &str, status: &str) {
    ACCOUNT_OPERATIONS.with_label_values(&[operation, status]).inc();
}

pub fn record_rate_lookup(status: &str) {
    RATE_LOOKUPS.with_label_values(&[status]).inc();
}

/// Generate metrics output in Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let registry = Registry::new();
        assert!(register_metrics(&registry).is_ok());
    }

    #[test]
    fn test_metrics_handler() {
        ACCOUNTS_CREATED.inc();
        record_operation("deposit", "success");

        let output = metrics_handler().unwrap();
        assert!(output.contains("accounts_created_total"));
        assert!(output.contains("account_operations_total"));
    }
}
