use crate::currency::{self, CurrencyExchange, CURRENCY_FIELD};
use crate::errors::{AccountEngineError, Result};
use crate::exchange::RateTableSource;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Turns a currency pair into a multiplier.
pub struct RateResolver {
    source: Arc<dyn RateTableSource>,
}

impl RateResolver {
    pub fn new(source: Arc<dyn RateTableSource>) -> Self {
        RateResolver { source }
    }

    /// Multiplier converting `from` units into `to` units.
    ///
    /// Equal currencies resolve to 1 without consulting the provider.
    /// Otherwise the table for `from` must quote a positive rate for `to`;
    /// the rejection lists the currencies that table does quote.
    pub async fn rate(&self, from: &str, to: &str) -> Result<Decimal> {
        currency::validate(from)?;
        currency::validate(to)?;

        if from.eq_ignore_ascii_case(to) {
            return Ok(Decimal::ONE);
        }

        let table = self.source.rates_for(from).await?;
        match table.rate(to) {
            Some(rate) if rate > Decimal::ZERO => {
                debug!("Resolved rate {} -> {} = {}", from, to, rate);
                Ok(rate)
            }
            _ => Err(AccountEngineError::InvalidValue {
                field: CURRENCY_FIELD,
                value: to.to_string(),
                possible: table.quoted_currencies(),
            }),
        }
    }

    /// Converts `amount` of `from` into `to`.
    pub async fn convert(&self, from: &str, to: &str, amount: Decimal) -> Result<CurrencyExchange> {
        let rate = self.rate(from, to).await?;
        CurrencyExchange::new(from, to, rate, amount)
    }
}
