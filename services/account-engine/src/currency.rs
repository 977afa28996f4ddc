//! Currency catalog and conversion results.
//!
//! The catalog is the closed set of ISO 4217 codes the exchange rate
//! provider quotes. Every currency that enters the service (account
//! creation, operation requests, rate lookups) is checked against it.

use crate::errors::{AccountEngineError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Field name reported when a currency code is rejected.
pub const CURRENCY_FIELD: &str = "currency";

/// Recognized currency codes, sorted lexicographically.
pub const CURRENCY_CODES: &[&str] = &[
    "AED", "AFN", "ALL", "AMD", "ANG", "AOA", "ARS", "AUD", "AWG", "AZN",
    "BAM", "BBD", "BDT", "BGN", "BHD", "BIF", "BMD", "BND", "BOB", "BRL",
    "BSD", "BTN", "BWP", "BYN", "BZD", "CAD", "CDF", "CHF", "CLP", "CNY",
    "COP", "CRC", "CUP", "CVE", "CZK", "DJF", "DKK", "DOP", "DZD", "EGP",
    "ERN", "ETB", "EUR", "FJD", "FKP", "FOK", "GBP", "GEL", "GGP", "GHS",
    "GIP", "GMD", "GNF", "GTQ", "GYD", "HKD", "HNL", "HRK", "HTG", "HUF",
    "IDR", "ILS", "IMP", "INR", "IQD", "IRR", "ISK", "JEP", "JMD", "JOD",
    "JPY", "KES", "KGS", "KHR", "KID", "KMF", "KRW", "KWD", "KYD", "KZT",
    "LAK", "LBP", "LKR", "LRD", "LSL", "LYD", "MAD", "MDL", "MGA", "MKD",
    "MMK", "MNT", "MOP", "MRU", "MUR", "MVR", "MWK", "MXN", "MYR", "MZN",
    "NAD", "NGN", "NIO", "NOK", "NPR", "NZD", "OMR", "PAB", "PEN", "PGK",
    "PHP", "PKR", "PLN", "PYG", "QAR", "RON", "RSD", "RUB", "RWF", "SAR",
    "SBD", "SCR", "SDG", "SEK", "SGD", "SHP", "SLE", "SLL", "SOS", "SRD",
    "SSP", "STN", "SYP", "SZL", "THB", "TJS", "TMT", "TND", "TOP", "TRY",
    "TTD", "TVD", "TWD", "TZS", "UAH", "UGX", "USD", "UYU", "UZS", "VES",
    "VND", "VUV", "WST", "XAF", "XCD", "XDR", "XOF", "XPF", "YER", "ZAR",
    "ZMW", "ZWL",
];

/// Returns true when `code` is a recognized currency code.
///
/// Matching is exact: codes are upper case, as the provider quotes them.
pub fn is_valid(code: &str) -> bool {
    CURRENCY_CODES.binary_search(&code).is_ok()
}

/// All recognized codes in lexicographic order.
pub fn all_codes() -> Vec<String> {
    CURRENCY_CODES.iter().map(|code| code.to_string()).collect()
}

/// Rejects unknown codes with an error listing every valid code.
pub fn validate(code: &str) -> Result<()> {
    if is_valid(code) {
        return Ok(());
    }

    Err(AccountEngineError::InvalidValue {
        field: CURRENCY_FIELD,
        value: code.to_string(),
        possible: all_codes(),
    })
}

/// Outcome of converting an operation amount into another currency.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyExchange {
    pub currency: String,
    pub to_currency: String,
    pub rate: Decimal,
    pub amount: Decimal,
    pub converted_amount: Decimal,
}

impl CurrencyExchange {
    pub fn new(currency: &str, to_currency: &str, rate: Decimal, amount: Decimal) -> Result<Self> {
        let converted_amount = rate
            .checked_mul(amount)
            .ok_or(AccountEngineError::AmountOutOfRange)?;

        Ok(CurrencyExchange {
            currency: currency.to_string(),
            to_currency: to_currency.to_string(),
            rate,
            amount,
            converted_amount,
        })
    }

    /// Same-currency conversion: rate 1, amount unchanged.
    pub fn identity(currency: &str, amount: Decimal) -> Self {
        CurrencyExchange {
            currency: currency.to_string(),
            to_currency: currency.to_string(),
            rate: Decimal::ONE,
            amount,
            converted_amount: amount,
        }
    }
}
