pub mod config;
pub mod currency;
pub mod database;
pub mod errors;
pub mod exchange;
pub mod handlers;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod rates;
pub mod services;
pub mod transactions;

pub use config::Config;
pub use errors::{AccountEngineError, Result};
