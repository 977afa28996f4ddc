use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AccountEngineError>;

#[derive(Error, Debug)]
pub enum AccountEngineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid {field} value : {value}, possible values [{}]", .possible.join(", "))]
    InvalidValue {
        field: &'static str,
        value: String,
        possible: Vec<String>,
    },

    #[error("invalid currency: {0}, not found in api call")]
    InvalidCurrency(String),

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("source and target accounts must be different")]
    SameAccount,

    #[error("amount out of range")]
    AmountOutOfRange,

    /// Unknown accounts are reported as forbidden so that probing ids does
    /// not reveal which accounts exist.
    #[error("invalid account id: {0}")]
    InvalidAccountId(i64),

    #[error("account {0} was modified concurrently, retry the operation")]
    ConcurrentModification(i64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AccountEngineError {
    fn from(err: serde_json::Error) -> Self {
        AccountEngineError::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Body returned for every rejected request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl ResponseError for AccountEngineError {
    fn error_response(&self) -> HttpResponse {
        let message = match self {
            // Infrastructure failures are logged where they happen; the
            // caller only learns that the request could not be served.
            AccountEngineError::Database(_)
            | AccountEngineError::Redis(_)
            | AccountEngineError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(ErrorBody {
            timestamp: Utc::now(),
            message,
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AccountEngineError::Validation(_) => StatusCode::BAD_REQUEST,
            AccountEngineError::InvalidValue { .. } => StatusCode::BAD_REQUEST,
            AccountEngineError::InvalidCurrency(_) => StatusCode::BAD_REQUEST,
            AccountEngineError::InsufficientBalance => StatusCode::BAD_REQUEST,
            AccountEngineError::SameAccount => StatusCode::BAD_REQUEST,
            AccountEngineError::AmountOutOfRange => StatusCode::BAD_REQUEST,
            AccountEngineError::InvalidAccountId(_) => StatusCode::FORBIDDEN,
            AccountEngineError::ConcurrentModification(_) => StatusCode::CONFLICT,
            AccountEngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AccountEngineError::Redis(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AccountEngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl AccountEngineError {
    /// Label used for the operation outcome metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            AccountEngineError::Validation(_) => "validation_error",
            AccountEngineError::InvalidValue { .. } => "invalid_value",
            AccountEngineError::InvalidCurrency(_) => "invalid_currency",
            AccountEngineError::InsufficientBalance => "insufficient_balance",
            AccountEngineError::SameAccount => "same_account",
            AccountEngineError::AmountOutOfRange => "amount_out_of_range",
            AccountEngineError::InvalidAccountId(_) => "invalid_account",
            AccountEngineError::ConcurrentModification(_) => "conflict",
            AccountEngineError::Database(_) => "database_error",
            AccountEngineError::Redis(_) => "cache_error",
            AccountEngineError::Internal(_) => "internal_error",
        }
    }
}
