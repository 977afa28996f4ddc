use crate::config::PaginationConfig;
use crate::errors::{AccountEngineError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use validator::{Validate, ValidationError, ValidationErrors};

/// Field name reported when an account type is rejected.
pub const ACCOUNT_TYPE_FIELD: &str = "account type";

/// Account type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Credit,
    Debit,
}

impl AccountType {
    /// Sorted by name.
    pub const ALL: [AccountType; 2] = [AccountType::Credit, AccountType::Debit];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Credit => "CREDIT",
            AccountType::Debit => "DEBIT",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|account_type| account_type.as_str() == value)
            .ok_or_else(|| AccountEngineError::InvalidValue {
                field: ACCOUNT_TYPE_FIELD,
                value: value.to_string(),
                possible: Self::ALL.iter().map(|t| t.as_str().to_string()).collect(),
            })
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    WireTransfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdraw => "WITHDRAW",
            TransactionType::WireTransfer => "WIRE_TRANSFER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DEPOSIT" => Some(TransactionType::Deposit),
            "WITHDRAW" => Some(TransactionType::Withdraw),
            "WIRE_TRANSFER" => Some(TransactionType::WireTransfer),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account record. The balance is never negative once an operation
/// completes; `version` is bumped by every persisted balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub owner_id: i64,
    pub currency: String,
    pub balance: Decimal,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(skip)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// Account not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub owner_id: i64,
    pub currency: String,
    pub account_type: AccountType,
    pub created_at: DateTime<Utc>,
}

/// Immutable record of a balance-affecting operation.
///
/// `to_account_id` is set on the outgoing leg of a wire transfer and
/// `from_account_id` on the incoming leg; never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub to_account_id: Option<i64>,
    pub from_account_id: Option<i64>,
    pub amount: Decimal,
    pub operation_currency: String,
    pub currency_exchange_rate: Decimal,
    pub evaluated_amount: Decimal,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub initiation_date: DateTime<Utc>,
    pub completion_date: DateTime<Utc>,
}

/// Transaction not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub account_id: i64,
    pub to_account_id: Option<i64>,
    pub from_account_id: Option<i64>,
    pub amount: Decimal,
    pub operation_currency: String,
    pub currency_exchange_rate: Decimal,
    pub evaluated_amount: Decimal,
    pub transaction_type: TransactionType,
    pub initiation_date: DateTime<Utc>,
    pub completion_date: DateTime<Utc>,
}

/// Both legs of a wire transfer, written together.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferLegs {
    pub outgoing: NewTransaction,
    pub incoming: NewTransaction,
}

/// Result of a committed deposit or withdraw.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationReceipt {
    pub account: Account,
    pub transaction: Transaction,
}

/// Result of a committed wire transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub source: Account,
    pub target: Account,
    pub outgoing: Transaction,
    pub incoming: Transaction,
}

/// Account creation request
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    #[validate(required)]
    pub owner_id: Option<i64>,
    #[validate(required, custom = "not_blank")]
    pub currency: Option<String>,
    #[serde(rename = "type")]
    #[validate(required, custom = "not_blank")]
    pub account_type: Option<String>,
}

/// Deposit, withdraw and wire transfer request body
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct OperationRequest {
    #[validate(required, custom = "non_negative")]
    pub amount: Option<Decimal>,
    #[validate(required, custom = "not_blank")]
    pub currency: Option<String>,
}

/// Validated account creation input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDraft {
    pub owner_id: i64,
    pub currency: String,
    pub account_type: String,
}

/// Validated operation input.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub amount: Decimal,
    pub currency: String,
}

impl Operation {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        Operation {
            amount,
            currency: currency.to_string(),
        }
    }
}

impl CreateAccountRequest {
    pub fn validated(self) -> Result<AccountDraft> {
        check(&self)?;
        match (self.owner_id, self.currency, self.account_type) {
            (Some(owner_id), Some(currency), Some(account_type)) => Ok(AccountDraft {
                owner_id,
                currency,
                account_type,
            }),
            _ => Err(AccountEngineError::Validation("missing fields".to_string())),
        }
    }
}

impl OperationRequest {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        OperationRequest {
            amount: Some(amount),
            currency: Some(currency.to_string()),
        }
    }

    pub fn validated(self) -> Result<Operation> {
        check(&self)?;
        match (self.amount, self.currency) {
            (Some(amount), Some(currency)) => Ok(Operation { amount, currency }),
            _ => Err(AccountEngineError::Validation("missing fields".to_string())),
        }
    }
}

fn check<T: Validate>(request: &T) -> Result<()> {
    request
        .validate()
        .map_err(|errors| AccountEngineError::Validation(describe_violations(&errors)))
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some(Cow::Borrowed("must not be blank"));
        return Err(error);
    }
    Ok(())
}

fn non_negative(value: &Decimal) -> std::result::Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut error = ValidationError::new("negative");
        error.message = Some(Cow::Borrowed("must be greater than or equal to 0"));
        return Err(error);
    }
    Ok(())
}

/// Renders every violated field, sorted by wire name, as
/// `field: reason` pairs.
pub fn describe_violations(errors: &ValidationErrors) -> String {
    let mut violations: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .map(|(field, field_errors)| {
            let reasons = field_errors
                .iter()
                .map(|error| match &error.message {
                    Some(message) => message.to_string(),
                    None if error.code == "required" => "must not be null".to_string(),
                    None => error.code.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            (wire_name(field), reasons)
        })
        .collect();
    violations.sort();

    violations
        .into_iter()
        .map(|(field, reasons)| format!("{}: {}", field, reasons))
        .collect::<Vec<_>>()
        .join("; ")
}

fn wire_name(field: &str) -> String {
    if field == "account_type" {
        return "type".to_string();
    }

    let mut name = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            name.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            name.push(c);
        }
    }
    name
}

/// Raw pagination query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
}

impl Pagination {
    /// Negative pages fall back to the first page, non-positive sizes to
    /// the default size and oversized pages are capped.
    pub fn resolve(query: PageQuery, config: &PaginationConfig) -> Self {
        let page = query
            .page
            .filter(|page| *page >= 0)
            .map(|page| page.min(u32::MAX as i64) as u32)
            .unwrap_or(0);
        let size = query
            .size
            .filter(|size| *size > 0)
            .map(|size| size.min(config.max_size as i64) as u32)
            .unwrap_or(config.default_size);

        Pagination { page, size }
    }

    pub fn limit(&self) -> i64 {
        self.size as i64
    }

    pub fn offset(&self) -> i64 {
        self.page as i64 * self.size as i64
    }
}

/// One page of results ordered by identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pagination: Pagination, total_elements: i64) -> Self {
        let size = pagination.size.max(1) as i64;
        Page {
            content,
            page: pagination.page,
            size: pagination.size,
            total_elements,
            total_pages: (total_elements + size - 1) / size,
        }
    }
}
