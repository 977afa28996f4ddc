use crate::errors::{AccountEngineError, Result};
use crate::models::{
    Account, AccountType, NewAccount, NewTransaction, OperationReceipt, Page, Pagination,
    Transaction, TransactionType, TransferLegs, TransferReceipt,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{FromRow, Pool, Postgres};
use std::time::Duration;

/// Persistence for accounts and their transaction history.
///
/// The `commit_*` methods write balance changes and transaction records as
/// a single unit. Balance updates are conditional on the account version
/// read by the caller; a stale version aborts the whole unit with
/// `ConcurrentModification`.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, account: NewAccount) -> Result<Account>;

    async fn find_account(&self, account_id: i64) -> Result<Option<Account>>;

    async fn list_accounts(&self, pagination: Pagination) -> Result<Page<Account>>;

    async fn list_accounts_by_owner(&self, owner_id: i64, pagination: Pagination)
        -> Result<Page<Account>>;

    async fn list_transactions(&self, account_id: i64, pagination: Pagination)
        -> Result<Page<Transaction>>;

    async fn commit_operation(&self, account: &Account, entry: NewTransaction)
        -> Result<OperationReceipt>;

    /// Target is written before source.
    async fn commit_transfer(
        &self,
        source: &Account,
        target: &Account,
        legs: TransferLegs,
    ) -> Result<TransferReceipt>;
}

const ACCOUNT_COLUMNS: &str = "id, owner_id, currency, balance, account_type, version, created_at";

const TRANSACTION_COLUMNS: &str = "id, account_id, to_account_id, from_account_id, amount, \
     operation_currency, currency_exchange_rate, evaluated_amount, transaction_type, \
     initiation_date, completion_date";

#[derive(Debug, FromRow)]
struct AccountRow {
    id: i64,
    owner_id: i64,
    currency: String,
    balance: Decimal,
    account_type: String,
    version: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = AccountEngineError;

    fn try_from(row: AccountRow) -> Result<Self> {
        let account_type = AccountType::parse(&row.account_type).map_err(|_| {
            AccountEngineError::Internal(format!(
                "account {} has unknown type {}",
                row.id, row.account_type
            ))
        })?;

        Ok(Account {
            id: row.id,
            owner_id: row.owner_id,
            currency: row.currency,
            balance: row.balance,
            account_type,
            version: row.version,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: i64,
    account_id: i64,
    to_account_id: Option<i64>,
    from_account_id: Option<i64>,
    amount: Decimal,
    operation_currency: String,
    currency_exchange_rate: Decimal,
    evaluated_amount: Decimal,
    transaction_type: String,
    initiation_date: DateTime<Utc>,
    completion_date: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = AccountEngineError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        let transaction_type = TransactionType::parse(&row.transaction_type).ok_or_else(|| {
            AccountEngineError::Internal(format!(
                "transaction {} has unknown type {}",
                row.id, row.transaction_type
            ))
        })?;

        Ok(Transaction {
            id: row.id,
            account_id: row.account_id,
            to_account_id: row.to_account_id,
            from_account_id: row.from_account_id,
            amount: row.amount,
            operation_currency: row.operation_currency,
            currency_exchange_rate: row.currency_exchange_rate,
            evaluated_amount: row.evaluated_amount,
            transaction_type,
            initiation_date: row.initiation_date,
            completion_date: row.completion_date,
        })
    }
}

pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32, min_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    /// Create tables if they do not exist yet
    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id BIGSERIAL PRIMARY KEY,
                owner_id BIGINT NOT NULL,
                currency VARCHAR(3) NOT NULL,
                balance NUMERIC NOT NULL DEFAULT 0 CHECK (balance >= 0),
                account_type TEXT NOT NULL,
                version BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_owner ON accounts (owner_id, id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id BIGSERIAL PRIMARY KEY,
                account_id BIGINT NOT NULL REFERENCES accounts (id),
                to_account_id BIGINT REFERENCES accounts (id),
                from_account_id BIGINT REFERENCES accounts (id),
                amount NUMERIC NOT NULL,
                operation_currency VARCHAR(3) NOT NULL,
                currency_exchange_rate NUMERIC NOT NULL,
                evaluated_amount NUMERIC NOT NULL,
                transaction_type TEXT NOT NULL,
                initiation_date TIMESTAMPTZ NOT NULL,
                completion_date TIMESTAMPTZ NOT NULL,
                CHECK (to_account_id IS NULL OR from_account_id IS NULL)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions (account_id, id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Writes the new balance if the stored version still matches.
async fn update_balance(conn: &mut PgConnection, account: &Account) -> Result<Account> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        r#"
        UPDATE accounts
        SET balance = $1, version = version + 1
        WHERE id = $2 AND version = $3
        RETURNING {}
        "#,
        ACCOUNT_COLUMNS
    ))
    .bind(account.balance)
    .bind(account.id)
    .bind(account.version)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Account::try_from(row),
        None => Err(AccountEngineError::ConcurrentModification(account.id)),
    }
}

async fn insert_transaction(conn: &mut PgConnection, entry: &NewTransaction) -> Result<Transaction> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        INSERT INTO transactions (
            account_id, to_account_id, from_account_id, amount,
            operation_currency, currency_exchange_rate, evaluated_amount,
            transaction_type, initiation_date, completion_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    ))
    .bind(entry.account_id)
    .bind(entry.to_account_id)
    .bind(entry.from_account_id)
    .bind(entry.amount)
    .bind(&entry.operation_currency)
    .bind(entry.currency_exchange_rate)
    .bind(entry.evaluated_amount)
    .bind(entry.transaction_type.as_str())
    .bind(entry.initiation_date)
    .bind(entry.completion_date)
    .fetch_one(&mut *conn)
    .await?;

    Transaction::try_from(row)
}

fn accounts_from_rows(rows: Vec<AccountRow>) -> Result<Vec<Account>> {
    rows.into_iter().map(Account::try_from).collect()
}

#[async_trait]
impl AccountStore for Database {
    async fn insert_account(&self, account: NewAccount) -> Result<Account> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO accounts (owner_id, currency, balance, account_type, version, created_at)
            VALUES ($1, $2, 0, $3, 0, $4)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.owner_id)
        .bind(&account.currency)
        .bind(account.account_type.as_str())
        .bind(account.created_at)
        .fetch_one(&self.pool)
        .await?;

        Account::try_from(row)
    }

    async fn find_account(&self, account_id: i64) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn list_accounts(&self, pagination: Pagination) -> Result<Page<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts ORDER BY id LIMIT $1 OFFSET $2",
            ACCOUNT_COLUMNS
        ))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;

        Ok(Page::new(accounts_from_rows(rows)?, pagination, total))
    }

    async fn list_accounts_by_owner(
        &self,
        owner_id: i64,
        pagination: Pagination,
    ) -> Result<Page<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE owner_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
            ACCOUNT_COLUMNS
        ))
        .bind(owner_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Page::new(accounts_from_rows(rows)?, pagination, total))
    }

    async fn list_transactions(
        &self,
        account_id: i64,
        pagination: Pagination,
    ) -> Result<Page<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE account_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
            TRANSACTION_COLUMNS
        ))
        .bind(account_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE account_id = $1")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await?;

        let transactions = rows
            .into_iter()
            .map(Transaction::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(transactions, pagination, total))
    }

    async fn commit_operation(
        &self,
        account: &Account,
        entry: NewTransaction,
    ) -> Result<OperationReceipt> {
        let mut tx = self.pool.begin().await?;

        let account = update_balance(&mut *tx, account).await?;
        let transaction = insert_transaction(&mut *tx, &entry).await?;

        tx.commit().await?;

        Ok(OperationReceipt {
            account,
            transaction,
        })
    }

    async fn commit_transfer(
        &self,
        source: &Account,
        target: &Account,
        legs: TransferLegs,
    ) -> Result<TransferReceipt> {
        let mut tx = self.pool.begin().await?;

        let outgoing = insert_transaction(&mut *tx, &legs.outgoing).await?;
        let incoming = insert_transaction(&mut *tx, &legs.incoming).await?;
        let target = update_balance(&mut *tx, target).await?;
        let source = update_balance(&mut *tx, source).await?;

        tx.commit().await?;

        Ok(TransferReceipt {
            source,
            target,
            outgoing,
            incoming,
        })
    }
}
