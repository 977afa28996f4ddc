use crate::config::PaginationConfig;
use crate::database::AccountStore;
use crate::errors::{AccountEngineError, Result};
use crate::exchange::RateTableSource;
use crate::ledger::{apply_delta, Ledger};
use crate::metrics;
use crate::models::{
    Account, CreateAccountRequest, OperationRequest, Page, PageQuery, Pagination, Transaction,
};
use crate::rates::RateResolver;
use crate::transactions::TransactionLog;
use actix_web::ResponseError;
use std::sync::Arc;
use tracing::{error, info};

pub struct AccountService {
    store: Arc<dyn AccountStore>,
    ledger: Ledger,
    log: TransactionLog,
    rates: RateResolver,
    pagination: PaginationConfig,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        rates: Arc<dyn RateTableSource>,
        pagination: PaginationConfig,
    ) -> Self {
        AccountService {
            ledger: Ledger::new(store.clone()),
            log: TransactionLog::new(store.clone()),
            rates: RateResolver::new(rates),
            store,
            pagination,
        }
    }

    pub async fn create_account(&self, request: CreateAccountRequest) -> Result<Account> {
        let result: Result<Account> = async {
            let draft = request.validated()?;
            self.ledger.create(draft).await
        }
        .await;

        if result.is_ok() {
            metrics::ACCOUNTS_CREATED.inc();
        }
        record("create", result)
    }

    pub async fn get_account(&self, account_id: i64) -> Result<Account> {
        self.ledger.get_by_id(account_id).await
    }

    pub async fn list_accounts(&self, query: PageQuery) -> Result<Page<Account>> {
        self.ledger.list_all(self.paginate(query)).await
    }

    pub async fn list_accounts_by_owner(&self, owner_id: i64, query: PageQuery) -> Result<Page<Account>> {
        self.ledger.list_by_owner(owner_id, self.paginate(query)).await
    }

    /// Transactions of an existing account, oldest first.
    pub async fn account_history(&self, account_id: i64, query: PageQuery) -> Result<Page<Transaction>> {
        self.ledger.get_by_id(account_id).await?;
        self.log.history(account_id, self.paginate(query)).await
    }

    /// Credits the account with the amount converted into its currency.
    pub async fn deposit(&self, account_id: i64, request: OperationRequest) -> Result<Account> {
        let result: Result<Account> = async {
            let operation = request.validated()?;
            let mut account = self.ledger.get_by_id(account_id).await?;

            let exchange = self
                .rates
                .convert(&operation.currency, &account.currency, operation.amount)
                .await?;
            apply_delta(&mut account, exchange.converted_amount)?;

            let entry = TransactionLog::deposit(&account, &operation, &exchange);
            let receipt = self.store.commit_operation(&account, entry).await?;

            info!(
                "Deposited {} {} into account {} (rate {}, balance {})",
                operation.amount,
                operation.currency,
                account_id,
                exchange.rate,
                receipt.account.balance
            );

            Ok(receipt.account)
        }
        .await;

        record("deposit", result)
    }

    /// Debits the account; nothing is written when the balance would go
    /// negative.
    pub async fn withdraw(&self, account_id: i64, request: OperationRequest) -> Result<Account> {
        let result: Result<Account> = async {
            let operation = request.validated()?;
            let mut account = self.ledger.get_by_id(account_id).await?;

            let exchange = self
                .rates
                .convert(&operation.currency, &account.currency, operation.amount)
                .await?;
            apply_delta(&mut account, -exchange.converted_amount)?;

            let entry = TransactionLog::withdraw(&account, &operation, &exchange);
            let receipt = self.store.commit_operation(&account, entry).await?;

            info!(
                "Withdrew {} {} from account {} (rate {}, balance {})",
                operation.amount,
                operation.currency,
                account_id,
                exchange.rate,
                receipt.account.balance
            );

            Ok(receipt.account)
        }
        .await;

        record("withdraw", result)
    }

    /// Moves funds between two accounts and returns the updated source.
    ///
    /// The source is charged at the operation currency to source currency
    /// rate; the target is credited at the target currency to operation
    /// currency rate. Both balances and both records commit together.
    pub async fn wire_transfer(
        &self,
        account_id: i64,
        target_account_id: i64,
        request: OperationRequest,
    ) -> Result<Account> {
        let result: Result<Account> = async {
            let operation = request.validated()?;
            if account_id == target_account_id {
                return Err(AccountEngineError::SameAccount);
            }

            let mut source = self.ledger.get_by_id(account_id).await?;
            let mut target = self.ledger.get_by_id(target_account_id).await?;

            let source_exchange = self
                .rates
                .convert(&operation.currency, &source.currency, operation.amount)
                .await?;
            let target_exchange = self
                .rates
                .convert(&target.currency, &operation.currency, operation.amount)
                .await?;

            apply_delta(&mut source, -source_exchange.converted_amount)?;
            apply_delta(&mut target, target_exchange.converted_amount)?;

            let legs = TransactionLog::wire_transfer(
                &source,
                &target,
                &operation,
                &source_exchange,
                &target_exchange,
            );
            let receipt = self.store.commit_transfer(&source, &target, legs).await?;

            info!(
                "Transferred {} {} from account {} to account {}",
                operation.amount, operation.currency, account_id, target_account_id
            );

            Ok(receipt.source)
        }
        .await;

        record("wire_transfer", result)
    }

    fn paginate(&self, query: PageQuery) -> Pagination {
        Pagination::resolve(query, &self.pagination)
    }
}

fn record<T>(operation: &str, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => metrics::record_operation(operation, "success"),
        Err(e) => {
            if e.status_code().is_server_error() {
                error!("{} failed: {}", operation, e);
            }
            metrics::record_operation(operation, e.error_type());
        }
    }
    result
}
