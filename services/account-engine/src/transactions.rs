use crate::currency::CurrencyExchange;
use crate::database::AccountStore;
use crate::errors::Result;
use crate::models::{
    Account, NewTransaction, Operation, Page, Pagination, Transaction, TransactionType,
    TransferLegs,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Builds transaction records and reads account history.
///
/// Records are persisted together with the balance change they describe,
/// see [`AccountStore::commit_operation`] and [`AccountStore::commit_transfer`].
pub struct TransactionLog {
    store: Arc<dyn AccountStore>,
}

impl TransactionLog {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        TransactionLog { store }
    }

    pub fn deposit(account: &Account, operation: &Operation, exchange: &CurrencyExchange) -> NewTransaction {
        entry(account, operation, exchange, TransactionType::Deposit, Utc::now())
    }

    pub fn withdraw(account: &Account, operation: &Operation, exchange: &CurrencyExchange) -> NewTransaction {
        entry(account, operation, exchange, TransactionType::Withdraw, Utc::now())
    }

    /// Outgoing leg on the source, incoming leg on the target. Each leg is
    /// evaluated with its own exchange.
    pub fn wire_transfer(
        source: &Account,
        target: &Account,
        operation: &Operation,
        source_exchange: &CurrencyExchange,
        target_exchange: &CurrencyExchange,
    ) -> TransferLegs {
        let now = Utc::now();

        let mut outgoing = entry(source, operation, source_exchange, TransactionType::WireTransfer, now);
        outgoing.to_account_id = Some(target.id);

        let mut incoming = entry(target, operation, target_exchange, TransactionType::WireTransfer, now);
        incoming.from_account_id = Some(source.id);

        TransferLegs { outgoing, incoming }
    }

    /// Caller checks the account exists.
    pub async fn history(&self, account_id: i64, pagination: Pagination) -> Result<Page<Transaction>> {
        self.store.list_transactions(account_id, pagination).await
    }
}

fn entry(
    account: &Account,
    operation: &Operation,
    exchange: &CurrencyExchange,
    transaction_type: TransactionType,
    at: DateTime<Utc>,
) -> NewTransaction {
    NewTransaction {
        account_id: account.id,
        to_account_id: None,
        from_account_id: None,
        amount: operation.amount,
        operation_currency: operation.currency.clone(),
        currency_exchange_rate: exchange.rate,
        evaluated_amount: exchange.converted_amount,
        transaction_type,
        initiation_date: at,
        completion_date: at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::InMemoryStore;
    use crate::models::{AccountType, NewAccount};
    use rust_decimal_macros::dec;

    fn account(id: i64, currency: &str) -> Account {
        Account {
            id,
            owner_id: 1,
            currency: currency.to_string(),
            balance: dec!(100),
            account_type: AccountType::Debit,
            version: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_withdraw_record() {
        let account = account(3, "AED");
        let operation = Operation::new(dec!(5), "EUR");
        let exchange = CurrencyExchange::new("EUR", "AED", dec!(2), dec!(5)).unwrap();

        let record = TransactionLog::withdraw(&account, &operation, &exchange);
        assert_eq!(record.account_id, 3);
        assert_eq!(record.transaction_type, TransactionType::Withdraw);
        assert_eq!(record.amount, dec!(5));
        assert_eq!(record.operation_currency, "EUR");
        assert_eq!(record.currency_exchange_rate, dec!(2));
        assert_eq!(record.evaluated_amount, dec!(10));
        assert_eq!(record.to_account_id, None);
        assert_eq!(record.from_account_id, None);
    }

    #[test]
    fn test_deposit_same_currency() {
        let account = account(1, "AED");
        let operation = Operation::new(dec!(10), "AED");
        let exchange = CurrencyExchange::identity("AED", dec!(10));

        let record = TransactionLog::deposit(&account, &operation, &exchange);
        assert_eq!(record.transaction_type, TransactionType::Deposit);
        assert_eq!(record.currency_exchange_rate, dec!(1));
        assert_eq!(record.evaluated_amount, dec!(10));
    }

    #[test]
    fn test_wire_transfer_legs_reference_counterparty() {
        let source = account(1, "AED");
        let target = account(2, "USD");
        let operation = Operation::new(dec!(10), "EUR");
        let source_exchange = CurrencyExchange::new("EUR", "AED", dec!(2), dec!(10)).unwrap();
        let target_exchange = CurrencyExchange::new("USD", "EUR", dec!(0.5), dec!(10)).unwrap();

        let legs = TransactionLog::wire_transfer(&source, &target, &operation, &source_exchange, &target_exchange);

        assert_eq!(legs.outgoing.account_id, 1);
        assert_eq!(legs.outgoing.to_account_id, Some(2));
        assert_eq!(legs.outgoing.from_account_id, None);
        assert_eq!(legs.outgoing.evaluated_amount, dec!(20));

        assert_eq!(legs.incoming.account_id, 2);
        assert_eq!(legs.incoming.from_account_id, Some(1));
        assert_eq!(legs.incoming.to_account_id, None);
        assert_eq!(legs.incoming.currency_exchange_rate, dec!(0.5));
        assert_eq!(legs.incoming.evaluated_amount, dec!(5.0));

        assert_eq!(legs.outgoing.transaction_type, TransactionType::WireTransfer);
        assert_eq!(legs.incoming.initiation_date, legs.outgoing.initiation_date);
    }

    #[tokio::test]
    async fn test_history_only_lists_own_records() {
        let store = Arc::new(InMemoryStore::new());
        let mut accounts = Vec::new();
        for currency in ["AED", "EUR"] {
            let account = store
                .insert_account(NewAccount {
                    owner_id: 1,
                    currency: currency.to_string(),
                    account_type: AccountType::Credit,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
            accounts.push(account);
        }

        let operation = Operation::new(dec!(1), "AED");
        let exchange = CurrencyExchange::identity("AED", dec!(1));
        let first = store
            .commit_operation(&accounts[0], TransactionLog::deposit(&accounts[0], &operation, &exchange))
            .await
            .unwrap();
        store
            .commit_operation(&accounts[1], TransactionLog::deposit(&accounts[1], &operation, &exchange))
            .await
            .unwrap();

        let log = TransactionLog::new(store);
        let history = log
            .history(accounts[0].id, Pagination { page: 0, size: 20 })
            .await
            .unwrap();
        assert_eq!(history.content, vec![first.transaction]);
        assert_eq!(history.total_elements, 1);
    }
}
