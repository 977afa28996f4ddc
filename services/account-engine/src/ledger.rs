use crate::currency;
use crate::database::AccountStore;
use crate::errors::{AccountEngineError, Result};
use crate::models::{Account, AccountDraft, AccountType, NewAccount, Page, Pagination};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Account records and the non-negative balance rule.
pub struct Ledger {
    store: Arc<dyn AccountStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Ledger { store }
    }

    /// Opens an account with a zero balance.
    pub async fn create(&self, draft: AccountDraft) -> Result<Account> {
        let account = open_account(draft)?;
        let account = self.store.insert_account(account).await?;

        info!(
            "Created {} account {} for owner {} in {}",
            account.account_type, account.id, account.owner_id, account.currency
        );

        Ok(account)
    }

    /// Unknown identifiers are reported as forbidden, not missing.
    pub async fn get_by_id(&self, account_id: i64) -> Result<Account> {
        self.store
            .find_account(account_id)
            .await?
            .ok_or(AccountEngineError::InvalidAccountId(account_id))
    }

    pub async fn list_all(&self, pagination: Pagination) -> Result<Page<Account>> {
        self.store.list_accounts(pagination).await
    }

    pub async fn list_by_owner(&self, owner_id: i64, pagination: Pagination) -> Result<Page<Account>> {
        self.store.list_accounts_by_owner(owner_id, pagination).await
    }
}

/// Checks the draft and builds the record to insert.
pub fn open_account(draft: AccountDraft) -> Result<NewAccount> {
    currency::validate(&draft.currency)?;
    let account_type = AccountType::parse(&draft.account_type)?;

    Ok(NewAccount {
        owner_id: draft.owner_id,
        currency: draft.currency,
        account_type,
        created_at: Utc::now(),
    })
}

/// Adds `delta` to the balance. The account is untouched on failure.
pub fn apply_delta(account: &mut Account, delta: Decimal) -> Result<()> {
    let balance = account
        .balance
        .checked_add(delta)
        .ok_or(AccountEngineError::AmountOutOfRange)?;

    if balance.is_sign_negative() && !balance.is_zero() {
        return Err(AccountEngineError::InsufficientBalance);
    }

    account.balance = balance;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::InMemoryStore;
    use rust_decimal_macros::dec;

    fn draft(currency: &str, account_type: &str) -> AccountDraft {
        AccountDraft {
            owner_id: 1,
            currency: currency.to_string(),
            account_type: account_type.to_string(),
        }
    }

    fn account(balance: Decimal) -> Account {
        Account {
            id: 1,
            owner_id: 1,
            currency: "AED".to_string(),
            balance,
            account_type: AccountType::Debit,
            version: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_delta() {
        let mut account = account(dec!(10));

        apply_delta(&mut account, dec!(5.5)).unwrap();
        assert_eq!(account.balance, dec!(15.5));

        apply_delta(&mut account, dec!(-15.5)).unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
    }

    #[test]
    fn test_apply_delta_rejects_overdraft_without_change() {
        let mut account = account(dec!(10));

        let err = apply_delta(&mut account, dec!(-10.01)).unwrap_err();
        assert!(matches!(err, AccountEngineError::InsufficientBalance));
        assert_eq!(account.balance, dec!(10));
    }

    #[test]
    fn test_apply_delta_overflow() {
        let mut account = account(Decimal::MAX);

        let err = apply_delta(&mut account, Decimal::MAX).unwrap_err();
        assert!(matches!(err, AccountEngineError::AmountOutOfRange));
        assert_eq!(account.balance, Decimal::MAX);
    }

    #[test]
    fn test_open_account_checks_currency_before_type() {
        let err = open_account(draft("test", "nope")).unwrap_err();
        assert!(err.to_string().starts_with("invalid currency value : test"));

        let err = open_account(draft("AED", "SAVINGS")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid account type value : SAVINGS, possible values [CREDIT, DEBIT]"
        );
    }

    #[tokio::test]
    async fn test_create_starts_at_zero() {
        let ledger = Ledger::new(Arc::new(InMemoryStore::new()));

        let account = ledger.create(draft("AED", "DEBIT")).await.unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.account_type, AccountType::Debit);
        assert_eq!(ledger.get_by_id(account.id).await.unwrap(), account);
    }

    #[tokio::test]
    async fn test_get_unknown_account_is_forbidden() {
        let ledger = Ledger::new(Arc::new(InMemoryStore::new()));

        let err = ledger.get_by_id(42).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid account id: 42");
    }

    #[tokio::test]
    async fn test_list_by_owner_pages_in_id_order() {
        let ledger = Ledger::new(Arc::new(InMemoryStore::new()));
        for (owner, currency) in [(1, "AED"), (2, "EUR"), (1, "USD"), (1, "EUR")] {
            let mut request = draft(currency, "CREDIT");
            request.owner_id = owner;
            ledger.create(request).await.unwrap();
        }

        let page = ledger
            .list_by_owner(1, Pagination { page: 0, size: 2 })
            .await
            .unwrap();
        let currencies: Vec<_> = page.content.iter().map(|a| a.currency.as_str()).collect();
        assert_eq!(currencies, vec!["AED", "USD"]);
        assert_eq!(page.total_elements, 3);
        assert_eq!(page.total_pages, 2);

        let all = ledger.list_all(Pagination { page: 1, size: 3 }).await.unwrap();
        assert_eq!(all.content.len(), 1);
        assert_eq!(all.content[0].currency, "EUR");
    }
}
