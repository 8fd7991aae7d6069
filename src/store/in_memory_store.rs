use std::{
    collections::{HashMap, hash_map::Entry},
    sync::RwLock,
};

use crate::{
    account::{Account, AccountId},
    transaction::Transaction,
};

use super::{LedgerStore, StoreError};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<AccountId, Vec<Transaction>>,
}

/// Process-lifetime store. A single reader/writer lock guards all accounts
/// and logs, so a write to one account also blocks reads of every other.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn create_account(&self, account: Account) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        match state.accounts.entry(account.id().to_string()) {
            Entry::Occupied(entry) => Err(StoreError::AccountAlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(account);
                Ok(())
            }
        }
    }

    fn get_account(&self, id: &str) -> Result<Account, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        state
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.accounts.values().cloned().collect())
    }

    fn record(&self, account: Account, transaction: Transaction) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;

        let Some(stored) = state.accounts.get_mut(account.id()) else {
            return Err(StoreError::AccountNotFound(account.id().to_string()));
        };
        if transaction.account_id() != account.id() {
            return Err(StoreError::AccountTransactionMismatch {
                account: account.id().to_string(),
                transaction_account: transaction.account_id().to_string(),
            });
        }
        if account.version() != stored.version() + 1 {
            return Err(StoreError::StaleAccount {
                id: account.id().to_string(),
                stored: stored.version(),
                update: account.version(),
            });
        }

        *stored = account;
        state
            .transactions
            .entry(transaction.account_id().to_string())
            .or_default()
            .push(transaction);
        Ok(())
    }

    fn list_transactions(&self, account_id: &str) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut transactions = state
            .transactions
            .get(account_id)
            .cloned()
            .unwrap_or_default();
        // stable, so equal timestamps keep their append order
        transactions.sort_by_key(Transaction::timestamp);
        Ok(transactions)
    }
}
