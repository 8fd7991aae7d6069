use thiserror::Error;

use crate::{
    account::{Account, AccountId},
    transaction::Transaction,
};

pub mod in_memory_store;

pub use in_memory_store::InMemoryLedgerStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Account `{0}` already exists")]
    AccountAlreadyExists(AccountId),
    #[error("Account `{0}` not found")]
    AccountNotFound(AccountId),
    #[error("Transaction for account `{transaction_account}` cannot update account `{account}`")]
    AccountTransactionMismatch {
        account: AccountId,
        transaction_account: AccountId,
    },
    #[error("Account `{id}` changed concurrently: stored version {stored}, update {update}")]
    StaleAccount { id: AccountId, stored: u64, update: u64 },
    #[error("Ledger store lock poisoned")]
    LockPoisoned,
    #[error("Ledger store backend failure: {0}")]
    Backend(String),
}

/// Sole owner of ledger state. Every method hands out copies, never
/// references into the stored values.
pub trait LedgerStore: Send + Sync {
    fn create_account(&self, account: Account) -> Result<(), StoreError>;

    fn get_account(&self, id: &str) -> Result<Account, StoreError>;

    /// Snapshot of all accounts, in no particular order.
    fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Overwrites `account` and appends `transaction` to its log as a single
    /// atomic step. `account` must be exactly one version ahead of the stored
    /// copy.
    fn record(&self, account: Account, transaction: Transaction) -> Result<(), StoreError>;

    /// Transactions of one account, ascending by timestamp with ties kept in
    /// append order. Unknown accounts have an empty log.
    fn list_transactions(&self, account_id: &str) -> Result<Vec<Transaction>, StoreError>;
}
