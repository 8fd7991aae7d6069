use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::{
    capabilities::Capabilities,
    transaction::{Transaction, TransactionKind},
};

pub type AccountId = String;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("Account id must not be empty")]
    InvalidAccountId,
    #[error("Owner name must not be empty")]
    InvalidOwner,
    #[error("Initial balance cannot be negative, got {0}")]
    NegativeBalance(Decimal),
    #[error("Transaction amount must be positive, got {0}")]
    InvalidAmount(Decimal),
    #[error("Invalid transaction type `{0}`")]
    InvalidTransactionType(String),
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },
    #[error("Cannot transfer funds to the same account")]
    SelfTransfer,
    #[error("Depositing {amount} would overflow balance {balance}")]
    BalanceOverflow { balance: Decimal, amount: Decimal },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    owner: String,
    balance: Decimal,
    /// Number of transactions applied since creation.
    #[serde(skip)]
    version: u64,
}

/// Outcome of [`Account::transfer`]: both updated copies and the pair of
/// transactions that produced them. Nothing is persisted yet.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub source: Account,
    pub destination: Account,
    pub debit: Transaction,
    pub credit: Transaction,
}

impl Account {
    pub fn new(
        id: impl Into<AccountId>,
        owner: impl Into<String>,
        initial_balance: Decimal,
    ) -> Result<Self, AccountError> {
        let id = id.into();
        let owner = owner.into();
        if id.is_empty() {
            return Err(AccountError::InvalidAccountId);
        }
        if owner.is_empty() {
            return Err(AccountError::InvalidOwner);
        }
        if initial_balance < Decimal::ZERO {
            return Err(AccountError::NegativeBalance(initial_balance));
        }
        Ok(Self {
            id,
            owner,
            balance: initial_balance,
            version: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Applies an already validated transaction. There is no validation here,
    /// the transaction is the source of truth.
    pub fn apply(&mut self, txn: &Transaction) {
        self.balance += txn.signed_amount();
        self.version += 1;
    }

    pub fn deposit(
        &self,
        amount: Decimal,
        caps: &Capabilities,
    ) -> Result<(Account, Transaction), AccountError> {
        if amount <= Decimal::ZERO {
            return Err(AccountError::InvalidAmount(amount));
        }
        // apply adds unchecked, so the sum must be known to fit
        if self.balance.checked_add(amount).is_none() {
            return Err(AccountError::BalanceOverflow {
                balance: self.balance,
                amount,
            });
        }
        let txn = Transaction::new(&self.id, TransactionKind::Deposit, amount, caps)?;
        Ok(self.applied(txn))
    }

    pub fn withdraw(
        &self,
        amount: Decimal,
        caps: &Capabilities,
    ) -> Result<(Account, Transaction), AccountError> {
        if amount <= Decimal::ZERO {
            return Err(AccountError::InvalidAmount(amount));
        }
        if amount > self.balance {
            return Err(AccountError::InsufficientFunds {
                requested: amount,
                available: self.balance,
            });
        }
        let txn = Transaction::new(&self.id, TransactionKind::Withdrawal, amount, caps)?;
        Ok(self.applied(txn))
    }

    pub fn execute(
        &self,
        kind: TransactionKind,
        amount: Decimal,
        caps: &Capabilities,
    ) -> Result<(Account, Transaction), AccountError> {
        match kind {
            TransactionKind::Deposit => self.deposit(amount, caps),
            TransactionKind::Withdrawal => self.withdraw(amount, caps),
        }
    }

    pub fn transfer(
        &self,
        destination: &Account,
        amount: Decimal,
        caps: &Capabilities,
    ) -> Result<Transfer, AccountError> {
        // checked before the amount, so an invalid self-transfer reports SelfTransfer
        if self.id == destination.id {
            return Err(AccountError::SelfTransfer);
        }
        let (source, debit) = self.withdraw(amount, caps)?;
        let (destination, credit) = destination.deposit(amount, caps)?;
        Ok(Transfer {
            source,
            destination,
            debit,
            credit,
        })
    }

    fn applied(&self, txn: Transaction) -> (Account, Transaction) {
        let mut updated = self.clone();
        updated.apply(&txn);
        (updated, txn)
    }
}
