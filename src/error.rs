use thiserror::Error;

use crate::{account::AccountError, store::StoreError};

/// Coarse class of a [`LedgerError`], for transport layers that map errors
/// onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or a violated precondition. Never worth retrying as is.
    Validation,
    /// Well-formed request that the current state does not allow.
    Conflict,
    NotFound,
    /// A caller bug: the transaction does not belong to the account it updates.
    Integrity,
    Internal,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Account(err) => match err {
                AccountError::InvalidAccountId
                | AccountError::InvalidOwner
                | AccountError::NegativeBalance(_)
                | AccountError::InvalidAmount(_)
                | AccountError::InvalidTransactionType(_)
                | AccountError::SelfTransfer => ErrorKind::Validation,
                AccountError::InsufficientFunds { .. } | AccountError::BalanceOverflow { .. } => {
                    ErrorKind::Conflict
                }
            },
            LedgerError::Store(err) => match err {
                StoreError::AccountAlreadyExists(_) | StoreError::StaleAccount { .. } => {
                    ErrorKind::Conflict
                }
                StoreError::AccountNotFound(_) => ErrorKind::NotFound,
                StoreError::AccountTransactionMismatch { .. } => ErrorKind::Integrity,
                StoreError::LockPoisoned | StoreError::Backend(_) => ErrorKind::Internal,
            },
        }
    }

    pub(crate) fn is_stale(&self) -> bool {
        matches!(self, LedgerError::Store(StoreError::StaleAccount { .. }))
    }
}
