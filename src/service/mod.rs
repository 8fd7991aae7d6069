use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, info_span, warn};

use crate::{
    account::{Account, AccountId},
    capabilities::Capabilities,
    error::{ErrorKind, LedgerError},
    store::LedgerStore,
    transaction::{Transaction, TransactionKind},
};

pub mod transfer;

use transfer::{
    CompensatingTransfer, ReconciliationEntry, TransferCoordinator, TransferRequest,
    TransferState,
};

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How many times a read-modify-write is attempted when the store reports
    /// the account was changed underneath it.
    pub max_commit_attempts: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: 3,
        }
    }
}

/// Entry point for the request layer. Loads accounts from the store, runs the
/// domain operation on copies and commits the result.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    caps: Capabilities,
    config: LedgerConfig,
    coordinator: Arc<dyn TransferCoordinator>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, caps: Capabilities) -> Self {
        Self::with_config(store, caps, LedgerConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn LedgerStore>,
        caps: Capabilities,
        config: LedgerConfig,
    ) -> Self {
        let coordinator = Arc::new(CompensatingTransfer::new(config.max_commit_attempts));
        Self {
            store,
            caps,
            config,
            coordinator,
        }
    }

    pub fn with_coordinator(mut self, coordinator: Arc<dyn TransferCoordinator>) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn create_account(
        &self,
        owner: &str,
        initial_balance: Decimal,
    ) -> Result<AccountId, LedgerError> {
        self.create_account_with_id(self.caps.new_id(), owner, initial_balance)
    }

    pub fn create_account_with_id(
        &self,
        id: impl Into<AccountId>,
        owner: &str,
        initial_balance: Decimal,
    ) -> Result<AccountId, LedgerError> {
        let id = id.into();
        let _span = info_span!(
            "create_account",
            account_id = %id,
            owner,
            balance = %initial_balance
        )
        .entered();
        info!("Creating account");

        let account = Account::new(id, owner, initial_balance)
            .map_err(LedgerError::from)
            .inspect_err(|err| report(err, "Account creation"))?;
        let id = account.id().to_string();
        self.store
            .create_account(account)
            .map_err(LedgerError::from)
            .inspect_err(|err| report(err, "Account creation"))?;

        info!("Successfully created account");
        Ok(id)
    }

    pub fn get_account(&self, account_id: &str) -> Result<Account, LedgerError> {
        let account = self
            .store
            .get_account(account_id)
            .map_err(LedgerError::from)
            .inspect_err(|err| report(err, "Account retrieval"))?;
        info!(account_id, "Retrieved account");
        Ok(account)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let accounts = self
            .store
            .list_accounts()
            .map_err(LedgerError::from)
            .inspect_err(|err| report(err, "Account listing"))?;
        info!(count = accounts.len(), "Listed accounts");
        Ok(accounts)
    }

    pub fn create_transaction(
        &self,
        account_id: &str,
        kind: TransactionKind,
        amount: Decimal,
    ) -> Result<Transaction, LedgerError> {
        let _span = info_span!("create_transaction", account_id, %kind, %amount).entered();
        info!("Processing transaction");

        let mut attempt = 0;
        let txn = loop {
            attempt += 1;
            let result = self
                .store
                .get_account(account_id)
                .map_err(LedgerError::from)
                .and_then(|account| {
                    account
                        .execute(kind, amount, &self.caps)
                        .map_err(LedgerError::from)
                })
                .and_then(|(account, txn)| {
                    self.store.record(account, txn.clone())?;
                    Ok(txn)
                });
            match result {
                Ok(txn) => break txn,
                Err(err) if err.is_stale() && attempt < self.config.max_commit_attempts => {
                    warn!(attempt, reason = %err, "Account changed concurrently, retrying");
                }
                Err(err) => {
                    report(&err, "Transaction");
                    return Err(err);
                }
            }
        };

        info!(transaction_id = txn.id(), "Transaction successful");
        Ok(txn)
    }

    /// Transactions of one account in timestamp order. Unknown accounts simply
    /// have none.
    pub fn list_transactions(&self, account_id: &str) -> Result<Vec<Transaction>, LedgerError> {
        let transactions = self
            .store
            .list_transactions(account_id)
            .map_err(LedgerError::from)
            .inspect_err(|err| report(err, "Transaction listing"))?;
        info!(account_id, count = transactions.len(), "Listed transactions");
        Ok(transactions)
    }

    /// Returns the (withdrawal, deposit) pair on success.
    pub fn transfer(
        &self,
        from_id: &str,
        to_id: &str,
        amount: Decimal,
    ) -> Result<(Transaction, Transaction), LedgerError> {
        let request = TransferRequest {
            transfer_id: self.caps.new_id(),
            from: from_id.to_string(),
            to: to_id.to_string(),
            amount,
        };
        let _span = info_span!(
            "transfer",
            transfer_id = %request.transfer_id,
            from_account_id = from_id,
            to_account_id = to_id,
            %amount
        )
        .entered();
        info!("Processing transfer");

        match self
            .coordinator
            .transfer(self.store.as_ref(), &self.caps, &request)
        {
            Ok(receipt) => {
                info!("Transfer successful");
                Ok((receipt.debit, receipt.credit))
            }
            Err(failure) => {
                debug_assert!(
                    failure.state == TransferState::Validating || failure.state.is_terminal(),
                    "transfer stopped in non-terminal state {}",
                    failure.state
                );
                match failure.state {
                    TransferState::CompensationFailed => error!(
                        state = %failure.state,
                        error = %failure.error,
                        "Transfer left the ledger inconsistent"
                    ),
                    TransferState::CompensationCommitted => warn!(
                        state = %failure.state,
                        reason = %failure.error,
                        "Transfer rolled back"
                    ),
                    _ => report(&failure.error, "Transfer"),
                }
                Err(failure.error)
            }
        }
    }

    /// Transfers that could be neither completed nor rolled back.
    pub fn pending_reconciliations(&self) -> Vec<ReconciliationEntry> {
        self.coordinator.pending_reconciliations()
    }

    /// Takes the queued reconciliations, leaving the queue empty.
    pub fn drain_reconciliations(&self) -> Vec<ReconciliationEntry> {
        let entries = self.coordinator.drain_reconciliations();
        info!(count = entries.len(), "Drained reconciliation queue");
        entries
    }
}

fn report(err: &LedgerError, action: &str) {
    match err.kind() {
        ErrorKind::Integrity | ErrorKind::Internal => error!(error = %err, "{action} failed"),
        _ => warn!(reason = %err, "{action} rejected"),
    }
}
