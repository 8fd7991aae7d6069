//! Two-account transfer protocol.
//!
//! The debit and the credit are two separate store commits. If the credit
//! cannot be committed after the debit was, [`CompensatingTransfer`] deposits
//! the amount back onto the source. A failed compensation leaves the ledger
//! inconsistent; it is logged and queued as a [`ReconciliationEntry`] for an
//! operator, never retried automatically.

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use rust_decimal::Decimal;
use tracing::{debug, error, warn};

use crate::{
    account::{Account, Transfer},
    capabilities::{Capabilities, Timestamp},
    error::LedgerError,
    store::LedgerStore,
    transaction::{Transaction, TransactionId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Validating,
    DebitCommitted,
    CreditCommitted,
    CompensationCommitted,
    CompensationFailed,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::CreditCommitted
                | TransferState::CompensationCommitted
                | TransferState::CompensationFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Validating => "validating",
            TransferState::DebitCommitted => "debit_committed",
            TransferState::CreditCommitted => "credit_committed",
            TransferState::CompensationCommitted => "compensation_committed",
            TransferState::CompensationFailed => "compensation_failed",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub transfer_id: String,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub debit: Transaction,
    pub credit: Transaction,
}

/// Why a transfer did not complete, and where it stopped.
#[derive(Debug, Clone)]
pub struct TransferFailure {
    /// `Validating` if nothing was committed, otherwise a terminal
    /// compensation state.
    pub state: TransferState,
    pub error: LedgerError,
}

/// A transfer whose debit is committed but neither the credit nor the
/// compensating deposit could be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationEntry {
    pub transfer_id: String,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub debit_transaction_id: TransactionId,
    pub credit_error: LedgerError,
    pub compensation_error: LedgerError,
    pub recorded_at: Timestamp,
}

/// Moves funds between two accounts of a [`LedgerStore`].
///
/// Kept behind a trait so the compensation scheme can be swapped for a
/// single-commit or two-phase implementation without touching the service.
pub trait TransferCoordinator: Send + Sync {
    fn transfer(
        &self,
        store: &dyn LedgerStore,
        caps: &Capabilities,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, TransferFailure>;

    fn pending_reconciliations(&self) -> Vec<ReconciliationEntry>;

    /// Hands the queued entries over to the caller and empties the queue.
    fn drain_reconciliations(&self) -> Vec<ReconciliationEntry>;
}

#[derive(Debug)]
pub struct CompensatingTransfer {
    max_commit_attempts: usize,
    reconciliation: Mutex<Vec<ReconciliationEntry>>,
}

impl CompensatingTransfer {
    pub fn new(max_commit_attempts: usize) -> Self {
        Self {
            max_commit_attempts: max_commit_attempts.max(1),
            reconciliation: Mutex::new(Vec::new()),
        }
    }

    /// Validating -> DebitCommitted. A stale debit committed nothing, so the
    /// whole attempt starts over from fresh reads.
    fn commit_debit(
        &self,
        store: &dyn LedgerStore,
        caps: &Capabilities,
        request: &TransferRequest,
    ) -> Result<Transfer, LedgerError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let source = store.get_account(&request.from)?;
            let destination = store.get_account(&request.to)?;
            let transfer = source.transfer(&destination, request.amount, caps)?;
            match store.record(transfer.source.clone(), transfer.debit.clone()) {
                Ok(()) => return Ok(transfer),
                Err(err) => {
                    let err = LedgerError::from(err);
                    if !(err.is_stale() && attempt < self.max_commit_attempts) {
                        return Err(err);
                    }
                    debug!(
                        transfer_id = %request.transfer_id,
                        attempt,
                        "Debit was stale, retrying"
                    );
                }
            }
        }
    }

    fn commit_credit(
        &self,
        store: &dyn LedgerStore,
        caps: &Capabilities,
        request: &TransferRequest,
        mut destination: Account,
        mut credit: Transaction,
    ) -> Result<Transaction, LedgerError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match store.record(destination, credit.clone()) {
                Ok(()) => return Ok(credit),
                Err(err) => {
                    let err = LedgerError::from(err);
                    if !(err.is_stale() && attempt < self.max_commit_attempts) {
                        return Err(err);
                    }
                    debug!(
                        transfer_id = %request.transfer_id,
                        attempt,
                        "Credit was stale, retrying"
                    );
                    (destination, credit) = store
                        .get_account(&request.to)?
                        .deposit(request.amount, caps)?;
                }
            }
        }
    }

    /// Deposits the transferred amount back onto the debited source.
    fn compensate(
        &self,
        store: &dyn LedgerStore,
        caps: &Capabilities,
        request: &TransferRequest,
        debited: &Account,
    ) -> Result<Transaction, LedgerError> {
        let (mut source, mut refund) = debited.deposit(request.amount, caps)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match store.record(source, refund.clone()) {
                Ok(()) => return Ok(refund),
                Err(err) => {
                    let err = LedgerError::from(err);
                    if !(err.is_stale() && attempt < self.max_commit_attempts) {
                        return Err(err);
                    }
                    debug!(
                        transfer_id = %request.transfer_id,
                        attempt,
                        "Compensation was stale, retrying"
                    );
                    (source, refund) = store
                        .get_account(&request.from)?
                        .deposit(request.amount, caps)?;
                }
            }
        }
    }

    fn enqueue(&self, entry: ReconciliationEntry) {
        self.reconciliation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl Default for CompensatingTransfer {
    fn default() -> Self {
        Self::new(crate::service::LedgerConfig::default().max_commit_attempts)
    }
}

impl TransferCoordinator for CompensatingTransfer {
    fn transfer(
        &self,
        store: &dyn LedgerStore,
        caps: &Capabilities,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, TransferFailure> {
        let Transfer {
            source,
            destination,
            debit,
            credit,
        } = self
            .commit_debit(store, caps, request)
            .map_err(|error| TransferFailure {
                state: TransferState::Validating,
                error,
            })?;
        debug!(
            transfer_id = %request.transfer_id,
            state = %TransferState::DebitCommitted,
            "Debit recorded"
        );

        let credit_error = match self.commit_credit(store, caps, request, destination, credit) {
            Ok(credit) => {
                debug!(
                    transfer_id = %request.transfer_id,
                    state = %TransferState::CreditCommitted,
                    "Credit recorded"
                );
                return Ok(TransferReceipt { debit, credit });
            }
            Err(err) => err,
        };
        error!(
            transfer_id = %request.transfer_id,
            error = %credit_error,
            "Failed to record destination transaction, attempting rollback"
        );

        let state = match self.compensate(store, caps, request, &source) {
            Ok(refund) => {
                warn!(
                    transfer_id = %request.transfer_id,
                    refund_id = refund.id(),
                    "Rollback successful"
                );
                TransferState::CompensationCommitted
            }
            Err(compensation_error) => {
                error!(
                    transfer_id = %request.transfer_id,
                    from_account_id = %request.from,
                    to_account_id = %request.to,
                    amount = %request.amount,
                    rollback_error = %compensation_error,
                    "Rollback failed, ledger is inconsistent and queued for reconciliation"
                );
                self.enqueue(ReconciliationEntry {
                    transfer_id: request.transfer_id.clone(),
                    from: request.from.clone(),
                    to: request.to.clone(),
                    amount: request.amount,
                    debit_transaction_id: debit.id().to_string(),
                    credit_error: credit_error.clone(),
                    compensation_error,
                    recorded_at: caps.now(),
                });
                TransferState::CompensationFailed
            }
        };

        Err(TransferFailure {
            state,
            error: credit_error,
        })
    }

    fn pending_reconciliations(&self) -> Vec<ReconciliationEntry> {
        self.reconciliation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn drain_reconciliations(&self) -> Vec<ReconciliationEntry> {
        std::mem::take(
            &mut *self
                .reconciliation
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::prelude::FromPrimitive;

    use super::*;
    use crate::{
        capabilities::fakes,
        store::{InMemoryLedgerStore, StoreError},
        transaction::TransactionKind,
    };

    fn dec(n: u32) -> Decimal {
        Decimal::from_u32(n).unwrap()
    }

    /// Passes calls through, except that `record` fails for the listed call
    /// numbers (1-based).
    struct FlakyStore {
        inner: InMemoryLedgerStore,
        records: AtomicUsize,
        fail_on: Vec<usize>,
        failure: StoreError,
    }

    impl FlakyStore {
        fn new(fail_on: Vec<usize>, failure: StoreError) -> Self {
            Self {
                inner: InMemoryLedgerStore::new(),
                records: AtomicUsize::new(0),
                fail_on,
                failure,
            }
        }
    }

    impl LedgerStore for FlakyStore {
        fn create_account(&self, account: Account) -> Result<(), StoreError> {
            self.inner.create_account(account)
        }

        fn get_account(&self, id: &str) -> Result<Account, StoreError> {
            self.inner.get_account(id)
        }

        fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
            self.inner.list_accounts()
        }

        fn record(&self, account: Account, transaction: Transaction) -> Result<(), StoreError> {
            let call = self.records.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&call) {
                return Err(self.failure.clone());
            }
            self.inner.record(account, transaction)
        }

        fn list_transactions(&self, account_id: &str) -> Result<Vec<Transaction>, StoreError> {
            self.inner.list_transactions(account_id)
        }
    }

    fn seeded(store: &dyn LedgerStore) {
        store
            .create_account(Account::new("a", "Alice", dec(1000)).unwrap())
            .unwrap();
        store
            .create_account(Account::new("b", "Bob", dec(500)).unwrap())
            .unwrap();
    }

    fn request(amount: u32) -> TransferRequest {
        TransferRequest {
            transfer_id: "t-1".to_string(),
            from: "a".to_string(),
            to: "b".to_string(),
            amount: dec(amount),
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!TransferState::Validating.is_terminal());
        assert!(!TransferState::DebitCommitted.is_terminal());
        assert!(TransferState::CreditCommitted.is_terminal());
        assert!(TransferState::CompensationCommitted.is_terminal());
        assert!(TransferState::CompensationFailed.is_terminal());
    }

    #[test]
    fn successful_transfer() {
        let caps = fakes::deterministic();
        let store = InMemoryLedgerStore::new();
        seeded(&store);
        let coordinator = CompensatingTransfer::default();

        let receipt = coordinator.transfer(&store, &caps, &request(200)).unwrap();
        assert_eq!(receipt.debit.kind(), TransactionKind::Withdrawal);
        assert_eq!(receipt.credit.kind(), TransactionKind::Deposit);
        assert_eq!(store.get_account("a").unwrap().balance(), dec(800));
        assert_eq!(store.get_account("b").unwrap().balance(), dec(700));
        assert!(coordinator.pending_reconciliations().is_empty());
    }

    #[test]
    fn debit_failure_moves_nothing() {
        let caps = fakes::deterministic();
        let store = FlakyStore::new(vec![1], StoreError::Backend("disk on fire".into()));
        seeded(&store);
        let coordinator = CompensatingTransfer::default();

        let failure = coordinator
            .transfer(&store, &caps, &request(200))
            .unwrap_err();
        assert_eq!(failure.state, TransferState::Validating);
        assert_eq!(
            failure.error,
            LedgerError::Store(StoreError::Backend("disk on fire".into()))
        );
        assert_eq!(store.get_account("a").unwrap().balance(), dec(1000));
        assert!(store.list_transactions("a").unwrap().is_empty());
    }

    #[test]
    fn credit_failure_is_compensated() {
        let caps = fakes::deterministic();
        let store = FlakyStore::new(vec![2], StoreError::Backend("simulated".into()));
        seeded(&store);
        let coordinator = CompensatingTransfer::default();

        let failure = coordinator
            .transfer(&store, &caps, &request(200))
            .unwrap_err();
        assert_eq!(failure.state, TransferState::CompensationCommitted);
        assert_eq!(failure.error.to_string(), "Ledger store backend failure: simulated");

        assert_eq!(store.get_account("a").unwrap().balance(), dec(1000));
        assert_eq!(store.get_account("b").unwrap().balance(), dec(500));
        let kinds: Vec<_> = store
            .list_transactions("a")
            .unwrap()
            .iter()
            .map(Transaction::kind)
            .collect();
        assert_eq!(
            kinds,
            vec![TransactionKind::Withdrawal, TransactionKind::Deposit]
        );
        assert!(store.list_transactions("b").unwrap().is_empty());
        assert!(coordinator.pending_reconciliations().is_empty());
    }

    #[test]
    fn failed_compensation_is_queued() {
        let caps = fakes::deterministic();
        let store = FlakyStore::new(vec![2, 3], StoreError::Backend("simulated".into()));
        seeded(&store);
        let coordinator = CompensatingTransfer::default();

        let failure = coordinator
            .transfer(&store, &caps, &request(200))
            .unwrap_err();
        assert_eq!(failure.state, TransferState::CompensationFailed);
        assert_eq!(
            failure.error,
            LedgerError::Store(StoreError::Backend("simulated".into()))
        );

        // source debited, destination never credited
        assert_eq!(store.get_account("a").unwrap().balance(), dec(800));
        assert_eq!(store.get_account("b").unwrap().balance(), dec(500));

        let pending = coordinator.pending_reconciliations();
        assert_eq!(pending.len(), 1);
        let entry = &pending[0];
        assert_eq!(entry.transfer_id, "t-1");
        assert_eq!(entry.amount, dec(200));
        assert_eq!(
            entry.debit_transaction_id,
            store.list_transactions("a").unwrap()[0].id()
        );

        assert_eq!(coordinator.drain_reconciliations(), pending);
        assert!(coordinator.pending_reconciliations().is_empty());
        assert!(coordinator.drain_reconciliations().is_empty());
    }

    #[test]
    fn stale_credit_is_retried() {
        let caps = fakes::deterministic();
        let store = FlakyStore::new(
            vec![2],
            StoreError::StaleAccount {
                id: "b".into(),
                stored: 0,
                update: 1,
            },
        );
        seeded(&store);
        let coordinator = CompensatingTransfer::new(3);

        let receipt = coordinator.transfer(&store, &caps, &request(200)).unwrap();
        assert_eq!(store.get_account("a").unwrap().balance(), dec(800));
        assert_eq!(store.get_account("b").unwrap().balance(), dec(700));
        assert_eq!(store.list_transactions("b").unwrap(), vec![receipt.credit]);
    }

    #[test]
    fn stale_debit_is_retried_from_fresh_reads() {
        let caps = fakes::deterministic();
        let store = FlakyStore::new(
            vec![1],
            StoreError::StaleAccount {
                id: "a".into(),
                stored: 0,
                update: 1,
            },
        );
        seeded(&store);
        let coordinator = CompensatingTransfer::new(2);

        coordinator.transfer(&store, &caps, &request(200)).unwrap();
        assert_eq!(store.list_transactions("a").unwrap().len(), 1);
        assert_eq!(store.get_account("a").unwrap().balance(), dec(800));
    }
}
