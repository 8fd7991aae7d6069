/// Account entity and the pure deposit, withdraw and transfer rules.
/// Operations work on copies and return the updated account together with
/// the transaction that produced it.
pub mod account;

pub mod transaction;

/// Clock and id generator handed to the domain, so tests can pin both.
pub mod capabilities;

pub mod error;

/// Storage interface, plus "in memory" implementation guarded by a single
/// reader/writer lock.
pub mod store;

/// Request-level orchestration, including the compensating two-account
/// transfer.
pub mod service;

/// Bootstrap for the command-line batch runner. Lives in the library so the
/// integration tests can drive it.
pub mod bin_utils;

pub use account::{Account, AccountError};
pub use capabilities::{Capabilities, Clock, IdGenerator};
pub use error::{ErrorKind, LedgerError};
pub use service::{LedgerConfig, LedgerService};
pub use store::{InMemoryLedgerStore, LedgerStore, StoreError};
pub use transaction::{Transaction, TransactionKind};
