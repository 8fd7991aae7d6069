//! Batch driver that feeds ledger operations from a CSV file through
//! [`LedgerService`](crate::service::LedgerService) and prints the resulting
//! accounts. It only translates rows into service calls; all rules live in the
//! library.

use std::{
    io::{Read, Write},
    sync::Arc,
};

use anyhow::Result;
use thiserror::Error;

use crate::{
    capabilities::Capabilities,
    error::LedgerError,
    service::{LedgerConfig, LedgerService},
    store::InMemoryLedgerStore,
    transaction::TransactionKind,
};
use csv_parser::{CsvOperationParser, Operation};
use csv_printer::{AccountSummary, print_accounts};
pub mod csv_parser;
pub mod csv_printer;

#[derive(Debug, Error)]
pub enum RowError {
    #[error("Malformed row: {0}")]
    Parse(#[from] csv::Error),
    #[error("Amount is required for `{op}`")]
    AmountRequired { op: String },
    #[error("Counterparty is required for transfer")]
    CounterpartyRequired,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct Service<'w, R, W: 'w> {
    pub input: R,
    pub output: &'w mut W,
    pub config: LedgerConfig,
    pub error_printer: Box<dyn FnMut(u64, RowError)>,
}

impl<'w, R, W> Service<'w, R, W>
where
    R: Read,
    W: Write + 'w,
{
    pub fn run(mut self) -> Result<()> {
        let parser = CsvOperationParser::new(self.input);
        let ledger = LedgerService::with_config(
            Arc::new(InMemoryLedgerStore::new()),
            Capabilities::default(),
            self.config,
        );

        for (line, row) in parser {
            if let Err(err) = row
                .map_err(RowError::from)
                .and_then(|operation| execute(&ledger, operation))
            {
                (self.error_printer)(line, err);
            }
        }

        let mut accounts = ledger.list_accounts()?;
        accounts.sort_by(|a, b| a.id().cmp(b.id()));
        let summaries = accounts
            .into_iter()
            .map(|acc| {
                Ok(AccountSummary {
                    transactions: ledger.list_transactions(acc.id())?.len(),
                    account: acc.id().to_string(),
                    owner: acc.owner().to_string(),
                    balance: acc.balance(),
                })
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;

        print_accounts(self.output, summaries)
    }
}

fn execute(ledger: &LedgerService, operation: Operation) -> Result<(), RowError> {
    let op = operation.op.to_ascii_lowercase();
    match op.as_str() {
        "open" => {
            ledger.create_account_with_id(
                operation.account,
                operation.owner.as_deref().unwrap_or_default(),
                operation.amount.unwrap_or_default(),
            )?;
        }
        "transfer" => {
            let to = operation
                .counterparty
                .ok_or(RowError::CounterpartyRequired)?;
            let amount = operation
                .amount
                .ok_or_else(|| RowError::AmountRequired { op: op.clone() })?;
            ledger.transfer(&operation.account, &to, amount)?;
        }
        other => {
            let kind = other.parse::<TransactionKind>().map_err(LedgerError::from)?;
            let amount = operation
                .amount
                .ok_or_else(|| RowError::AmountRequired { op: op.clone() })?;
            ledger.create_transaction(&operation.account, kind, amount)?;
        }
    }
    Ok(())
}
