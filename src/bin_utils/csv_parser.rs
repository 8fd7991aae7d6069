use std::io::Read;

use csv::{DeserializeRecordsIntoIter, Trim};
use rust_decimal::Decimal;
use serde::Deserialize;

/// One row of the batch input. Which columns matter depends on `op`.
#[derive(Debug, Deserialize)]
pub struct Operation {
    pub op: String,
    pub account: String,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

/// Parses ledger operations in CSV format, yielding each row with the line
/// it started on.
pub struct CsvOperationParser<R> {
    iter: DeserializeRecordsIntoIter<R, Operation>,
}

impl<R> CsvOperationParser<R>
where
    R: Read,
{
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            iter: reader.into_deserialize(),
        }
    }
}

impl<R> Iterator for CsvOperationParser<R>
where
    R: Read,
{
    type Item = (u64, csv::Result<Operation>);

    fn next(&mut self) -> Option<Self::Item> {
        let curr_line = self.iter.reader().position().line();
        self.iter.next().map(|row| (curr_line, row))
    }
}
