use std::io::Write;

use anyhow::Context;
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub account: String,
    pub owner: String,
    pub balance: Decimal,
    pub transactions: usize,
}

/// Writes one CSV row per account, header first.
pub fn print_accounts<W>(
    output: &mut W,
    accounts: impl IntoIterator<Item = AccountSummary>,
) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = Writer::from_writer(output);
    for summary in accounts {
        writer
            .serialize(&summary)
            .with_context(|| format!("Failed to write account `{}` to CSV", summary.account))?;
    }
    writer.flush().context("Failed to flush CSV writer")
}
