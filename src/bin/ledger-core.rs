use std::fs::File;

use anyhow::{Context, Result};
use ledger_core::{
    bin_utils::{RowError, Service},
    error::ErrorKind,
    service::LedgerConfig,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let filename = std::env::args()
        .nth(1)
        .context("Expected a file name as the first argument")?;
    let file = File::open(&filename).with_context(|| format!("Failed to open `{filename}`"))?;

    let mut config = LedgerConfig::default();
    if let Ok(attempts) = std::env::var("LEDGER_MAX_COMMIT_ATTEMPTS") {
        config.max_commit_attempts = attempts
            .parse()
            .with_context(|| format!("Invalid LEDGER_MAX_COMMIT_ATTEMPTS `{attempts}`"))?;
    }

    let service = Service {
        input: file,
        output: &mut std::io::stdout(),
        config,
        error_printer: Box::new(|line, err| match err {
            // rejected operations are business outcomes, the service already logged them
            RowError::Ledger(err)
                if matches!(err.kind(), ErrorKind::Validation | ErrorKind::Conflict) => {}
            err => eprintln!("Error at line {line}: {err}"),
        }),
    };
    service.run()
}
