//! Database audit tool for time-boxed defense exercises.
//!
//! Inventories, backs up, and restores MySQL/MariaDB and PostgreSQL
//! instances. Usage errors exit with status 2 before any I/O. Operation
//! failures are printed and the process still exits 0.
//!
//! # Security Guarantees
//! - Inventory is read-only
//! - The password is prompted once per run and never written to disk or logs

use anyhow::Context;
use dbaudit::{Invocation, dispatch};
use dbaudit_core::{PasswordCache, Report, init_logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let invocation = Invocation::try_parse_from(std::env::args_os()).unwrap_or_else(|e| e.exit());

    init_logging(invocation.verbose, invocation.quiet)?;

    let mut passwords = PasswordCache::terminal();
    let mut out = Report::stdout();

    dispatch(&invocation, &mut passwords, &mut out)
        .await
        .context("dbaudit could not write its report")?;

    Ok(())
}
