//! Per-engine connection factories, inventory reporters, and native tools.
//!
//! Both engines share the same connection contract: open a bounded `sqlx`
//! pool, probe liveness immediately, and classify failures into
//! [`ConnectError`] kinds so callers can tell "nothing is listening" apart
//! from "the server rejected these credentials".
//!
//! # Security
//! - Inventory queries are `SELECT`/`SHOW` only
//! - Identifiers are bound as parameters wherever the engine allows it

pub mod mysql;
pub mod postgres;

use crate::error::{ConnectError, InventoryError};
use crate::report::Report;
use std::io::Write;
use std::time::Duration;

/// Upper bound for a single connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle connections are closed after this long.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// SQLSTATE class for "invalid authorization specification".
const SQLSTATE_AUTH_CLASS: &str = "28";

/// MySQL error numbers that mean the credentials were rejected:
/// `ER_ACCESS_DENIED_ERROR` and `ER_ACCESS_DENIED_NO_PASSWORD_ERROR`.
const MYSQL_AUTH_ERRORS: [u16; 2] = [1045, 1698];

/// Classifies a driver error raised while connecting.
///
/// - Transport failures and pool timeouts mean nothing answered: `NotListening`
/// - SQLSTATE class `28` (or MySQL 1045/1698) means rejected credentials
/// - Everything else is `Other` and keeps the cause
pub(crate) fn classify_connect_error(
    endpoint: &str,
    username: &str,
    error: sqlx::Error,
) -> ConnectError {
    match &error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => ConnectError::NotListening {
            endpoint: endpoint.to_string(),
        },
        sqlx::Error::Database(db_error) if is_auth_rejection(db_error.as_ref()) => {
            ConnectError::AuthenticationFailed {
                username: username.to_string(),
                endpoint: endpoint.to_string(),
            }
        }
        _ => ConnectError::Other {
            endpoint: endpoint.to_string(),
            source: error,
        },
    }
}

fn is_auth_rejection(db_error: &dyn sqlx::error::DatabaseError) -> bool {
    if db_error
        .code()
        .is_some_and(|code| code.starts_with(SQLSTATE_AUTH_CLASS))
    {
        return true;
    }

    db_error
        .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
        .is_some_and(|mysql| MYSQL_AUTH_ERRORS.contains(&mysql.number()))
}

/// Error for a connection attempt that outlived [`CONNECT_TIMEOUT`].
pub(crate) fn connect_timed_out(endpoint: &str) -> ConnectError {
    tracing::debug!(
        "Connection attempt to {} exceeded {:?}",
        endpoint,
        CONNECT_TIMEOUT
    );
    ConnectError::NotListening {
        endpoint: endpoint.to_string(),
    }
}

/// Prints a section failure inline so later sections still run.
///
/// Console write failures are the one error that stops the inventory.
pub(crate) fn report_section<W: Write>(
    out: &mut Report<W>,
    title: &str,
    outcome: Result<(), InventoryError>,
) -> Result<(), InventoryError> {
    match outcome {
        Ok(()) => Ok(()),
        Err(InventoryError::Output(e)) => Err(InventoryError::Output(e)),
        Err(e) => {
            tracing::debug!("Inventory section '{}' failed: {}", title, e);
            out.line(format_args!("  [!] {e}"))?;
            Ok(())
        }
    }
}
