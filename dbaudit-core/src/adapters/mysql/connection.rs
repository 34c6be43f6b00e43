//! MySQL/MariaDB connection factory.
//!
//! # Connection Pool Configuration
//! - Max connections: 6 (the inventory path asks for 1)
//! - Max lifetime: 3 minutes
//! - Connect/acquire timeout: [`CONNECT_TIMEOUT`]
//!
//! The liveness probe runs on a dedicated connection before the pool exists,
//! so a refused socket surfaces as a transport error instead of a pool
//! timeout.

use crate::adapters::{CONNECT_TIMEOUT, IDLE_TIMEOUT, classify_connect_error, connect_timed_out};
use crate::error::ConnectError;
use crate::security::ConnectionParams;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{ConnectOptions, Connection, MySqlPool};
use std::time::Duration;

/// Pool ceiling for MySQL connections.
pub const MAX_POOL_CONNECTIONS: u32 = 6;

/// Connections older than this are retired.
pub const MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(3 * 60);

/// Result of the anonymous-login security probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnonymousLogin {
    /// The server accepted an empty user and password: a finding
    Allowed,
    /// The server rejected the empty credentials
    Disabled,
}

/// Builds driver options from connection parameters.
pub fn connect_options(params: &ConnectionParams) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(params.host())
        .port(params.port())
        .username(params.username())
        .password(params.password());

    if let Some(database) = params.database() {
        options = options.database(database);
    }

    options
}

/// Opens one connection, pings it, and closes it.
///
/// # Errors
/// Returns the classified [`ConnectError`].
pub async fn probe(params: &ConnectionParams) -> Result<(), ConnectError> {
    let endpoint = params.endpoint();
    let options = connect_options(params);

    let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, options.connect())
        .await
        .map_err(|_| connect_timed_out(&endpoint))?
        .map_err(|e| classify_connect_error(&endpoint, params.username(), e))?;

    conn.ping()
        .await
        .map_err(|e| classify_connect_error(&endpoint, params.username(), e))?;

    if let Err(e) = conn.close().await {
        tracing::debug!("Closing MySQL probe connection failed: {}", e);
    }
    Ok(())
}

/// Probes the server, then returns a pool of at most `max_connections`.
///
/// # Errors
/// Returns the classified [`ConnectError`] from the liveness probe.
pub async fn connect(
    params: &ConnectionParams,
    max_connections: u32,
) -> Result<MySqlPool, ConnectError> {
    probe(params).await?;

    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections.clamp(1, MAX_POOL_CONNECTIONS))
        .min_connections(0)
        .acquire_timeout(CONNECT_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .max_lifetime(MAX_CONNECTION_LIFETIME)
        .connect_lazy_with(connect_options(params));

    tracing::debug!("MySQL pool ready for {}", params);
    Ok(pool)
}

/// Attempts a login with an empty user and password.
///
/// # Errors
/// Returns [`ConnectError::NotListening`] or [`ConnectError::Other`] when the
/// probe could not reach a verdict. An authentication rejection is the
/// expected, healthy outcome and maps to [`AnonymousLogin::Disabled`].
pub async fn anonymous_login_probe(
    anonymous: &ConnectionParams,
) -> Result<AnonymousLogin, ConnectError> {
    match probe(anonymous).await {
        Ok(()) => Ok(AnonymousLogin::Allowed),
        Err(e) if e.is_authentication_failure() => Ok(AnonymousLogin::Disabled),
        Err(e) => Err(e),
    }
}
