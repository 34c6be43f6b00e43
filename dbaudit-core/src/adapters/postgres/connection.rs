//! PostgreSQL connection factory.
//!
//! # Connection Pool Configuration
//! - Max connections: 6
//! - Max lifetime: 8 minutes
//! - Connect/acquire timeout: [`CONNECT_TIMEOUT`]
//! - SSL: preferred, plaintext accepted
//!
//! Without an explicit database the maintenance database `postgres` is used.

use crate::adapters::{CONNECT_TIMEOUT, IDLE_TIMEOUT, classify_connect_error, connect_timed_out};
use crate::error::ConnectError;
use crate::security::ConnectionParams;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{ConnectOptions, Connection, PgPool};
use std::time::Duration;

/// Pool ceiling for PostgreSQL connections.
pub const MAX_POOL_CONNECTIONS: u32 = 6;

/// Connections older than this are retired.
pub const MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(8 * 60);

/// Database used when none is specified.
pub const DEFAULT_DATABASE: &str = "postgres";

/// Builds driver options from connection parameters.
pub fn connect_options(params: &ConnectionParams) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(params.host())
        .port(params.port())
        .username(params.username())
        .password(params.password())
        .database(params.database().unwrap_or(DEFAULT_DATABASE))
        .ssl_mode(PgSslMode::Prefer)
        .application_name("dbaudit")
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
        tracing::debug!("Closing PostgreSQL probe connection failed: {}", e);
    }
    Ok(())
}

/// Probes the server, then returns a bounded pool.
///
/// # Errors
/// Returns the classified [`ConnectError`] from the liveness probe.
pub async fn connect(params: &ConnectionParams) -> Result<PgPool, ConnectError> {
    probe(params).await?;

    let pool = PgPoolOptions::new()
        .max_connections(MAX_POOL_CONNECTIONS)
        .min_connections(0)
        .acquire_timeout(CONNECT_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .max_lifetime(MAX_CONNECTION_LIFETIME)
        .connect_lazy_with(connect_options(params));

    tracing::debug!("PostgreSQL pool ready for {}", params);
    Ok(pool)
}
