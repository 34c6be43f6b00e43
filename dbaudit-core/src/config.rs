//! Engine selection and server addressing.
//!
//! `ServerTarget` is what the command line describes: where the server is
//! and who to log in as. It never holds a password; combining it with the
//! cached password yields [`crate::security::ConnectionParams`].

use crate::security::ConnectionParams;
use std::fmt;

/// Default host for both engines.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// MySQL or MariaDB
    MySql,
    /// PostgreSQL
    Postgres,
}

impl Engine {
    /// Server port used when `--port` is not given.
    pub const fn default_port(self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
        }
    }

    /// Login user used when `--username` is not given.
    pub const fn default_username(self) -> &'static str {
        match self {
            Self::MySql => "root",
            Self::Postgres => "postgres",
        }
    }

    /// Human-readable engine name for console messages.
    pub const fn label(self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Server address and login user, without credentials.
///
/// # Example
/// ```rust
/// use dbaudit_core::{Engine, ServerTarget};
///
/// let target = ServerTarget::defaults(Engine::Postgres);
/// assert_eq!(target.endpoint(), "127.0.0.1:5432");
/// assert_eq!(target.username, "postgres");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Login user
    pub username: String,
}

impl ServerTarget {
    /// Creates a target from explicit values.
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
        }
    }

    /// Creates a target with the engine's default host, port, and user.
    pub fn defaults(engine: Engine) -> Self {
        Self::new(DEFAULT_HOST, engine.default_port(), engine.default_username())
    }

    /// `host:port`, suitable for logs and messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Attaches a password to produce full connection parameters.
    pub fn with_password(&self, password: &str) -> ConnectionParams {
        ConnectionParams::new(
            self.host.clone(),
            self.port,
            self.username.clone(),
            password.to_string(),
        )
    }

    /// Parameters for an anonymous login attempt: empty user and password.
    pub fn anonymous(&self) -> ConnectionParams {
        ConnectionParams::new(self.host.clone(), self.port, String::new(), String::new())
    }
}

impl fmt::Display for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}
