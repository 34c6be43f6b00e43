//! Connection parameters with automatic memory zeroing.
//!
//! # Security
//! - The whole parameter set is zeroized when dropped
//! - `Debug` masks the password and `Display` omits it entirely

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Everything needed to open a connection, password included.
///
/// Built from a [`crate::ServerTarget`] once the password is known and
/// discarded when the owning operation returns.
///
/// # Example
///
/// ```rust
/// use dbaudit_core::security::ConnectionParams;
///
/// let params = ConnectionParams::new("localhost".into(), 5432, "postgres".into(), "secret".into())
///     .for_database("inventory");
/// assert_eq!(params.database(), Some("inventory"));
/// assert!(!format!("{params:?}").contains("secret"));
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ConnectionParams {
    host: String,
    port: u16,
    username: String,
    password: String,
    database: Option<String>,
}

impl ConnectionParams {
    /// Creates parameters without a target database.
    pub fn new(host: String, port: u16, username: String, password: String) -> Self {
        Self {
            host,
            port,
            username,
            password,
            database: None,
        }
    }

    /// Copy of these parameters aimed at a specific database.
    pub fn for_database(&self, database: &str) -> Self {
        let mut params = self.clone();
        params.database = Some(database.to_string());
        params
    }

    /// Server host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Login user; empty for anonymous probes.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The secret. Callers hand it to a driver or native tool, never to a log.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether a non-empty password is present.
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    /// Target database, if any.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// `host:port`, suitable for logs and messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)?;
        if let Some(database) = &self.database {
            write!(f, "/{database}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams::new(
            "db.example.com".to_string(),
            5432,
            "admin".to_string(),
            "super_secret_password_123".to_string(),
        )
    }

    #[test]
    fn test_credential_debug_masks_password() {
        let debug = format!("{:?}", params());
        assert!(!debug.contains("super_secret_password_123"));
        assert!(debug.contains("****"));
        assert!(debug.contains("db.example.com"));
    }

    #[test]
    fn test_credential_display_omits_password() {
        let display = params().for_database("sales").to_string();
        assert_eq!(display, "admin@db.example.com:5432/sales");
        assert!(!display.contains("super_secret"));
    }

    #[test]
    fn test_for_database_keeps_credentials() {
        let base = params();
        let scoped = base.for_database("inventory");
        assert_eq!(scoped.database(), Some("inventory"));
        assert_eq!(scoped.password(), base.password());
        assert_eq!(base.database(), None);
    }

    #[test]
    fn test_credential_has_password() {
        assert!(params().has_password());
        let empty = ConnectionParams::new("h".into(), 1, String::new(), String::new());
        assert!(!empty.has_password());
    }
}
