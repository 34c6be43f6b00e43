//! Error types with credential sanitization.
//!
//! Each component owns a small closed error enum so callers can branch on
//! the kind of failure instead of matching message text. None of these types
//! ever carry a password: connection failures name the endpoint and user only,
//! and native tool failures name the program, never its arguments.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Failure to establish a database connection.
///
/// Produced by the per-engine connection factories after the liveness probe.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Nothing answered at the endpoint (refused, unreachable, or timed out)
    #[error("DB not listening at {endpoint}")]
    NotListening { endpoint: String },

    /// The server answered and rejected the credentials
    #[error("SQL authentication failed for {username}@{endpoint}")]
    AuthenticationFailed { username: String, endpoint: String },

    /// Any other connection failure; the cause is kept for diagnostics
    #[error("could not connect to {endpoint}: {source}")]
    Other {
        endpoint: String,
        #[source]
        source: sqlx::Error,
    },
}

impl ConnectError {
    /// Returns true when the server rejected the supplied credentials.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    /// Returns true when nothing answered at the endpoint.
    pub fn is_not_listening(&self) -> bool {
        matches!(self, Self::NotListening { .. })
    }
}

/// Failure to obtain the database password from the terminal.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The terminal could not be switched to no-echo mode or the read failed
    #[error("failed to read password: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to run a native executable.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The child could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child ran and exited unsuccessfully
    #[error("{program} exited with {status}")]
    Exit { program: String, status: ExitStatus },
}

/// Failure of a backup or restore operation.
#[derive(Debug, Error)]
pub enum TransferError {
    /// `--file` was not supplied
    #[error("This command requires -f to be specified")]
    MissingFile,

    /// The native dump/load tool is not on the search path
    #[error("This command requires {program} to be in path")]
    ToolNotFound { program: String },

    /// The restore input could not be opened
    #[error("Could not open {}: {source}", path.display())]
    OpenInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backup destination could not be created
    #[error("Could not create {}: {source}", path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The password could not be read
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The native tool failed to start or exited non-zero
    #[error(transparent)]
    Tool(#[from] ProcessError),
}

impl TransferError {
    /// Returns true for failures detected before any connection or
    /// subprocess work, which leave the filesystem untouched.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::MissingFile | Self::ToolNotFound { .. })
    }
}

/// Failure inside an inventory run.
///
/// `Connect` and `Credential` abort the run. `Query` is reported inline for
/// the section that raised it and later sections still run. `Output` means
/// the console itself is gone and aborts everything.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The primary connection could not be established
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The password could not be read
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A query failed or one of its rows could not be decoded
    #[error("{context}: {source}")]
    Query {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Writing the report failed
    #[error("failed to write report: {0}")]
    Output(#[from] std::io::Error),
}

impl InventoryError {
    /// Wraps a query or row-decoding failure with the step that raised it.
    pub fn query(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Query {
            context: context.into(),
            source,
        }
    }
}

/// Top-level error for dbaudit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Inventory failure that aborts the whole command
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Configuration or setup error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Console I/O failure
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl AuditError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results with `AuditError`
pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_kinds() {
        let refused = ConnectError::NotListening {
            endpoint: "127.0.0.1:3306".to_string(),
        };
        assert!(refused.is_not_listening());
        assert!(!refused.is_authentication_failure());
        assert_eq!(refused.to_string(), "DB not listening at 127.0.0.1:3306");

        let denied = ConnectError::AuthenticationFailed {
            username: "root".to_string(),
            endpoint: "127.0.0.1:3306".to_string(),
        };
        assert!(denied.is_authentication_failure());
        assert!(denied.to_string().contains("root@127.0.0.1:3306"));
    }

    #[test]
    fn test_transfer_precondition_classification() {
        assert!(TransferError::MissingFile.is_precondition());
        assert!(
            TransferError::ToolNotFound {
                program: "mysqldump".to_string()
            }
            .is_precondition()
        );

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let open = TransferError::OpenInput {
            path: PathBuf::from("/tmp/dump.sql"),
            source: io,
        };
        assert!(!open.is_precondition());
        assert!(open.to_string().contains("/tmp/dump.sql"));
    }

    #[test]
    fn test_precondition_messages() {
        assert_eq!(
            TransferError::MissingFile.to_string(),
            "This command requires -f to be specified"
        );
        assert_eq!(
            TransferError::ToolNotFound {
                program: "pg_dumpall".to_string()
            }
            .to_string(),
            "This command requires pg_dumpall to be in path"
        );
    }

    #[test]
    fn test_error_creation() {
        let error = AuditError::configuration("Invalid port");
        assert!(error.to_string().contains("Invalid port"));
    }
}
