//! MySQL and MariaDB support.
//!
//! # Native tools
//! Backup pipes `mysqldump` into the destination file; restore feeds the
//! input file to `mysql`. Both receive the password as an inline `-p<pw>`
//! argument, which is how those tools take it. The argument is masked in
//! every log line.

pub mod connection;
pub mod inventory;

pub use connection::{AnonymousLogin, anonymous_login_probe, connect, probe};
pub use inventory::run_inventory;

use crate::process::ToolCommand;
use crate::security::ConnectionParams;
use crate::transfer::{FailureCleanup, NativeTools};
use crate::{Engine, ServerTarget};
use sqlx::Row;
use sqlx::mysql::MySqlRow;

/// Default dump executable.
pub const DUMP_PROGRAM: &str = "mysqldump";

/// Default load executable.
pub const LOAD_PROGRAM: &str = "mysql";

/// Flags that make `mysqldump` capture the whole instance consistently.
pub const FULL_INSTANCE_FLAGS: [&str; 4] = [
    "--all-databases",
    "--events",
    "--routines",
    "--single-transaction",
];

/// `mysqldump`/`mysql` invocation builder.
///
/// # Example
/// ```rust
/// use dbaudit_core::adapters::mysql::MySqlTools;
/// use dbaudit_core::transfer::NativeTools;
/// use dbaudit_core::{Engine, ServerTarget};
///
/// let params = ServerTarget::defaults(Engine::MySql).with_password("s3cret");
/// let dump = MySqlTools::default().dump_command(&params);
/// assert_eq!(dump.program(), "mysqldump");
/// assert!(dump.masked_args().contains(&"****"));
/// ```
#[derive(Debug, Clone)]
pub struct MySqlTools {
    dump_program: String,
    load_program: String,
}

impl Default for MySqlTools {
    fn default() -> Self {
        Self {
            dump_program: DUMP_PROGRAM.to_string(),
            load_program: LOAD_PROGRAM.to_string(),
        }
    }
}

impl MySqlTools {
    /// Uses explicit executables instead of the search-path defaults.
    #[must_use]
    pub fn with_programs(dump: impl Into<String>, load: impl Into<String>) -> Self {
        Self {
            dump_program: dump.into(),
            load_program: load.into(),
        }
    }

    fn connection_command(program: &str, params: &ConnectionParams) -> ToolCommand {
        let command = ToolCommand::new(program).args(["-u", params.username()]);
        // `-p` with nothing attached makes the client prompt on its own.
        let command = if params.has_password() {
            command.secret_arg(format!("-p{}", params.password()))
        } else {
            command
        };
        command.args([
            "-h".to_string(),
            params.host().to_string(),
            "-P".to_string(),
            params.port().to_string(),
        ])
    }
}

impl NativeTools for MySqlTools {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn dump_program(&self) -> &str {
        &self.dump_program
    }

    fn load_program(&self) -> &str {
        &self.load_program
    }

    fn dump_command(&self, params: &ConnectionParams) -> ToolCommand {
        Self::connection_command(&self.dump_program, params).args(FULL_INSTANCE_FLAGS)
    }

    fn load_command(&self, params: &ConnectionParams) -> ToolCommand {
        Self::connection_command(&self.load_program, params)
    }

    fn backup_failure_cleanup(&self) -> FailureCleanup {
        FailureCleanup::Keep
    }

    fn backup_banner(&self, target: &ServerTarget) -> String {
        format!("Starting full MySQL backup from {}...", target.endpoint())
    }
}

/// Reads a text column, falling back to a lossy decode of binary values.
///
/// `SHOW` statements and some catalog columns come back as `VARBINARY` on
/// older servers.
pub(crate) fn text_column(row: &MySqlRow, index: usize) -> Result<String, sqlx::Error> {
    match row.try_get::<String, _>(index) {
        Ok(value) => Ok(value),
        Err(_) => {
            let bytes: Vec<u8> = row.try_get(index)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(password: &str) -> ConnectionParams {
        ServerTarget::new("10.0.0.5", 3307, "admin").with_password(password)
    }

    #[test]
    fn test_dump_command_shape() {
        let cmd = MySqlTools::default().dump_command(&params("pw"));
        assert_eq!(cmd.program(), "mysqldump");
        assert_eq!(
            cmd.masked_args(),
            vec![
                "-u",
                "admin",
                "****",
                "-h",
                "10.0.0.5",
                "-P",
                "3307",
                "--all-databases",
                "--events",
                "--routines",
                "--single-transaction",
            ]
        );
        assert!(cmd.env_keys().is_empty());
    }

    #[test]
    fn test_load_command_omits_empty_password() {
        let cmd = MySqlTools::default().load_command(&params(""));
        assert_eq!(cmd.program(), "mysql");
        assert_eq!(
            cmd.masked_args(),
            vec!["-u", "admin", "-h", "10.0.0.5", "-P", "3307"]
        );
    }

    #[test]
    fn test_cleanup_policy_and_banner() {
        let tools = MySqlTools::with_programs("/opt/bin/mysqldump", "/opt/bin/mysql");
        assert_eq!(tools.dump_program(), "/opt/bin/mysqldump");
        assert_eq!(tools.load_program(), "/opt/bin/mysql");
        assert_eq!(tools.backup_failure_cleanup(), FailureCleanup::Keep);
        assert_eq!(tools.restore_failure_cleanup(), FailureCleanup::Remove);
        assert!(!tools.forward_load_output());
        assert_eq!(
            tools.backup_banner(&ServerTarget::defaults(Engine::MySql)),
            "Starting full MySQL backup from 127.0.0.1:3306..."
        );
    }
}
