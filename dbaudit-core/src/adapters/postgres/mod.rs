//! PostgreSQL support.
//!
//! # Native tools
//! Backup pipes `pg_dumpall` into the destination file; restore feeds the
//! input file to `psql` against the `postgres` database. Both read the
//! password from `PGPASSWORD` in the child environment only.

pub mod connection;
pub mod inventory;

pub use connection::{DEFAULT_DATABASE, connect, probe};
pub use inventory::run_inventory;

use crate::process::ToolCommand;
use crate::security::ConnectionParams;
use crate::transfer::{FailureCleanup, NativeTools};
use crate::{Engine, ServerTarget};

/// Default dump executable.
pub const DUMP_PROGRAM: &str = "pg_dumpall";

/// Default load executable.
pub const LOAD_PROGRAM: &str = "psql";

/// Environment variable libpq reads the password from.
pub const PASSWORD_ENV: &str = "PGPASSWORD";

/// `pg_dumpall`/`psql` invocation builder.
#[derive(Debug, Clone)]
pub struct PostgresTools {
    dump_program: String,
    load_program: String,
}

impl Default for PostgresTools {
    fn default() -> Self {
        Self {
            dump_program: DUMP_PROGRAM.to_string(),
            load_program: LOAD_PROGRAM.to_string(),
        }
    }
}

impl PostgresTools {
    /// Uses explicit executables instead of the search-path defaults.
    #[must_use]
    pub fn with_programs(dump: impl Into<String>, load: impl Into<String>) -> Self {
        Self {
            dump_program: dump.into(),
            load_program: load.into(),
        }
    }

    fn connection_command(program: &str, params: &ConnectionParams) -> ToolCommand {
        ToolCommand::new(program)
            .args([
                "-h".to_string(),
                params.host().to_string(),
                "-p".to_string(),
                params.port().to_string(),
                "-U".to_string(),
                params.username().to_string(),
            ])
            .secret_env(PASSWORD_ENV, params.password())
    }
}

impl NativeTools for PostgresTools {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn dump_program(&self) -> &str {
        &self.dump_program
    }

    fn load_program(&self) -> &str {
        &self.load_program
    }

    fn dump_command(&self, params: &ConnectionParams) -> ToolCommand {
        Self::connection_command(&self.dump_program, params)
    }

    fn load_command(&self, params: &ConnectionParams) -> ToolCommand {
        Self::connection_command(&self.load_program, params).args(["-d", DEFAULT_DATABASE])
    }

    fn backup_failure_cleanup(&self) -> FailureCleanup {
        FailureCleanup::Remove
    }

    fn backup_banner(&self, target: &ServerTarget) -> String {
        format!("Backing up instance from {}...", target.endpoint())
    }

    fn forward_load_output(&self) -> bool {
        true
    }
}
