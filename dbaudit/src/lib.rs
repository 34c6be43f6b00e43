//! Command tree and dispatcher for `dbaudit`.
//!
//! Exposed as a library so the dispatcher can be driven from tests with a
//! scripted password reader and a captured report. The binary in `main.rs`
//! only wires in the terminal and standard output.
//!
//! # Operation flags
//! `-i`, `-b`, and `-r` are triggered by *presence* on the command line, not
//! by their value: `-b` and `-b=false` both request a backup. `-b` and `-r`
//! conflict at parse time.

use clap::parser::ValueSource;
use clap::{ArgAction, ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use dbaudit_core::adapters::{mysql, postgres};
use dbaudit_core::config::DEFAULT_HOST;
use dbaudit_core::error::{AuditError, InventoryError, TransferError};
use dbaudit_core::security::{PasswordCache, PasswordReader};
use dbaudit_core::transfer::{self, NativeTools};
use dbaudit_core::{Engine, Report, ServerTarget};
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

/// Printed when no operation flag was given.
pub const USAGE_HINT: &str = "This command must be run with -i, -b, or -r";

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "dbaudit")]
#[command(about = "Inventory, back up, and restore database instances")]
#[command(version)]
#[command(long_about = "
dbaudit - database triage for time-boxed defense exercises

Each engine subcommand offers three independent operations:
- Inventory (-i): accounts, authentication state, grants, content, and
  security-relevant configuration
- Backup (-b): full-instance dump through the vendor dump tool
- Restore (-r): replay a dump file through the vendor load tool

The password is prompted once and reused by every operation in the run.

EXAMPLES:
  dbaudit mysql -i
  dbaudit mysql -i -b -f all.sql
  dbaudit psql -H 10.0.0.5 -u postgres -r -f instance.sql
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: EngineCommand,
}

/// Logging flags accepted anywhere on the command line.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase diagnostic verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress diagnostics
    #[arg(short, long, global = true, help = "Only log errors")]
    pub quiet: bool,
}

/// One subcommand per database engine.
#[derive(Debug, Subcommand)]
pub enum EngineCommand {
    /// Audit a MySQL or MariaDB instance
    #[command(name = "mysql", visible_alias = "mariadb")]
    Mysql(OperationArgs),
    /// Audit a PostgreSQL instance
    #[command(name = "psql", visible_alias = "postgres")]
    Psql(OperationArgs),
}

impl EngineCommand {
    /// Engine selected by the subcommand.
    pub const fn engine(&self) -> Engine {
        match self {
            Self::Mysql(_) => Engine::MySql,
            Self::Psql(_) => Engine::Postgres,
        }
    }

    /// Flags shared by both subcommands.
    pub const fn args(&self) -> &OperationArgs {
        match self {
            Self::Mysql(args) | Self::Psql(args) => args,
        }
    }
}

/// Connection and operation flags common to both engines.
#[derive(Debug, Args)]
pub struct OperationArgs {
    /// Server port
    #[arg(
        short = 'p',
        long,
        env = "DBAUDIT_PORT",
        help = "Port to connect to [default: 3306 for mysql, 5432 for psql]"
    )]
    pub port: Option<u16>,

    /// Server host
    #[arg(short = 'H', long, env = "DBAUDIT_HOST", default_value = DEFAULT_HOST, help = "Host to connect to")]
    pub host: String,

    /// Login user
    #[arg(
        short = 'u',
        long,
        env = "DBAUDIT_USER",
        help = "User to connect as [default: root for mysql, postgres for psql]"
    )]
    pub username: Option<String>,

    /// Run inventory checks
    #[arg(
        short = 'i',
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true",
        help = "Run inventory checks"
    )]
    pub inventory: bool,

    /// Run a backup
    #[arg(
        short = 'b',
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true",
        conflicts_with = "restore",
        help = "Back up the whole instance into --file"
    )]
    pub backup: bool,

    /// Run a restore
    #[arg(
        short = 'r',
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true",
        help = "Restore the instance from --file"
    )]
    pub restore: bool,

    /// Dump file
    #[arg(short = 'f', long, value_name = "FILE", help = "File to use for backup/restore")]
    pub file: Option<PathBuf>,
}

/// Which operations were named on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Operations {
    /// `-i` present
    pub inventory: bool,
    /// `-b` present
    pub backup: bool,
    /// `-r` present
    pub restore: bool,
}

impl Operations {
    /// Reads flag presence from a subcommand's matches.
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let present = |id: &str| matches.value_source(id) == Some(ValueSource::CommandLine);
        Self {
            inventory: present("inventory"),
            backup: present("backup"),
            restore: present("restore"),
        }
    }

    /// True when no operation was requested.
    pub const fn is_empty(&self) -> bool {
        !(self.inventory || self.backup || self.restore)
    }
}

/// A fully parsed command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Selected engine
    pub engine: Engine,
    /// Where to connect and as whom
    pub target: ServerTarget,
    /// `--file`, if given
    pub file: Option<PathBuf>,
    /// Requested operations
    pub operations: Operations,
    /// `-v` count
    pub verbose: u8,
    /// `-q`
    pub quiet: bool,
}

impl Invocation {
    /// Parses an argument vector, including the program name.
    ///
    /// # Errors
    /// Returns the clap error for invalid flags, conflicting `-b`/`-r`, a
    /// missing subcommand, or `--help`/`--version`.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Cli::command().try_get_matches_from(args)?;
        let cli = Cli::from_arg_matches(&matches)?;

        let operations = matches
            .subcommand()
            .map(|(_, sub)| Operations::from_matches(sub))
            .unwrap_or_default();

        let engine = cli.command.engine();
        let args = cli.command.args();
        let target = ServerTarget::new(
            args.host.clone(),
            args.port.unwrap_or_else(|| engine.default_port()),
            args.username
                .clone()
                .unwrap_or_else(|| engine.default_username().to_string()),
        );

        Ok(Self {
            engine,
            target,
            file: args.file.clone(),
            operations,
            verbose: cli.global.verbose,
            quiet: cli.global.quiet,
        })
    }
}

/// Runs the requested operations: inventory first, then backup or restore.
///
/// Operation failures are printed and do not produce an error; the process
/// still exits 0 after a failed backup.
///
/// # Errors
/// Returns [`AuditError::Inventory`] or [`AuditError::Io`] only when the
/// report itself can no longer be written.
pub async fn dispatch<R, W>(
    invocation: &Invocation,
    passwords: &mut PasswordCache<R>,
    out: &mut Report<W>,
) -> dbaudit_core::Result<()>
where
    R: PasswordReader,
    W: Write,
{
    let operations = invocation.operations;
    if operations.is_empty() {
        return out.line(USAGE_HINT).map_err(|source| AuditError::Io {
            context: "writing usage hint".to_string(),
            source,
        });
    }

    tracing::debug!(
        "Dispatching {:?} against {} ({})",
        operations,
        invocation.target,
        invocation.engine
    );

    if operations.inventory {
        let outcome = match invocation.engine {
            Engine::MySql => mysql::run_inventory(&invocation.target, passwords, out).await,
            Engine::Postgres => postgres::run_inventory(&invocation.target, passwords, out).await,
        };
        match outcome {
            Ok(()) => {}
            Err(InventoryError::Output(e)) => return Err(InventoryError::Output(e).into()),
            Err(e) => {
                tracing::debug!("Inventory failed: {}", e);
                write_status(out, &e)?;
            }
        }
    }

    if operations.backup || operations.restore {
        match invocation.engine {
            Engine::MySql => {
                run_transfer(&mysql::MySqlTools::default(), invocation, passwords, out).await?;
            }
            Engine::Postgres => {
                run_transfer(&postgres::PostgresTools::default(), invocation, passwords, out)
                    .await?;
            }
        }
    }

    Ok(())
}

async fn run_transfer<T, R, W>(
    tools: &T,
    invocation: &Invocation,
    passwords: &mut PasswordCache<R>,
    out: &mut Report<W>,
) -> dbaudit_core::Result<()>
where
    T: NativeTools,
    R: PasswordReader,
    W: Write,
{
    let file = invocation.file.as_deref();

    if invocation.operations.backup {
        if let Err(e) = transfer::backup(tools, &invocation.target, file, passwords, out).await {
            report_transfer_failure(out, "Backup failed", &e)?;
        }
    } else if let Err(e) = transfer::restore(tools, &invocation.target, file, passwords, out).await
    {
        report_transfer_failure(out, "Restore failed", &e)?;
    }

    Ok(())
}

fn report_transfer_failure<W: Write>(
    out: &mut Report<W>,
    label: &str,
    error: &TransferError,
) -> dbaudit_core::Result<()> {
    if error.is_precondition() {
        tracing::debug!("{}: precondition not met: {}", label, error);
        write_status(out, error)
    } else {
        tracing::debug!("{}: {}", label, error);
        write_status(out, format_args!("{label}: {error}"))
    }
}

fn write_status<W: Write>(out: &mut Report<W>, text: impl std::fmt::Display) -> dbaudit_core::Result<()> {
    out.line(text).map_err(|source| AuditError::Io {
        context: "writing operation status".to_string(),
        source,
    })
}
