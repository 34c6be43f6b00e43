//! Native tool lookup and execution.
//!
//! The dump and load tools (`mysqldump`, `mysql`, `pg_dumpall`, `psql`) are
//! vendor executables found on the search path. This module checks that
//! they exist, then runs them with a file wired to stdin or stdout while
//! stderr passes straight through to the console.
//!
//! # Security
//! - Secret arguments and environment values are kept in zeroizing memory
//! - Only masked argument vectors are ever logged

use crate::error::ProcessError;
use std::env;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use zeroize::Zeroizing;

/// A single argument for a native tool.
pub enum ToolArg {
    /// Safe to log
    Plain(String),
    /// Carries a credential; logged as `****`
    Secret(Zeroizing<String>),
}

impl ToolArg {
    fn as_str(&self) -> &str {
        match self {
            Self::Plain(value) => value.as_str(),
            Self::Secret(value) => value.as_str(),
        }
    }

    fn masked(&self) -> &str {
        match self {
            Self::Plain(value) => value.as_str(),
            Self::Secret(_) => "****",
        }
    }
}

/// A fully-built native tool invocation.
///
/// # Example
/// ```rust
/// use dbaudit_core::process::ToolCommand;
///
/// let cmd = ToolCommand::new("mysqldump")
///     .args(["-u", "root"])
///     .secret_arg("-phunter2")
///     .arg("--all-databases");
/// assert_eq!(cmd.masked_args(), vec!["-u", "root", "****", "--all-databases"]);
/// ```
pub struct ToolCommand {
    program: String,
    args: Vec<ToolArg>,
    env: Vec<(String, Zeroizing<String>)>,
}

impl ToolCommand {
    /// Starts an invocation of `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Appends a loggable argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(ToolArg::Plain(arg.into()));
        self
    }

    /// Appends several loggable arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(args.into_iter().map(|a| ToolArg::Plain(a.into())));
        self
    }

    /// Appends an argument that embeds a credential.
    #[must_use]
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(ToolArg::Secret(Zeroizing::new(arg.into())));
        self
    }

    /// Adds an environment variable on top of the inherited environment.
    #[must_use]
    pub fn secret_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), Zeroizing::new(value.into())));
        self
    }

    /// The executable name or path.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with credentials replaced by `****`.
    pub fn masked_args(&self) -> Vec<&str> {
        self.args.iter().map(ToolArg::masked).collect()
    }

    /// Names of the extra environment variables (values are never exposed).
    pub fn env_keys(&self) -> Vec<&str> {
        self.env.iter().map(|(key, _)| key.as_str()).collect()
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.args.iter().map(ToolArg::as_str));
        for (key, value) in &self.env {
            command.env(key, value.as_str());
        }
        command
    }
}

impl fmt::Debug for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCommand")
            .field("program", &self.program)
            .field("args", &self.masked_args())
            .field("env", &self.env_keys())
            .finish()
    }
}

/// Resolves `name` to an executable file.
///
/// A name containing a path separator is checked as given; a bare name is
/// searched for in each `PATH` entry. Nothing is executed.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let direct = Path::new(name);
    if direct.is_absolute() || direct.components().count() > 1 {
        return is_executable(direct).then(|| direct.to_path_buf());
    }

    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidates(&dir, name))
        .find(|candidate| is_executable(candidate))
}

/// Whether `name` resolves to an executable on the search path.
pub fn command_exists(name: &str) -> bool {
    find_executable(name).is_some()
}

#[cfg(windows)]
fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    vec![dir.join(name), dir.join(format!("{name}.exe"))]
}

#[cfg(not(windows))]
fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    vec![dir.join(name)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Runs `command` to completion.
///
/// `stdin` becomes the child's standard input (none when `None`); `stdout`
/// receives its standard output (the console when `None`). Standard error is
/// always inherited. The working directory and environment come from this
/// process, plus the command's own environment additions. Never retries.
///
/// # Errors
/// - [`ProcessError::Spawn`] if the child could not be started
/// - [`ProcessError::Exit`] if it exited with a non-zero status
pub async fn run_captured(
    command: &ToolCommand,
    stdin: Option<File>,
    stdout: Option<File>,
) -> Result<(), ProcessError> {
    tracing::debug!(
        program = command.program(),
        args = ?command.masked_args(),
        env = ?command.env_keys(),
        "Spawning native tool"
    );

    let mut child = command.to_command();
    child
        .stdin(stdin.map_or_else(Stdio::null, Stdio::from))
        .stdout(stdout.map_or_else(Stdio::inherit, Stdio::from))
        .stderr(Stdio::inherit());

    let status = child.status().await.map_err(|source| ProcessError::Spawn {
        program: command.program().to_string(),
        source,
    })?;

    tracing::debug!(program = command.program(), %status, "Native tool finished");

    if status.success() {
        Ok(())
    } else {
        Err(ProcessError::Exit {
            program: command.program().to_string(),
            status,
        })
    }
}
