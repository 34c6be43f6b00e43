//! Backup and restore orchestration over vendor tools.
//!
//! Neither direction parses dump files. Backup streams the dump tool's
//! stdout into the destination file. Restore feeds the input file to the
//! load tool's stdin. The tool's exit status is the only success signal.
//!
//! Preconditions are checked in a fixed order, before any prompt, connection,
//! or file work: the path flag first, then the tool lookup.
//!
//! Failure cleanup is a per-engine policy ([`FailureCleanup`]):
//! - a failed MySQL backup keeps its partial output file
//! - a failed PostgreSQL backup removes its partial output file
//! - a failed restore deletes its input file on both engines

use crate::error::TransferError;
use crate::process::{ToolCommand, command_exists, run_captured};
use crate::report::Report;
use crate::security::{ConnectionParams, PasswordCache, PasswordReader};
use crate::{Engine, ServerTarget};
use std::io::Write;
use std::path::{Path, PathBuf};

/// What happens to the file involved when the native tool fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCleanup {
    /// Leave the file exactly as the tool left it
    Keep,
    /// Delete the file
    Remove,
}

/// Engine-specific knowledge of the vendor dump/load tools.
pub trait NativeTools {
    /// Engine these tools belong to.
    fn engine(&self) -> Engine;

    /// Dump executable name or path.
    fn dump_program(&self) -> &str;

    /// Load executable name or path.
    fn load_program(&self) -> &str;

    /// Full-instance dump invocation.
    fn dump_command(&self, params: &ConnectionParams) -> ToolCommand;

    /// Load invocation that reads SQL from stdin.
    fn load_command(&self, params: &ConnectionParams) -> ToolCommand;

    /// Policy for the destination file when the dump tool fails.
    fn backup_failure_cleanup(&self) -> FailureCleanup;

    /// Policy for the input file when the load tool fails.
    fn restore_failure_cleanup(&self) -> FailureCleanup {
        FailureCleanup::Remove
    }

    /// Status line printed before the dump starts.
    fn backup_banner(&self, target: &ServerTarget) -> String;

    /// Whether the load tool's stdout goes to the console instead of being discarded.
    fn forward_load_output(&self) -> bool {
        false
    }
}

/// Dumps the whole instance into `file`.
///
/// # Errors
/// - [`TransferError::MissingFile`] / [`TransferError::ToolNotFound`]: checked
///   first, nothing is created
/// - [`TransferError::Credential`]: the password prompt failed
/// - [`TransferError::CreateOutput`]: the destination could not be created
/// - [`TransferError::Tool`]: the dump tool failed; the destination is then
///   handled per [`NativeTools::backup_failure_cleanup`]
pub async fn backup<T, R, W>(
    tools: &T,
    target: &ServerTarget,
    file: Option<&Path>,
    passwords: &mut PasswordCache<R>,
    out: &mut Report<W>,
) -> Result<PathBuf, TransferError>
where
    T: NativeTools,
    R: PasswordReader,
    W: Write,
{
    let path = require_file(file)?;
    require_tool(tools.dump_program())?;

    let params = target.with_password(passwords.get()?);
    let command = tools.dump_command(&params);

    let destination = create_output(&path).await?;

    report_status(out, &tools.backup_banner(target));
    tracing::debug!(
        "Starting {} backup of {} into {}",
        tools.engine(),
        target.endpoint(),
        path.display()
    );

    if let Err(e) = run_captured(&command, None, Some(destination)).await {
        apply_cleanup(tools.backup_failure_cleanup(), &path).await;
        return Err(e.into());
    }

    report_status(
        out,
        &format!("Backup completed successfully: {}", path.display()),
    );
    Ok(path)
}

/// Replays the dump in `file` into the instance.
///
/// # Errors
/// - [`TransferError::MissingFile`] / [`TransferError::ToolNotFound`]: checked
///   first, the input is untouched
/// - [`TransferError::Credential`]: the password prompt failed
/// - [`TransferError::OpenInput`]: the input could not be opened
/// - [`TransferError::Tool`]: the load tool failed; the input is then
///   handled per [`NativeTools::restore_failure_cleanup`]
pub async fn restore<T, R, W>(
    tools: &T,
    target: &ServerTarget,
    file: Option<&Path>,
    passwords: &mut PasswordCache<R>,
    out: &mut Report<W>,
) -> Result<(), TransferError>
where
    T: NativeTools,
    R: PasswordReader,
    W: Write,
{
    let path = require_file(file)?;
    require_tool(tools.load_program())?;

    let params = target.with_password(passwords.get()?);
    let command = tools.load_command(&params);

    let input = tokio::fs::File::open(&path)
        .await
        .map_err(|source| TransferError::OpenInput {
            path: path.clone(),
            source,
        })?
        .into_std()
        .await;

    report_status(out, &format!("Restoring backup from {}...", path.display()));
    tracing::debug!(
        "Starting {} restore of {} into {}",
        tools.engine(),
        path.display(),
        target.endpoint()
    );

    let output = if tools.forward_load_output() {
        None
    } else {
        Some(discard_sink()?)
    };

    if let Err(e) = run_captured(&command, Some(input), output).await {
        apply_cleanup(tools.restore_failure_cleanup(), &path).await;
        return Err(e.into());
    }

    report_status(out, "Restoration completed successfully");
    Ok(())
}

fn require_file(file: Option<&Path>) -> Result<PathBuf, TransferError> {
    match file {
        Some(path) if !path.as_os_str().is_empty() => Ok(path.to_path_buf()),
        _ => Err(TransferError::MissingFile),
    }
}

fn require_tool(program: &str) -> Result<(), TransferError> {
    if command_exists(program) {
        Ok(())
    } else {
        Err(TransferError::ToolNotFound {
            program: program.to_string(),
        })
    }
}

async fn create_output(path: &Path) -> Result<std::fs::File, TransferError> {
    let file = tokio::fs::File::create(path)
        .await
        .map_err(|source| TransferError::CreateOutput {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(file.into_std().await)
}

fn discard_sink() -> Result<std::fs::File, TransferError> {
    let null = if cfg!(windows) { "NUL" } else { "/dev/null" };
    std::fs::OpenOptions::new()
        .write(true)
        .open(null)
        .map_err(|source| TransferError::CreateOutput {
            path: PathBuf::from(null),
            source,
        })
}

async fn apply_cleanup(policy: FailureCleanup, path: &Path) {
    if policy == FailureCleanup::Keep {
        tracing::debug!("Leaving {} in place after tool failure", path.display());
        return;
    }

    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::warn!("Removed {} after tool failure", path.display()),
        Err(e) => tracing::warn!(
            "Could not remove {} after tool failure: {}",
            path.display(),
            e
        ),
    }
}

fn report_status<W: Write>(out: &mut Report<W>, message: &str) {
    if let Err(e) = out.line(message) {
        tracing::warn!("Failed to write status line: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_file() {
        assert!(matches!(require_file(None), Err(TransferError::MissingFile)));
        assert!(matches!(
            require_file(Some(Path::new(""))),
            Err(TransferError::MissingFile)
        ));
        assert_eq!(
            require_file(Some(Path::new("dump.sql"))).unwrap(),
            PathBuf::from("dump.sql")
        );
    }

    #[test]
    fn test_require_tool_names_missing_program() {
        let err = require_tool("dbaudit-no-such-dump-tool").unwrap_err();
        assert!(err.is_precondition());
        assert!(err.to_string().contains("dbaudit-no-such-dump-tool"));
    }
}
