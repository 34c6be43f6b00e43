//! Backup and restore orchestration against fake native tools.
//!
//! Each fake tool is a small shell script in a temp directory, handed to the
//! orchestrator by absolute path. The scripts record their arguments and the
//! `PGPASSWORD` they saw, then exit with a chosen status.

#![cfg(unix)]
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use dbaudit_core::adapters::mysql::{self, MySqlTools};
use dbaudit_core::adapters::postgres::PostgresTools;
use dbaudit_core::error::{ProcessError, TransferError};
use dbaudit_core::security::{PasswordCache, PasswordReader};
use dbaudit_core::transfer::{backup, restore};
use dbaudit_core::{Report, ServerTarget};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const PASSWORD: &str = "S3cret!";

#[derive(Default)]
struct CountingReader {
    prompts: usize,
}

impl PasswordReader for CountingReader {
    fn read_password(&mut self, _prompt: &str) -> io::Result<String> {
        self.prompts += 1;
        Ok(format!("{PASSWORD}\n"))
    }
}

fn passwords() -> PasswordCache<CountingReader> {
    PasswordCache::new(CountingReader::default())
}

fn write_tool(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_str().unwrap().to_string()
}

fn missing_tool(dir: &Path) -> String {
    dir.join("not-installed").to_str().unwrap().to_string()
}

fn report() -> Report<Vec<u8>> {
    Report::new(Vec::new())
}

fn text(out: Report<Vec<u8>>) -> String {
    String::from_utf8(out.into_inner()).unwrap()
}

fn target(port: u16) -> ServerTarget {
    ServerTarget::new("127.0.0.1", port, "auditor")
}

fn scratch() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("instance.sql");
    (dir, file)
}

mod backup_tests {
    use super::*;

    #[tokio::test]
    async fn test_mysql_backup_writes_dump_and_reports_success() {
        let (dir, file) = scratch();
        let dump = write_tool(dir.path(), "mysqldump", r#"echo "-- dump"; echo "$@""#);
        let tools = MySqlTools::with_programs(dump, missing_tool(dir.path()));
        let mut cache = passwords();
        let mut out = report();

        let written = backup(&tools, &target(3307), Some(file.as_path()), &mut cache, &mut out)
            .await
            .unwrap();

        assert_eq!(written, file);
        let dump = std::fs::read_to_string(&file).unwrap();
        assert_eq!(
            dump,
            format!(
                "-- dump\n-u auditor -p{PASSWORD} -h 127.0.0.1 -P 3307 --all-databases --events --routines --single-transaction\n"
            )
        );

        let printed = text(out);
        assert!(printed.starts_with("Starting full MySQL backup from 127.0.0.1:3307...\n"));
        assert!(printed.ends_with(&format!(
            "Backup completed successfully: {}\n",
            file.display()
        )));
        assert!(!printed.contains(PASSWORD));
        assert_eq!(cache.reader().prompts, 1);
    }

    #[tokio::test]
    async fn test_postgres_backup_passes_password_in_environment() {
        let (dir, file) = scratch();
        let dump = write_tool(
            dir.path(),
            "pg_dumpall",
            r#"echo "args=$*"; echo "pgpassword=$PGPASSWORD""#,
        );
        let tools = PostgresTools::with_programs(dump, missing_tool(dir.path()));

        backup(&tools, &target(5432), Some(file.as_path()), &mut passwords(), &mut report())
            .await
            .unwrap();

        let dump = std::fs::read_to_string(&file).unwrap();
        assert_eq!(
            dump,
            format!("args=-h 127.0.0.1 -p 5432 -U auditor\npgpassword={PASSWORD}\n")
        );
    }

    #[tokio::test]
    async fn test_backup_missing_tool_creates_nothing_and_skips_prompt() {
        let (dir, file) = scratch();
        let tools = MySqlTools::with_programs(missing_tool(dir.path()), missing_tool(dir.path()));
        let mut cache = passwords();

        let err = backup(&tools, &target(3306), Some(file.as_path()), &mut cache, &mut report())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::ToolNotFound { .. }));
        assert!(err.is_precondition());
        assert!(err.to_string().ends_with("to be in path"));
        assert!(!file.exists());
        assert_eq!(cache.reader().prompts, 0);
    }

    #[tokio::test]
    async fn test_backup_missing_file_is_checked_before_tool() {
        let dir = tempfile::tempdir().unwrap();
        let tools = PostgresTools::with_programs(missing_tool(dir.path()), missing_tool(dir.path()));

        let err = backup(&tools, &target(5432), None, &mut passwords(), &mut report())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::MissingFile));
        assert_eq!(err.to_string(), "This command requires -f to be specified");
    }

    #[tokio::test]
    async fn test_failed_mysql_backup_keeps_partial_file() {
        let (dir, file) = scratch();
        let dump = write_tool(dir.path(), "mysqldump", "echo partial; exit 2");
        let tools = MySqlTools::with_programs(dump, missing_tool(dir.path()));

        let err = backup(&tools, &target(3306), Some(file.as_path()), &mut passwords(), &mut report())
            .await
            .unwrap_err();

        match err {
            TransferError::Tool(ProcessError::Exit { status, .. }) => {
                assert_eq!(status.code(), Some(2));
            }
            other => panic!("expected tool exit failure, got {other:?}"),
        }
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "partial\n");
    }

    #[tokio::test]
    async fn test_failed_postgres_backup_removes_partial_file() {
        let (dir, file) = scratch();
        let dump = write_tool(dir.path(), "pg_dumpall", "echo partial; exit 1");
        let tools = PostgresTools::with_programs(dump, missing_tool(dir.path()));

        let err = backup(&tools, &target(5432), Some(file.as_path()), &mut passwords(), &mut report())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Tool(_)));
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_backup_truncates_existing_destination() {
        let (dir, file) = scratch();
        std::fs::write(&file, "stale contents that are much longer than the new dump\n").unwrap();
        let dump = write_tool(dir.path(), "mysqldump", "echo fresh");
        let tools = MySqlTools::with_programs(dump, missing_tool(dir.path()));

        backup(&tools, &target(3306), Some(file.as_path()), &mut passwords(), &mut report())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "fresh\n");
    }
}

mod restore_tests {
    use super::*;

    #[tokio::test]
    async fn test_mysql_restore_feeds_file_to_stdin() {
        let (dir, file) = scratch();
        std::fs::write(&file, "CREATE DATABASE shop;\n").unwrap();
        let received = dir.path().join("received.sql");
        let load = write_tool(
            dir.path(),
            "mysql",
            &format!(
                r#"cat > "{}"; echo "$@" >> "{}"; echo "to stdout""#,
                received.display(),
                received.display()
            ),
        );
        let tools = MySqlTools::with_programs(missing_tool(dir.path()), load);
        let mut out = report();

        restore(&tools, &target(3306), Some(file.as_path()), &mut passwords(), &mut out)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&received).unwrap(),
            format!("CREATE DATABASE shop;\n-u auditor -p{PASSWORD} -h 127.0.0.1 -P 3306\n")
        );
        assert!(file.exists());

        let printed = text(out);
        assert_eq!(
            printed,
            format!(
                "Restoring backup from {}...\nRestoration completed successfully\n",
                file.display()
            )
        );
    }

    #[tokio::test]
    async fn test_postgres_restore_targets_postgres_database() {
        let (dir, file) = scratch();
        std::fs::write(&file, "SELECT 1;\n").unwrap();
        let received = dir.path().join("received.txt");
        let load = write_tool(
            dir.path(),
            "psql",
            &format!(
                r#"cat > /dev/null; echo "$* pw=$PGPASSWORD" > "{}""#,
                received.display()
            ),
        );
        let tools = PostgresTools::with_programs(missing_tool(dir.path()), load);

        restore(&tools, &target(5432), Some(file.as_path()), &mut passwords(), &mut report())
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&received).unwrap(),
            format!("-h 127.0.0.1 -p 5432 -U auditor -d postgres pw={PASSWORD}\n")
        );
    }

    #[tokio::test]
    async fn test_restore_missing_tool_leaves_input_untouched() {
        let (dir, file) = scratch();
        std::fs::write(&file, "-- only copy\n").unwrap();
        let tools = MySqlTools::with_programs(missing_tool(dir.path()), missing_tool(dir.path()));
        let mut cache = passwords();

        let err = restore(&tools, &target(3306), Some(file.as_path()), &mut cache, &mut report())
            .await
            .unwrap_err();

        assert!(err.is_precondition());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "-- only copy\n");
        assert_eq!(cache.reader().prompts, 0);
    }

    /// A failed load deletes the caller's input file. This is destructive
    /// and deliberate; changing it must be a conscious decision.
    #[tokio::test]
    async fn test_failed_restore_deletes_input_file() {
        for engine in ["mysql", "psql"] {
            let (dir, file) = scratch();
            std::fs::write(&file, "-- only copy\n").unwrap();
            let load = write_tool(dir.path(), engine, "cat > /dev/null; exit 1");

            let result = if engine == "mysql" {
                let tools = MySqlTools::with_programs(missing_tool(dir.path()), load);
                restore(&tools, &target(3306), Some(file.as_path()), &mut passwords(), &mut report()).await
            } else {
                let tools = PostgresTools::with_programs(missing_tool(dir.path()), load);
                restore(&tools, &target(5432), Some(file.as_path()), &mut passwords(), &mut report()).await
            };

            assert!(matches!(result, Err(TransferError::Tool(_))), "{engine}");
            assert!(!file.exists(), "{engine} restore kept its input");
        }
    }

    #[tokio::test]
    async fn test_restore_unopenable_input() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("does-not-exist.sql");
        let load = write_tool(dir.path(), "psql", "exit 0");
        let tools = PostgresTools::with_programs(missing_tool(dir.path()), load);

        let err = restore(&tools, &target(5432), Some(file.as_path()), &mut passwords(), &mut report())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::OpenInput { .. }));
        assert!(!err.is_precondition());
    }
}

mod password_tests {
    use super::*;
    use std::net::TcpListener;

    #[tokio::test]
    async fn test_password_prompted_once_across_inventory_and_backup() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (dir, file) = scratch();
        let dump = write_tool(dir.path(), "mysqldump", "echo ok");
        let tools = MySqlTools::with_programs(dump, missing_tool(dir.path()));
        let mut cache = passwords();
        let mut out = report();

        let inventory = mysql::run_inventory(&target(port), &mut cache, &mut out).await;
        assert!(inventory.is_err());

        backup(&tools, &target(port), Some(file.as_path()), &mut cache, &mut out)
            .await
            .unwrap();

        assert_eq!(cache.reader().prompts, 1);
        assert!(file.exists());
    }
}

mod logging_tests {
    use super::*;

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_transfer_progress_stays_off_default_log_level() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(dbaudit_core::logging::level_for(0, false))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (dir, file) = scratch();
        let dump = write_tool(dir.path(), "mysqldump", "echo ok");
        let load = write_tool(dir.path(), "mysql", "cat > /dev/null");
        let tools = MySqlTools::with_programs(dump, load);
        let mut cache = passwords();
        let mut out = report();

        backup(&tools, &target(3306), Some(file.as_path()), &mut cache, &mut out)
            .await
            .unwrap();
        restore(&tools, &target(3306), Some(file.as_path()), &mut cache, &mut out)
            .await
            .unwrap();

        let printed = text(out);
        assert!(printed.contains("Starting full MySQL backup"), "{printed}");
        assert!(printed.contains("Restoring backup from"), "{printed}");

        let logged = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(logged.is_empty(), "{logged}");
    }
}
