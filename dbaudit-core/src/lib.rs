//! Core engine for `dbaudit`.
//!
//! This crate holds everything the CLI needs to audit a MySQL/MariaDB or
//! PostgreSQL instance during a time-boxed defense exercise:
//! - Inventory: read-only enumeration of accounts, grants, content, and
//!   security-relevant configuration, printed as report sections
//! - Backup: full-instance dump through the vendor dump tool
//! - Restore: replay of a dump file through the vendor load tool
//!
//! # Security Guarantees
//! - Inventory queries never mutate server state
//! - The password is prompted at most once per process and held in
//!   zeroizing memory; it is never written to disk or logs
//! - Native tools receive the password the way each vendor expects it
//!
//! # Architecture
//! - `security`: password prompt/cache and connection parameters
//! - `process`: executable lookup and child process plumbing
//! - `adapters`: per-engine connection factories and inventory reporters
//! - `transfer`: backup and restore orchestration over native tools
//! - `report`: console writer for section headers and aligned rows

pub mod adapters;
pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod report;
pub mod security;
pub mod transfer;

pub use config::{Engine, ServerTarget};
pub use error::{AuditError, Result};
pub use logging::init_logging;
pub use report::Report;
pub use security::{ConnectionParams, PasswordCache, PasswordReader, TerminalPrompt};
