//! Credential handling.
//!
//! - `credentials`: connection parameters whose password lives in zeroizing
//!   memory and never appears in `Debug` or `Display` output
//! - `prompt`: the once-per-process password prompt and its cache
//!
//! # Security Guarantees
//! - The password is read from the terminal with echo disabled
//! - It is prompted at most once per process and cleared on drop
//! - It is never written to disk or to logs

mod credentials;
mod prompt;

pub use credentials::ConnectionParams;
pub use prompt::{PASSWORD_PROMPT, PasswordCache, PasswordReader, TerminalPrompt};
