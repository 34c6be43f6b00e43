//! Once-per-process password prompt.
//!
//! The first operation that needs a credential triggers the prompt; every
//! later operation in the same run reuses the cached value. The cache is an
//! explicit value owned by `main` and passed by `&mut`, not a global.

use crate::error::CredentialError;
use std::io::{self, Write};
use zeroize::Zeroizing;

/// Text shown before reading the password.
pub const PASSWORD_PROMPT: &str = "Enter Database Password: ";

/// Source of a secret line of input.
///
/// The terminal implementation disables echo; tests substitute a scripted
/// reader.
pub trait PasswordReader {
    /// Shows `prompt` and reads one line without echoing it.
    ///
    /// # Errors
    /// Returns an I/O error if the terminal cannot be put in no-echo mode or
    /// the read is interrupted.
    fn read_password(&mut self, prompt: &str) -> io::Result<String>;
}

/// Reads from the controlling terminal with echo disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl PasswordReader for TerminalPrompt {
    fn read_password(&mut self, prompt: &str) -> io::Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;
        let password = rpassword::read_password()?;
        // The hidden input leaves the cursor on the prompt line.
        writeln!(stdout)?;
        Ok(password)
    }
}

/// Lazily-initialized holder for the process credential.
///
/// # Example
/// ```rust
/// use dbaudit_core::security::{PasswordCache, PasswordReader};
///
/// struct Fixed;
/// impl PasswordReader for Fixed {
///     fn read_password(&mut self, _prompt: &str) -> std::io::Result<String> {
///         Ok("hunter2\n".to_string())
///     }
/// }
///
/// let mut cache = PasswordCache::new(Fixed);
/// assert_eq!(cache.get()?, "hunter2");
/// assert!(cache.is_cached());
/// # Ok::<(), dbaudit_core::error::CredentialError>(())
/// ```
pub struct PasswordCache<R = TerminalPrompt> {
    reader: R,
    cached: Option<Zeroizing<String>>,
}

impl PasswordCache<TerminalPrompt> {
    /// Cache backed by the interactive terminal prompt.
    pub fn terminal() -> Self {
        Self::new(TerminalPrompt)
    }
}

impl<R: PasswordReader> PasswordCache<R> {
    /// Creates an empty cache over `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            cached: None,
        }
    }

    /// Returns the password, prompting only on the first call.
    ///
    /// # Errors
    /// Returns [`CredentialError::Io`] if the prompt fails. A failed prompt
    /// caches nothing, so a later call prompts again.
    pub fn get(&mut self) -> Result<&str, CredentialError> {
        if self.cached.is_none() {
            let mut raw = Zeroizing::new(self.reader.read_password(PASSWORD_PROMPT)?);
            let trimmed_len = raw.trim_end_matches(['\r', '\n']).len();
            raw.truncate(trimmed_len);
            tracing::debug!("Password read from prompt and cached for this run");
            self.cached = Some(raw);
        }

        Ok(self.cached.as_deref().map_or("", String::as_str))
    }

    /// Whether the prompt has already been answered.
    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    /// Borrows the underlying reader.
    pub fn reader(&self) -> &R {
        &self.reader
    }
}

impl<R> std::fmt::Debug for PasswordCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCache")
            .field("cached", &self.cached.is_some())
            .finish_non_exhaustive()
    }
}
