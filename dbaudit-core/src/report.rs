//! Console report writer.
//!
//! Every user-facing line (section banners, aligned rows, operation status)
//! goes through [`Report`] so the binary prints to stdout while tests capture
//! the exact text in a `Vec<u8>`.

use std::fmt::Display;
use std::io::{self, Stdout, Write};

/// Rule printed above and below every section title.
pub const RULE: &str = "-----------------------------------------------------";

/// Line-oriented writer for audit output.
#[derive(Debug)]
pub struct Report<W: Write> {
    out: W,
}

impl Report<Stdout> {
    /// Report printed to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Report<W> {
    /// Wraps any writer.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Prints a section banner: two blank lines, rule, title, rule.
    ///
    /// # Errors
    /// Returns the underlying write error.
    pub fn header(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out)?;
        writeln!(self.out, "{RULE}")?;
        writeln!(self.out, "{title}")?;
        writeln!(self.out, "{RULE}")
    }

    /// Prints one line.
    ///
    /// # Errors
    /// Returns the underlying write error.
    pub fn line(&mut self, text: impl Display) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    /// Prints an empty line.
    ///
    /// # Errors
    /// Returns the underlying write error.
    pub fn blank(&mut self) -> io::Result<()> {
        writeln!(self.out)
    }

    /// Consumes the report and returns the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Renders a boolean flag as `YES`/`NO`.
pub const fn yes_no(flag: bool) -> &'static str {
    if flag { "YES" } else { "NO" }
}
