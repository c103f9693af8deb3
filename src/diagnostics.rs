//! A single error type shared by the lexer, parser and semantic checks.
//!
//! Every fallible stage returns [`Result<T>`] rather than calling
//! `std::process::exit` directly, so the pipeline can be driven from tests
//! without tearing down the process. Only [`main`](../../src/main.rs) ever
//! converts a [`CompileError`] into a printed diagnostic and a nonzero exit.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// Byte offset into the source, used to place the caret.
    pub offset: usize,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Build a [`CompileError`] pointing at `at`, a slice borrowed from `source`.
pub fn err(source: &str, at: &str, message: impl Into<String>) -> CompileError {
    let offset = at.as_ptr() as usize - source.as_ptr() as usize;
    CompileError {
        offset,
        message: message.into(),
    }
}

impl CompileError {
    /// Print the source line with a caret under the offending column and
    /// terminate the process with exit status 1, per the CLI contract.
    pub fn report(&self, source: &str) -> ! {
        eprintln!("{source}");
        eprintln!("{}^ {}", " ".repeat(self.offset), self.message);
        std::process::exit(1);
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {})", self.message, self.offset)
    }
}

impl std::error::Error for CompileError {}
