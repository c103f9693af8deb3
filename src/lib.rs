//! A single-pass compiler for a small C-like language, targeting x86-64
//! assembly in Intel syntax for the System V AMD64 ABI.
//!
//! [`compile`] is the library's one entry point: it tokenizes, parses
//! (performing scope resolution and type analysis inline), and generates
//! assembly, returning either the finished listing or a [`CompileError`]
//! the caller can report however it likes.

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod types;

use bumpalo::Bump;

pub use diagnostics::CompileError;

/// Compiles `source` to an x86-64 assembly listing.
pub fn compile(source: &str) -> Result<String, CompileError> {
    let arena = Bump::new();
    let program = parser::parse(&arena, source)?;
    Ok(codegen::generate(program))
}
