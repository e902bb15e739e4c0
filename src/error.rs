//! Error types for the intcalc compiler.
//!
//! Each stage has its own error enum next to its code; [`CompileError`] gathers them for
//! the pipeline entry points and the command-line driver.

use crate::codegen::x86_64::LowerError;
use crate::parser::ParseError;
use crate::wasm::decoder::DecodeError;
use ras::RasError;
use thiserror::Error;

/// Main error type for the compiler pipeline.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Lexing, parsing or name resolution failed.
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// The module bytes are malformed or lack a required part.
    #[error("Decode Error: {0}")]
    Decode(#[from] DecodeError),
    /// Bytecode could not be lowered to native code.
    #[error("Lowering Error: {0}")]
    Lower(#[from] LowerError),
    /// Encoding, sink or JIT memory failure.
    #[error("Assembler Error: {0}")]
    Ras(#[from] RasError),
    /// Reading sources or writing artifacts.
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// Contract violation between pipeline stages; indicates a compiler bug.
    #[error("Internal Error: {0}")]
    Internal(String),
}

impl CompileError {
    /// True for errors caused by the compiler itself rather than its input.
    pub fn is_internal(&self) -> bool {
        match self {
            CompileError::Internal(_) => true,
            CompileError::Lower(err) => err.is_internal(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
