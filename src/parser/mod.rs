//! Frontend for the calculator language: lexer, parse tree, parser and name resolution.

pub mod parser;
pub mod resolve;
pub mod state;
pub mod tree;

use thiserror::Error;

pub use parser::{Parser, parse};
pub use resolve::{MAX_VARIABLES, ResolvedProgram, resolve};
pub use state::{Span, Token, TokenKind, tokenize};
pub use tree::{Element, Grammar, ParseNode};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{span}: unexpected character '{ch}'")]
    UnexpectedChar { ch: char, span: Span },
    #[error("{span}: constant {text} does not fit in int32_t")]
    ConstantOverflow { text: String, span: Span },
    #[error("{span}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },
    #[error("program has no statements")]
    EmptyProgram,
    #[error("use undefined symbol({name})")]
    UndefinedSymbol { name: String, span: Span },
    #[error("{span}: symbol {name} is already declared")]
    DuplicateSymbol { name: String, span: Span },
    #[error("too many variables (limit {limit})")]
    TooManyVariables { limit: u32 },
}

impl ParseError {
    /// Name binding failures, as opposed to lexical or syntax errors
    pub fn is_semantic(&self) -> bool {
        matches!(
            self,
            ParseError::UndefinedSymbol { .. }
                | ParseError::DuplicateSymbol { .. }
                | ParseError::TooManyVariables { .. }
        )
    }
}

/// Parse and resolve `source` in one step
pub fn parse_and_resolve(source: &str) -> Result<ResolvedProgram, ParseError> {
    resolve(parse(source)?)
}
