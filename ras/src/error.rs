//! Error types for ras

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RasError {
    /// Operand shape the encoder cannot express
    #[error("Encoding error: {0}")]
    EncodingError(String),
    /// A fixed-capacity sink ran out of room
    #[error("Buffer overflow: capacity {capacity} bytes, needed {needed}")]
    BufferOverflow { capacity: usize, needed: usize },
    /// Memory mapping / protection failure
    #[error("I/O error: {0}")]
    IoError(String),
    /// Unsupported target architecture or host
    #[error("Unsupported target: {0}")]
    UnsupportedTarget(String),
}
