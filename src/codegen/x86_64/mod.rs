//! x86-64 lowering of the bytecode routine.
//!
//! The operand stack of the bytecode is simulated at compile time: every pending value
//! is kept in a register when one is available, spilled to an `rbp`-relative temporary
//! when none is, and the result ends up in `eax`. Lowering runs twice over the same body,
//! once to size the routine and fix its frame, once to write it.

pub mod functions;
pub mod instructions;
pub mod register_allocator;
pub mod register_info;
pub mod stack_layout;
pub mod state;

pub use functions::{FramePlan, compile_routine, emit, probe};
pub use register_allocator::{CalleeSavedSet, PhysReg, RegisterFile, ValueId};
pub use stack_layout::FrameLayout;
pub use state::{Location, LoweringContext, MemoryKind, StackValue};

use crate::wasm::DecodeError;
use ras::RasError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LowerError {
    #[error("operand stack underflow at offset {offset:#x} ({instruction})")]
    StackUnderflow { offset: usize, instruction: String },
    #[error("{count} value(s) left on the operand stack at end")]
    LeftoverValues { count: usize },
    #[error("{count} byte(s) after end of the routine body")]
    TrailingBytes { count: usize },
    #[error("routine body has no end instruction")]
    MissingEnd,
    #[error("local {index} out of range ({var_count} locals declared)")]
    LocalOutOfRange { index: u32, var_count: u32 },
    #[error("frame region {region} exceeds {limit} bytes")]
    FrameExhausted { region: &'static str, limit: u32 },
    #[error("size probe measured {probe} bytes but emission wrote {emit}")]
    SizeMismatch { probe: usize, emit: usize },
    #[error("emission diverged from the size probe: {0}")]
    PlanMismatch(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] RasError),
}

impl LowerError {
    /// Errors that mean the lowering itself is broken, whatever the input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            LowerError::SizeMismatch { .. }
                | LowerError::PlanMismatch(_)
                | LowerError::Encode(RasError::EncodingError(_))
        )
    }
}
