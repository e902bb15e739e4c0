//! Binary instruction encoders
//!
//! Encoders write through the [`ByteSink`] abstraction so the same code path serves
//! size probing, in-memory buffers and in-place emission into a JIT region.

pub mod traits;
pub mod x86_64;

pub use traits::{ByteSink, CountingSink, SliceSink};
pub use x86_64::{AluOp, Base, ImmOp, ImmWidth, Mem, Operand, Reg, X86_64Encoder};
