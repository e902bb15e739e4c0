//! ras - Raw Assembler
//!
//! Low-level machine-code plumbing shared by the intcalc compiler:
//!
//! - [`encoder::ByteSink`] and its counting / vector / slice implementations
//! - [`encoder::X86_64Encoder`], byte emitters for the x86-64 forms the JIT uses
//! - [`ExecutableMemory`], a write-then-protect code region for running the result
//!
//! # Example
//!
//! ```rust
//! use ras::encoder::{CountingSink, Operand, Reg, X86_64Encoder};
//!
//! let mut probe = X86_64Encoder::new(CountingSink::new());
//! probe.mov_imm32(Operand::Reg(Reg::Rax), 42)?;
//! probe.ret()?;
//!
//! let mut emit = X86_64Encoder::new(Vec::with_capacity(probe.current_position()));
//! emit.mov_imm32(Operand::Reg(Reg::Rax), 42)?;
//! emit.ret()?;
//! assert_eq!(emit.into_inner(), vec![0xb8, 42, 0, 0, 0, 0xc3]);
//! # Ok::<(), ras::RasError>(())
//! ```

pub mod encoder;
pub mod error;
pub mod runtime;

pub use encoder::{ByteSink, CountingSink, SliceSink};
pub use error::RasError;
pub use runtime::ExecutableMemory;
