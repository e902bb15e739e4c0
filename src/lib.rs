//! # intcalc
//!
//! A small compiler for an integer calculator language. Source programs are assignments
//! over 32-bit signed integers:
//!
//! ```text
//! int32_t value1 = (1 + 2) * 3;
//! int32_t value2 = 2 + (3 * value1);
//! value1 = value2 + 100;
//! ```
//!
//! The value of the last statement is the program's result.
//!
//! ## Pipeline
//!
//! - [`parser`]: lexer, recursive-descent parser and name resolution
//! - [`wasm`]: encodes the resolved tree as a WebAssembly-shaped bytecode module, and
//!   decodes such modules back into sections and the exported routine
//! - [`codegen::x86_64`]: lowers the routine's stack bytecode to x86-64 machine code with
//!   register allocation and spilling, in a size-probe pass followed by an emit pass
//! - [`runtime`]: maps the code into executable memory and calls it
//!
//! Every variable-length integer in the module uses [`leb128`]. Machine instructions are
//! produced by the `ras` crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use intcalc::runtime::{compile_source, lower_module};
//!
//! let module = compile_source("int32_t value1 = 1 + 2;\n")?;
//! assert_eq!(&module.content()[..4], b"\0asm");
//!
//! let code = lower_module(module.content())?;
//! assert_eq!(code.last(), Some(&0xc3)); // ret
//! # Ok::<(), intcalc::CompileError>(())
//! ```
//!
//! On x86-64 Unix hosts the module can also be run:
//!
//! ```rust,no_run
//! use intcalc::config::CompilerConfig;
//! use intcalc::runtime::run_source;
//!
//! let value = run_source("int32_t value1 = 4 / 2;\n", &CompilerConfig::in_memory())?;
//! assert_eq!(value, 2);
//! # Ok::<(), intcalc::CompileError>(())
//! ```

pub mod codegen;
pub mod config;
pub mod error;
pub mod leb128;
pub mod parser;
pub mod runtime;
pub mod test_cases;
pub mod wasm;

pub use config::CompilerConfig;
pub use error::{CompileError, Result};
pub use runtime::{compile_source, execute_module, run_origin, run_source};
pub use wasm::{DecodedModule, WasmModule, decode_module};
