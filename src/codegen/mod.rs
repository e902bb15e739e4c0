//! Native code generation.

pub mod x86_64;

pub use x86_64::{LowerError, compile_routine};
