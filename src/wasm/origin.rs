//! Hand-authored module used to check the decoder and lowering without the frontend.
//!
//! Equivalent to:
//!
//! ```text
//! value1 = (1 + 2) * 3;
//! value2 = 2 + (3 * value1);
//! value1 = value2 + 100;
//! ```

use super::module::{WasmModule, build_module, two_pass};
use super::opcode::Instruction;
use crate::error::Result;

pub const ORIGIN_VAR_COUNT: u32 = 2;

/// Value `calc` returns when the origin module runs
pub const ORIGIN_RESULT: i32 = 129;

pub const ORIGIN_CODE: [Instruction; 17] = [
    Instruction::I32Const(1),
    Instruction::I32Const(2),
    Instruction::I32Add,
    Instruction::I32Const(3),
    Instruction::I32Mul,
    Instruction::SetLocal(0),
    Instruction::I32Const(2),
    Instruction::I32Const(3),
    Instruction::GetLocal(0),
    Instruction::I32Mul,
    Instruction::I32Add,
    Instruction::SetLocal(1),
    Instruction::GetLocal(1),
    Instruction::I32Const(100),
    Instruction::I32Add,
    Instruction::TeeLocal(0),
    Instruction::End,
];

pub fn origin_module() -> Result<WasmModule> {
    let code = two_pass("origin code", |sink| {
        for instruction in ORIGIN_CODE {
            instruction.encode(&mut *sink)?;
        }
        Ok(())
    })?;
    tracing::debug!(code_bytes = code.len(), "built origin module");
    build_module(ORIGIN_VAR_COUNT, &code)
}
