//! Bytecode instructions and their binary encoding.
//!
//! Local accesses take a ULEB128 index and `i32.const` takes an SLEB128 value; the
//! arithmetic opcodes and `end` are a single byte.

use super::decoder::DecodeError;
use crate::leb128::{read_sleb128_i64, read_uleb128_u32, write_sleb128_i64, write_uleb128_u32};
use ras::{ByteSink, RasError};
use std::fmt;

pub const END: u8 = 0x0B;
pub const LOCAL_GET: u8 = 0x20;
pub const LOCAL_SET: u8 = 0x21;
pub const LOCAL_TEE: u8 = 0x22;
pub const I32_CONST: u8 = 0x41;
pub const I32_ADD: u8 = 0x6A;
pub const I32_SUB: u8 = 0x6B;
pub const I32_MUL: u8 = 0x6C;
pub const I32_DIV_S: u8 = 0x6D;
pub const I32_XOR: u8 = 0x73;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    GetLocal(u32),
    SetLocal(u32),
    TeeLocal(u32),
    I32Const(i32),
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32Xor,
    End,
}

impl Instruction {
    pub fn opcode(self) -> u8 {
        match self {
            Instruction::GetLocal(_) => LOCAL_GET,
            Instruction::SetLocal(_) => LOCAL_SET,
            Instruction::TeeLocal(_) => LOCAL_TEE,
            Instruction::I32Const(_) => I32_CONST,
            Instruction::I32Add => I32_ADD,
            Instruction::I32Sub => I32_SUB,
            Instruction::I32Mul => I32_MUL,
            Instruction::I32DivS => I32_DIV_S,
            Instruction::I32Xor => I32_XOR,
            Instruction::End => END,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Instruction::GetLocal(_) => "get_local",
            Instruction::SetLocal(_) => "set_local",
            Instruction::TeeLocal(_) => "tee_local",
            Instruction::I32Const(_) => "i32.const",
            Instruction::I32Add => "i32.add",
            Instruction::I32Sub => "i32.sub",
            Instruction::I32Mul => "i32.mul",
            Instruction::I32DivS => "i32.div_s",
            Instruction::I32Xor => "i32.xor",
            Instruction::End => "end",
        }
    }

    /// Operand stack values consumed
    pub fn pops(self) -> usize {
        match self {
            Instruction::GetLocal(_) | Instruction::I32Const(_) | Instruction::End => 0,
            Instruction::SetLocal(_) | Instruction::TeeLocal(_) => 1,
            Instruction::I32Add
            | Instruction::I32Sub
            | Instruction::I32Mul
            | Instruction::I32DivS
            | Instruction::I32Xor => 2,
        }
    }

    /// Write the instruction, returning its length
    pub fn encode<S: ByteSink + ?Sized>(self, sink: &mut S) -> Result<usize, RasError> {
        sink.emit_byte(self.opcode())?;
        let operand = match self {
            Instruction::GetLocal(index)
            | Instruction::SetLocal(index)
            | Instruction::TeeLocal(index) => write_uleb128_u32(sink, index)?,
            Instruction::I32Const(value) => write_sleb128_i64(sink, i64::from(value))?,
            _ => 0,
        };
        Ok(1 + operand)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::GetLocal(index)
            | Instruction::SetLocal(index)
            | Instruction::TeeLocal(index) => write!(f, "{} {}", self.mnemonic(), index),
            Instruction::I32Const(value) => write!(f, "{} {}", self.mnemonic(), value),
            _ => write!(f, "{}", self.mnemonic()),
        }
    }
}

/// Iterator over a code stream, yielding `(offset, instruction)` pairs.
///
/// Offsets are relative to `base`, so a reader over a body slice can report positions
/// within the whole module. Iteration stops after the first error.
pub struct InstructionReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
    failed: bool,
}

impl<'a> InstructionReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_base(bytes, 0)
    }

    pub fn with_base(bytes: &'a [u8], base: usize) -> Self {
        Self {
            bytes,
            pos: 0,
            base,
            failed: false,
        }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn read_index(&mut self, offset: usize) -> Result<u32, DecodeError> {
        let (index, len) =
            read_uleb128_u32(self.remaining()).map_err(|source| DecodeError::Leb128 {
                field: "local index",
                offset,
                source,
            })?;
        self.pos += len;
        Ok(index)
    }

    fn read_instruction(&mut self) -> Result<Instruction, DecodeError> {
        let offset = self.base + self.pos;
        let opcode = self.bytes[self.pos];
        self.pos += 1;

        let instruction = match opcode {
            LOCAL_GET => Instruction::GetLocal(self.read_index(offset)?),
            LOCAL_SET => Instruction::SetLocal(self.read_index(offset)?),
            LOCAL_TEE => Instruction::TeeLocal(self.read_index(offset)?),
            I32_CONST => {
                let (value, len) =
                    read_sleb128_i64(self.remaining()).map_err(|source| DecodeError::Leb128 {
                        field: "i32.const operand",
                        offset,
                        source,
                    })?;
                self.pos += len;
                let value = i32::try_from(value)
                    .map_err(|_| DecodeError::ConstantOutOfRange { value, offset })?;
                Instruction::I32Const(value)
            }
            I32_ADD => Instruction::I32Add,
            I32_SUB => Instruction::I32Sub,
            I32_MUL => Instruction::I32Mul,
            I32_DIV_S => Instruction::I32DivS,
            I32_XOR => Instruction::I32Xor,
            END => Instruction::End,
            _ => return Err(DecodeError::UnknownOpcode { opcode, offset }),
        };
        Ok(instruction)
    }
}

impl Iterator for InstructionReader<'_> {
    type Item = Result<(usize, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.bytes.len() {
            return None;
        }
        let offset = self.base + self.pos;
        match self.read_instruction() {
            Ok(instruction) => Some(Ok((offset, instruction))),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// One instruction per line, prefixed with its offset
pub fn disassemble(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut listing = String::new();
    for item in InstructionReader::new(bytes) {
        let (offset, instruction) = item?;
        listing.push_str(&format!("{:04x}: {}\n", offset, instruction));
    }
    Ok(listing)
}
