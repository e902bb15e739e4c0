//! Lowering context: the virtual operand stack and everything that tracks where its
//! values live.

use super::LowerError;
use super::register_allocator::{CalleeSavedSet, PhysReg, RegisterFile, ValueId};
use super::stack_layout::FrameLayout;
use crate::wasm::Instruction;
use ras::ByteSink;
use ras::encoder::{AluOp, Mem, Operand, Reg, X86_64Encoder};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Local,
    Temporary,
}

/// Where a value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Register(PhysReg),
    /// `dword ptr [rbp + offset]`
    Memory { kind: MemoryKind, offset: i32 },
}

impl Location {
    pub fn reg(self) -> Option<Reg> {
        match self {
            Location::Register(phys) => Some(phys.reg()),
            Location::Memory { .. } => None,
        }
    }

    pub fn is_reg(self, reg: Reg) -> bool {
        self.reg() == Some(reg)
    }

    pub fn operand(self) -> Operand {
        match self {
            Location::Register(phys) => Operand::Reg(phys.reg()),
            Location::Memory { offset, .. } => Operand::Mem(Mem::rbp(offset)),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Register(phys) => write!(f, "{}", phys),
            Location::Memory { kind, offset } => {
                let kind = match kind {
                    MemoryKind::Local => "local",
                    MemoryKind::Temporary => "temp",
                };
                write!(f, "{}[rbp+{}]", kind, offset)
            }
        }
    }
}

/// One pending value on the virtual operand stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackValue {
    pub id: ValueId,
    /// Last instruction that produced or forwarded the value
    pub producer: Instruction,
    pub location: Location,
}

/// State threaded through one lowering walk
pub struct LoweringContext<S: ByteSink> {
    pub(crate) enc: X86_64Encoder<S>,
    pub(crate) registers: RegisterFile,
    pub(crate) callee_saved: CalleeSavedSet,
    pub(crate) layout: FrameLayout,
    stack: Vec<StackValue>,
    next_id: u32,
    spills: usize,
}

impl<S: ByteSink> LoweringContext<S> {
    pub fn new(sink: S, var_count: u32) -> Result<Self, LowerError> {
        Ok(Self {
            enc: X86_64Encoder::new(sink),
            registers: RegisterFile::new(),
            callee_saved: CalleeSavedSet::new(),
            layout: FrameLayout::new(var_count)?,
            stack: Vec::new(),
            next_id: 0,
            spills: 0,
        })
    }

    pub fn stack(&self) -> &[StackValue] {
        &self.stack
    }

    pub fn spill_count(&self) -> usize {
        self.spills
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn callee_saved(&self) -> &CalleeSavedSet {
        &self.callee_saved
    }

    pub fn into_sink(self) -> S {
        self.enc.into_inner()
    }

    fn fresh_id(&mut self) -> ValueId {
        let id = ValueId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn pop(&mut self, offset: usize, instruction: Instruction) -> Result<StackValue, LowerError> {
        self.stack.pop().ok_or(LowerError::StackUnderflow {
            offset,
            instruction: instruction.to_string(),
        })
    }

    /// Put an already-placed value back on the stack under a new producer
    pub fn push(&mut self, value: StackValue, producer: Instruction) {
        self.stack.push(StackValue { producer, ..value });
    }

    /// Place and push a new value produced by `producer`
    pub fn push_new(&mut self, producer: Instruction) -> Result<StackValue, LowerError> {
        let id = self.fresh_id();
        let location = self.allocate(id)?;
        let value = StackValue {
            id,
            producer,
            location,
        };
        self.stack.push(value);
        Ok(value)
    }

    fn claim(&mut self, phys: PhysReg, owner: ValueId) {
        self.registers.claim(phys, owner);
        self.callee_saved.mark(phys.reg());
    }

    /// Location for a new value: a free bank A register, a free bank B register, a
    /// register taken from a pending value that is spilled, or a temporary slot.
    fn allocate(&mut self, id: ValueId) -> Result<Location, LowerError> {
        if let Some(phys) = self.registers.find_free() {
            self.claim(phys, id);
            return Ok(Location::Register(phys));
        }
        if let Some(phys) = self.spill()? {
            self.claim(phys, id);
            return Ok(Location::Register(phys));
        }
        let offset = self.layout.alloc_temp()?;
        tracing::debug!(value = %id, offset, "no register to steal, value lives in memory");
        Ok(Location::Memory {
            kind: MemoryKind::Temporary,
            offset,
        })
    }

    /// Pending value to evict: oldest first, bank A registers preferred
    fn spill_candidate(&self) -> Option<usize> {
        let in_bank = |bank_b: bool| {
            self.stack.iter().position(|value| {
                value
                    .location
                    .reg()
                    .is_some_and(|reg| reg.is_extended() == bank_b)
            })
        };
        in_bank(false).or_else(|| in_bank(true))
    }

    /// Move one pending register value to a temporary slot and free its register
    fn spill(&mut self) -> Result<Option<PhysReg>, LowerError> {
        let Some(pos) = self.spill_candidate() else {
            return Ok(None);
        };
        let Location::Register(phys) = self.stack[pos].location else {
            return Ok(None);
        };
        let offset = self.layout.alloc_temp()?;
        self.enc
            .alu_mem_reg(AluOp::Mov, Mem::rbp(offset), phys.reg())?;
        self.registers.release(phys);
        self.stack[pos].location = Location::Memory {
            kind: MemoryKind::Temporary,
            offset,
        };
        self.spills += 1;
        tracing::debug!(
            value = %self.stack[pos].id,
            register = %phys,
            offset,
            "spilled pending value"
        );
        Ok(Some(phys))
    }

    /// Give back the register held by a consumed value
    pub fn release(&mut self, value: &StackValue) {
        if let Location::Register(phys) = value.location {
            if self.registers.owner(phys.reg()) == Some(value.id) {
                self.registers.release(phys);
            }
        }
    }

    /// No two pending values share a register, and the register file agrees with the stack
    pub fn registers_consistent(&self) -> bool {
        let mut seen: Vec<Reg> = Vec::new();
        for value in &self.stack {
            if let Some(reg) = value.location.reg() {
                if seen.contains(&reg) || self.registers.owner(reg) != Some(value.id) {
                    return false;
                }
                seen.push(reg);
            }
        }
        true
    }

    /// `op dst, src`, going through a saved scratch register when no direct form exists
    pub fn emit_alu(&mut self, op: AluOp, dst: Location, src: Location) -> Result<(), LowerError> {
        match (dst, src) {
            (Location::Memory { offset, .. }, Location::Register(phys)) if op == AluOp::Imul => {
                let scratch = if phys.reg() == Reg::Rax {
                    Reg::Rcx
                } else {
                    Reg::Rax
                };
                let mem = Mem::rbp(offset);
                self.enc.push64(scratch)?;
                self.enc.alu_reg_mem(AluOp::Mov, scratch, mem)?;
                self.enc.alu_reg_reg(AluOp::Imul, scratch, phys.reg())?;
                self.enc.alu_mem_reg(AluOp::Mov, mem, scratch)?;
                self.enc.pop64(scratch)?;
            }
            (Location::Memory { offset: dst_off, .. }, Location::Memory { offset: src_off, .. }) => {
                let scratch = Reg::Rax;
                let dst_mem = Mem::rbp(dst_off);
                self.enc.push64(scratch)?;
                if op != AluOp::Mov {
                    self.enc.alu_reg_mem(AluOp::Mov, scratch, dst_mem)?;
                }
                self.enc.alu_reg_mem(op, scratch, Mem::rbp(src_off))?;
                self.enc.alu_mem_reg(AluOp::Mov, dst_mem, scratch)?;
                self.enc.pop64(scratch)?;
            }
            _ => {
                self.enc.alu(op, dst.operand(), src.operand())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ras::CountingSink;

    fn context(var_count: u32) -> LoweringContext<Vec<u8>> {
        LoweringContext::new(Vec::new(), var_count).unwrap()
    }

    #[test]
    fn test_fourteen_values_fit_in_registers() {
        let mut ctx = context(0);
        for i in 0..14 {
            let value = ctx.push_new(Instruction::I32Const(i)).unwrap();
            assert!(matches!(value.location, Location::Register(_)));
        }
        assert_eq!(ctx.spill_count(), 0);
        assert!(ctx.registers_consistent());
        // rbx, rsi, rdi, r12..r15
        assert_eq!(ctx.callee_saved().len(), 7);
        assert!(ctx.into_sink().is_empty());
    }

    #[test]
    fn test_fifteenth_value_spills_oldest_bank_a_value() {
        let mut ctx = context(0);
        for i in 0..15 {
            ctx.push_new(Instruction::I32Const(i)).unwrap();
        }
        assert_eq!(ctx.spill_count(), 1);
        assert_eq!(
            ctx.stack()[0].location,
            Location::Memory {
                kind: MemoryKind::Temporary,
                offset: 0
            }
        );
        assert!(ctx.stack()[14].location.is_reg(Reg::Rax));
        assert!(ctx.registers_consistent());
        // mov dword ptr [rbp+0], eax
        assert_eq!(ctx.into_sink(), vec![0x89, 0x44, 0x25, 0x00]);
    }

    #[test]
    fn test_value_goes_to_memory_when_nothing_can_be_spilled() {
        let mut ctx = LoweringContext::new(CountingSink::new(), 1).unwrap();
        // every register held by something that is not on the operand stack
        let mut owner = 1000;
        while let Some(phys) = ctx.registers.find_free() {
            ctx.registers.claim(phys, ValueId(owner));
            owner += 1;
        }
        let value = ctx.push_new(Instruction::GetLocal(0)).unwrap();
        assert_eq!(
            value.location,
            Location::Memory {
                kind: MemoryKind::Temporary,
                offset: 16
            }
        );
        assert_eq!(ctx.spill_count(), 0);
        assert_eq!(ctx.into_sink().count(), 0);
    }

    #[test]
    fn test_release_only_frees_own_register() {
        let mut ctx = context(0);
        let a = ctx.push_new(Instruction::I32Const(1)).unwrap();
        let stale = StackValue {
            id: ValueId(99),
            ..a
        };
        ctx.release(&stale);
        assert_eq!(ctx.registers.owner(Reg::Rax), Some(a.id));
        ctx.release(&a);
        assert!(ctx.registers.is_free(Reg::Rax));
    }

    #[test]
    fn test_memory_to_memory_uses_scratch() {
        let mut ctx = context(2);
        let dst = Location::Memory {
            kind: MemoryKind::Local,
            offset: 0,
        };
        let src = Location::Memory {
            kind: MemoryKind::Temporary,
            offset: 16,
        };
        ctx.emit_alu(AluOp::Add, dst, src).unwrap();
        assert_eq!(
            ctx.into_sink(),
            vec![
                0x50, // push rax
                0x8b, 0x44, 0x25, 0x00, // mov eax, [rbp+0]
                0x03, 0x44, 0x25, 0x10, // add eax, [rbp+16]
                0x89, 0x44, 0x25, 0x00, // mov [rbp+0], eax
                0x58, // pop rax
            ]
        );
    }

    #[test]
    fn test_imul_into_memory_avoids_source_register() {
        let mut ctx = context(1);
        let dst = Location::Memory {
            kind: MemoryKind::Local,
            offset: 0,
        };
        let src = Location::Register(PhysReg::from_reg(Reg::Rax));
        ctx.emit_alu(AluOp::Imul, dst, src).unwrap();
        assert_eq!(
            ctx.into_sink(),
            vec![
                0x51, // push rcx
                0x8b, 0x4c, 0x25, 0x00, // mov ecx, [rbp+0]
                0x0f, 0xaf, 0xc8, // imul ecx, eax
                0x89, 0x4c, 0x25, 0x00, // mov [rbp+0], ecx
                0x59, // pop rcx
            ]
        );
    }
}
