//! Per-instruction lowering of the bytecode stream.

use super::LowerError;
use super::register_info::{DIVIDEND_HIGH_REGISTER, DIVIDEND_REGISTER, RETURN_REGISTER};
use super::state::{Location, LoweringContext, MemoryKind, StackValue};
use crate::wasm::Instruction;
use ras::ByteSink;
use ras::encoder::{AluOp, Mem, Operand};

/// Lower one instruction; `end` is left to the caller
pub fn lower_instruction<S: ByteSink>(
    ctx: &mut LoweringContext<S>,
    offset: usize,
    instruction: Instruction,
) -> Result<(), LowerError> {
    match instruction {
        Instruction::I32Const(value) => {
            let pushed = ctx.push_new(instruction)?;
            ctx.enc.mov_imm32(pushed.location.operand(), value)?;
        }
        Instruction::GetLocal(index) => {
            let disp = ctx.layout.local_disp(index)?;
            let pushed = ctx.push_new(instruction)?;
            let local = Location::Memory {
                kind: MemoryKind::Local,
                offset: disp,
            };
            ctx.emit_alu(AluOp::Mov, pushed.location, local)?;
        }
        Instruction::SetLocal(index) | Instruction::TeeLocal(index) => {
            let disp = ctx.layout.local_disp(index)?;
            let value = ctx.pop(offset, instruction)?;
            let local = Location::Memory {
                kind: MemoryKind::Local,
                offset: disp,
            };
            ctx.emit_alu(AluOp::Mov, local, value.location)?;
            if matches!(instruction, Instruction::TeeLocal(_)) {
                ctx.push(value, instruction);
            } else {
                ctx.release(&value);
            }
        }
        Instruction::I32Add | Instruction::I32Sub | Instruction::I32Mul | Instruction::I32Xor => {
            let op = match instruction {
                Instruction::I32Add => AluOp::Add,
                Instruction::I32Sub => AluOp::Sub,
                Instruction::I32Mul => AluOp::Imul,
                _ => AluOp::Xor,
            };
            let rhs = ctx.pop(offset, instruction)?;
            let lhs = ctx.pop(offset, instruction)?;
            ctx.emit_alu(op, lhs.location, rhs.location)?;
            ctx.release(&rhs);
            ctx.push(lhs, instruction);
        }
        Instruction::I32DivS => {
            let divisor = ctx.pop(offset, instruction)?;
            let dividend = ctx.pop(offset, instruction)?;
            lower_division(ctx, dividend, divisor)?;
            ctx.release(&divisor);
            ctx.push(dividend, instruction);
        }
        Instruction::End => {}
    }

    debug_assert!(
        ctx.registers_consistent(),
        "register shared by pending values after {} at offset {}",
        instruction,
        offset
    );
    Ok(())
}

/// `dividend = dividend / divisor` through eax/edx.
///
/// Registers other than the dividend's own that `idiv` touches are pushed around it
/// when they hold live values; a divisor sitting in one of them is read back from its
/// pushed copy. The high half is cleared with `xor edx, edx`, so a negative dividend
/// is divided as the unsigned 64-bit value `0:eax`.
fn lower_division<S: ByteSink>(
    ctx: &mut LoweringContext<S>,
    dividend: StackValue,
    divisor: StackValue,
) -> Result<(), LowerError> {
    let l1 = dividend.location;
    let l2 = divisor.location;
    let save_rax = !l1.is_reg(DIVIDEND_REGISTER) && ctx.registers.owner(DIVIDEND_REGISTER).is_some();
    let save_rdx = !l1.is_reg(DIVIDEND_HIGH_REGISTER)
        && ctx.registers.owner(DIVIDEND_HIGH_REGISTER).is_some();

    if save_rax {
        ctx.enc.push64(DIVIDEND_REGISTER)?;
    }
    if save_rdx {
        ctx.enc.push64(DIVIDEND_HIGH_REGISTER)?;
    }

    let divisor_operand = if l2.is_reg(DIVIDEND_REGISTER) {
        Operand::Mem(Mem::rsp(if save_rdx { 8 } else { 0 }))
    } else if l2.is_reg(DIVIDEND_HIGH_REGISTER) {
        Operand::Mem(Mem::rsp(0))
    } else {
        l2.operand()
    };

    if !l1.is_reg(DIVIDEND_REGISTER) {
        ctx.enc
            .alu(AluOp::Mov, Operand::Reg(DIVIDEND_REGISTER), l1.operand())?;
    }
    ctx.enc.alu_reg_reg(
        AluOp::Xor,
        DIVIDEND_HIGH_REGISTER,
        DIVIDEND_HIGH_REGISTER,
    )?;
    ctx.enc.idiv(divisor_operand)?;
    if !l1.is_reg(DIVIDEND_REGISTER) {
        ctx.enc
            .alu(AluOp::Mov, l1.operand(), Operand::Reg(DIVIDEND_REGISTER))?;
    }

    if save_rdx {
        ctx.enc.pop64(DIVIDEND_HIGH_REGISTER)?;
    }
    if save_rax {
        ctx.enc.pop64(DIVIDEND_REGISTER)?;
    }
    Ok(())
}

/// Move the routine's result into the return register
pub fn lower_result<S: ByteSink>(
    ctx: &mut LoweringContext<S>,
    result: StackValue,
) -> Result<(), LowerError> {
    if !result.location.is_reg(RETURN_REGISTER) {
        ctx.enc
            .alu(AluOp::Mov, Operand::Reg(RETURN_REGISTER), result.location.operand())?;
    }
    ctx.release(&result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::x86_64::register_allocator::{PhysReg, ValueId};
    use ras::encoder::Reg;

    fn lower_all(var_count: u32, code: &[Instruction]) -> LoweringContext<Vec<u8>> {
        let mut ctx = LoweringContext::new(Vec::new(), var_count).unwrap();
        for (i, &instruction) in code.iter().enumerate() {
            lower_instruction(&mut ctx, i, instruction).unwrap();
        }
        ctx
    }

    #[test]
    fn test_add_reuses_left_register() {
        let ctx = lower_all(
            0,
            &[
                Instruction::I32Const(1),
                Instruction::I32Const(2),
                Instruction::I32Add,
            ],
        );
        assert_eq!(ctx.stack().len(), 1);
        assert!(ctx.stack()[0].location.is_reg(Reg::Rax));
        assert!(ctx.registers.is_free(Reg::Rcx));
        assert_eq!(
            ctx.into_sink(),
            vec![
                0xb8, 1, 0, 0, 0, // mov eax, 1
                0xb9, 2, 0, 0, 0, // mov ecx, 2
                0x03, 0xc1, // add eax, ecx
            ]
        );
    }

    #[test]
    fn test_locals_load_and_store() {
        let ctx = lower_all(
            2,
            &[
                Instruction::I32Const(5),
                Instruction::SetLocal(1),
                Instruction::GetLocal(1),
                Instruction::TeeLocal(0),
            ],
        );
        assert_eq!(ctx.stack().len(), 1);
        assert_eq!(ctx.stack()[0].producer, Instruction::TeeLocal(0));
        assert_eq!(
            ctx.into_sink(),
            vec![
                0xb8, 5, 0, 0, 0, // mov eax, 5
                0x89, 0x44, 0x25, 0x04, // mov [rbp+4], eax
                0x8b, 0x44, 0x25, 0x04, // mov eax, [rbp+4]
                0x89, 0x44, 0x25, 0x00, // mov [rbp+0], eax
            ]
        );
    }

    #[test]
    fn test_division_with_dividend_in_eax() {
        // 8 / 2: dividend in eax, divisor in ecx, edx free
        let ctx = lower_all(
            0,
            &[
                Instruction::I32Const(8),
                Instruction::I32Const(2),
                Instruction::I32DivS,
            ],
        );
        let bytes = ctx.into_sink();
        assert_eq!(
            &bytes[10..],
            &[
                0x33, 0xd2, // xor edx, edx
                0xf7, 0xf9, // idiv ecx
            ]
        );
    }

    #[test]
    fn test_division_saves_live_eax_and_edx() {
        // a, b, c pending in eax, ecx, edx; b / c leaves a untouched
        let ctx = lower_all(
            0,
            &[
                Instruction::I32Const(100),
                Instruction::I32Const(8),
                Instruction::I32Const(2),
                Instruction::I32DivS,
            ],
        );
        assert_eq!(ctx.stack().len(), 2);
        assert!(ctx.stack()[1].location.is_reg(Reg::Rcx));
        let bytes = ctx.into_sink();
        assert_eq!(
            &bytes[15..],
            &[
                0x50, // push rax
                0x52, // push rdx
                0x8b, 0xc1, // mov eax, ecx
                0x33, 0xd2, // xor edx, edx
                0xf7, 0x7c, 0x24, 0x00, // idiv dword ptr [rsp+0]
                0x8b, 0xc8, // mov ecx, eax
                0x5a, // pop rdx
                0x58, // pop rax
            ]
        );
    }

    #[test]
    fn test_stack_underflow() {
        let mut ctx = LoweringContext::new(Vec::new(), 0).unwrap();
        lower_instruction(&mut ctx, 0, Instruction::I32Const(1)).unwrap();
        let err = lower_instruction(&mut ctx, 5, Instruction::I32Add).unwrap_err();
        assert!(matches!(err, LowerError::StackUnderflow { offset: 5, .. }));
    }

    #[test]
    fn test_local_index_checked() {
        let mut ctx = LoweringContext::new(Vec::new(), 1).unwrap();
        assert!(matches!(
            lower_instruction(&mut ctx, 0, Instruction::GetLocal(1)),
            Err(LowerError::LocalOutOfRange { index: 1, .. })
        ));
    }

    #[test]
    fn test_result_moves_into_eax() {
        let mut ctx = LoweringContext::new(Vec::new(), 0).unwrap();
        let result = StackValue {
            id: ValueId(0),
            producer: Instruction::I32Const(0),
            location: Location::Register(PhysReg::from_reg(Reg::R9)),
        };
        lower_result(&mut ctx, result).unwrap();
        // mov eax, r9d
        assert_eq!(ctx.into_sink(), vec![0x41, 0x8b, 0xc1]);
    }
}
