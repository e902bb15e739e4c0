//! Routine-level lowering: prologue, epilogue and the two-pass driver.
//!
//! The prologue's size depends on which callee-saved registers the body claims, which is
//! only known after the body has been walked. [`probe`] therefore walks the body once into
//! a [`CountingSink`] and returns a [`FramePlan`]. [`emit`] writes the prologue from that
//! plan, walks the body again into the real sink and checks that the walk reproduced the
//! same plan and the same number of bytes.

use super::LowerError;
use super::instructions::{lower_instruction, lower_result};
use super::register_allocator::CalleeSavedSet;
use super::register_info::{FRAME_POINTER, STACK_POINTER};
use super::stack_layout::{FrameLayout, OUTGOING_RESERVATION};
use super::state::LoweringContext;
use crate::wasm::{CodeBody, Instruction};
use ras::encoder::{ImmOp, ImmWidth, Mem, X86_64Encoder};
use ras::{ByteSink, CountingSink};

/// Frame facts gathered by the probe pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    pub layout: FrameLayout,
    pub callee_saved: CalleeSavedSet,
    pub spills: usize,
    /// Bytes of the whole routine, prologue included
    pub total_size: usize,
}

impl FramePlan {
    pub fn stack_adjust(&self) -> u32 {
        self.layout.stack_adjust(self.callee_saved.len())
    }
}

/// `push rbp; push <saved>...; sub rsp, imm32; lea rbp, [rsp+32]`
pub fn emit_prologue<S: ByteSink>(
    enc: &mut X86_64Encoder<S>,
    callee_saved: &CalleeSavedSet,
    stack_adjust: u32,
) -> Result<usize, LowerError> {
    let mut len = enc.push64(FRAME_POINTER)?;
    for reg in callee_saved.iter() {
        len += enc.push64(reg)?;
    }
    len += enc.add_sub_imm64(
        ImmOp::Sub,
        STACK_POINTER,
        stack_adjust as i32,
        ImmWidth::Imm32,
    )?;
    len += enc.lea64(FRAME_POINTER, Mem::rsp(OUTGOING_RESERVATION as i32))?;
    Ok(len)
}

/// `add rsp, imm32; pop <saved>... (reversed); pop rbp; ret`
pub fn emit_epilogue<S: ByteSink>(
    enc: &mut X86_64Encoder<S>,
    callee_saved: &CalleeSavedSet,
    stack_adjust: u32,
) -> Result<usize, LowerError> {
    let mut len = enc.add_sub_imm64(
        ImmOp::Add,
        STACK_POINTER,
        stack_adjust as i32,
        ImmWidth::Imm32,
    )?;
    for reg in callee_saved.iter().rev() {
        len += enc.pop64(reg)?;
    }
    len += enc.pop64(FRAME_POINTER)?;
    len += enc.ret()?;
    Ok(len)
}

/// Walk the body through `ctx`, finishing with the result move and the epilogue
fn lower_body<S: ByteSink>(
    ctx: &mut LoweringContext<S>,
    body: &CodeBody<'_>,
) -> Result<(), LowerError> {
    let mut reader = body.reader();
    loop {
        let (offset, instruction) = match reader.next() {
            Some(item) => item?,
            None => return Err(LowerError::MissingEnd),
        };
        if instruction != Instruction::End {
            lower_instruction(ctx, offset, instruction)?;
            continue;
        }

        let trailing = reader.remaining().len();
        if trailing != 0 {
            return Err(LowerError::TrailingBytes { count: trailing });
        }
        let result = ctx.pop(offset, instruction)?;
        if !ctx.stack().is_empty() {
            return Err(LowerError::LeftoverValues {
                count: ctx.stack().len(),
            });
        }
        lower_result(ctx, result)?;
        let callee_saved = ctx.callee_saved;
        let stack_adjust = ctx.layout.stack_adjust(callee_saved.len());
        emit_epilogue(&mut ctx.enc, &callee_saved, stack_adjust)?;
        return Ok(());
    }
}

/// Size-only pass
pub fn probe(body: &CodeBody<'_>) -> Result<FramePlan, LowerError> {
    let mut ctx = LoweringContext::new(CountingSink::new(), body.var_count)?;
    lower_body(&mut ctx, body)?;

    let callee_saved = ctx.callee_saved;
    let layout = ctx.layout;
    let spills = ctx.spill_count();
    let body_size = ctx.into_sink().count();

    let mut prologue = X86_64Encoder::new(CountingSink::new());
    let stack_adjust = layout.stack_adjust(callee_saved.len());
    let prologue_size = emit_prologue(&mut prologue, &callee_saved, stack_adjust)?;

    let plan = FramePlan {
        layout,
        callee_saved,
        spills,
        total_size: prologue_size + body_size,
    };
    tracing::debug!(
        total_size = plan.total_size,
        stack_adjust,
        saved = %plan.callee_saved,
        temp_bytes = layout.temp_bytes(),
        spills,
        "probed native routine"
    );
    Ok(plan)
}

/// Real pass into `sink`, following `plan`
pub fn emit<S: ByteSink>(body: &CodeBody<'_>, plan: &FramePlan, sink: S) -> Result<S, LowerError> {
    let start = sink.current_position();
    let mut enc = X86_64Encoder::new(sink);
    emit_prologue(&mut enc, &plan.callee_saved, plan.stack_adjust())?;

    let mut ctx = LoweringContext::new(enc.into_inner(), body.var_count)?;
    lower_body(&mut ctx, body)?;

    if ctx.callee_saved != plan.callee_saved {
        return Err(LowerError::PlanMismatch(format!(
            "callee-saved registers {} after probing {}",
            ctx.callee_saved, plan.callee_saved
        )));
    }
    if ctx.layout != plan.layout {
        return Err(LowerError::PlanMismatch(format!(
            "{} temporary bytes after probing {}",
            ctx.layout.temp_bytes(),
            plan.layout.temp_bytes()
        )));
    }

    let sink = ctx.into_sink();
    let written = sink.current_position() - start;
    if written != plan.total_size {
        return Err(LowerError::SizeMismatch {
            probe: plan.total_size,
            emit: written,
        });
    }
    tracing::debug!(bytes = written, "emitted native routine");
    Ok(sink)
}

/// Probe, then emit into a buffer of exactly the probed size
pub fn compile_routine(body: &CodeBody<'_>) -> Result<Vec<u8>, LowerError> {
    let plan = probe(body)?;
    emit(body, &plan, Vec::with_capacity(plan.total_size))
}
