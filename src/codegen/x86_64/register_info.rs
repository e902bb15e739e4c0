/// x86_64 register banks and calling convention for the JIT routine
use ras::encoder::Reg;

/// Legacy registers, addressable without a REX prefix
pub const BANK_A: [Reg; 8] = [
    Reg::Rax,
    Reg::Rcx,
    Reg::Rdx,
    Reg::Rbx,
    Reg::Rsp,
    Reg::Rbp,
    Reg::Rsi,
    Reg::Rdi,
];

/// r8..r15, each use costs a REX prefix byte
pub const BANK_B: [Reg; 8] = [
    Reg::R8,
    Reg::R9,
    Reg::R10,
    Reg::R11,
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
];

/// Preserved across the call on both Windows x64 and System V; pushed in this order
pub const CALLEE_SAVED_REGISTERS: [Reg; 7] = [
    Reg::Rbx,
    Reg::Rsi,
    Reg::Rdi,
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
];

/// Integer return register
pub const RETURN_REGISTER: Reg = Reg::Rax;

/// Stack pointer register
pub const STACK_POINTER: Reg = Reg::Rsp;

/// Frame pointer register
pub const FRAME_POINTER: Reg = Reg::Rbp;

/// `idiv` takes its dividend here and leaves the quotient here
pub const DIVIDEND_REGISTER: Reg = Reg::Rax;

/// High half of the `idiv` dividend; clobbered with the remainder
pub const DIVIDEND_HIGH_REGISTER: Reg = Reg::Rdx;

/// Never handed out by the allocator
pub fn is_reserved(reg: Reg) -> bool {
    reg == STACK_POINTER || reg == FRAME_POINTER
}

pub fn is_callee_saved(reg: Reg) -> bool {
    CALLEE_SAVED_REGISTERS.contains(&reg)
}
