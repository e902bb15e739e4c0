//! x86-64 binary instruction encoder
//!
//! Covers the subset the integer JIT needs: 32-bit two-operand ALU forms between
//! registers and `[base + disp]` memory, immediate loads, signed divide, and the 64-bit
//! push/pop/add/sub/lea/ret used for frame management.
//!
//! Each instruction is assembled into a small local buffer and handed to the sink in one
//! piece, so a [`CountingSink`](super::traits::CountingSink) and a real sink always see
//! the same length for the same call.

use crate::encoder::traits::ByteSink;
use crate::error::RasError;

/// General purpose register, numbered by its hardware encoding.
///
/// The operand width (32 or 64 bit) is decided by the instruction, not the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    pub const ALL: [Reg; 16] = [
        Reg::Rax,
        Reg::Rcx,
        Reg::Rdx,
        Reg::Rbx,
        Reg::Rsp,
        Reg::Rbp,
        Reg::Rsi,
        Reg::Rdi,
        Reg::R8,
        Reg::R9,
        Reg::R10,
        Reg::R11,
        Reg::R12,
        Reg::R13,
        Reg::R14,
        Reg::R15,
    ];

    pub fn from_code(code: u8) -> Option<Reg> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Low three bits, as placed in ModR/M, SIB or the opcode itself
    fn low_bits(self) -> u8 {
        self.code() & 0x07
    }

    /// Needs a REX extension bit (r8..r15)
    pub fn is_extended(self) -> bool {
        self.code() >= 8
    }

    pub fn name32(self) -> &'static str {
        const NAMES: [&str; 16] = [
            "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d",
            "r12d", "r13d", "r14d", "r15d",
        ];
        NAMES[self.code() as usize]
    }

    pub fn name64(self) -> &'static str {
        const NAMES: [&str; 16] = [
            "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15",
        ];
        NAMES[self.code() as usize]
    }
}

/// Base register of a memory operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Base {
    Rbp,
    Rsp,
}

impl Base {
    fn reg(self) -> Reg {
        match self {
            Base::Rbp => Reg::Rbp,
            Base::Rsp => Reg::Rsp,
        }
    }
}

/// `dword ptr [base + disp]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mem {
    pub base: Base,
    pub disp: i32,
}

impl Mem {
    pub fn rbp(disp: i32) -> Self {
        Self {
            base: Base::Rbp,
            disp,
        }
    }

    pub fn rsp(disp: i32) -> Self {
        Self {
            base: Base::Rsp,
            disp,
        }
    }

    pub fn is_disp8(&self) -> bool {
        i8::try_from(self.disp).is_ok()
    }
}

/// Register or memory operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Reg),
    Mem(Mem),
}

/// Two-operand 32-bit operations (`dst = dst op src`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Mov,
    Add,
    Sub,
    Imul,
    Xor,
}

impl AluOp {
    /// Opcode for the `reg <- r/m` direction
    fn load_opcode(self) -> &'static [u8] {
        match self {
            AluOp::Mov => &[0x8b],
            AluOp::Add => &[0x03],
            AluOp::Sub => &[0x2b],
            AluOp::Imul => &[0x0f, 0xaf],
            AluOp::Xor => &[0x33],
        }
    }

    /// Opcode for the `r/m <- reg` direction; imul has no such form
    fn store_opcode(self) -> Option<u8> {
        match self {
            AluOp::Mov => Some(0x89),
            AluOp::Add => Some(0x01),
            AluOp::Sub => Some(0x29),
            AluOp::Xor => Some(0x31),
            AluOp::Imul => None,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Mov => "mov",
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::Imul => "imul",
            AluOp::Xor => "xor",
        }
    }
}

/// 64-bit immediate arithmetic on a register (frame management)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmOp {
    Add,
    Sub,
}

/// Immediate width selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmWidth {
    /// imm8 when the value fits a signed byte, imm32 otherwise
    Auto,
    /// Always imm32, so the instruction length does not depend on the value
    Imm32,
}

/// Build REX prefix
fn encode_rex(w: bool, r: bool, x: bool, b: bool) -> u8 {
    let mut rex = 0x40;
    if w {
        rex |= 0x08;
    }
    if r {
        rex |= 0x04;
    }
    if x {
        rex |= 0x02;
    }
    if b {
        rex |= 0x01;
    }
    rex
}

/// One instruction under construction (x86 instructions are at most 15 bytes)
struct Inst {
    bytes: [u8; 15],
    len: usize,
}

impl Inst {
    fn new() -> Self {
        Self {
            bytes: [0; 15],
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        self.bytes[self.len] = byte;
        self.len += 1;
    }

    fn extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    /// REX only when some bit is set
    fn rex_if_needed(&mut self, w: bool, r: bool, b: bool) {
        if w || r || b {
            self.push(encode_rex(w, r, false, b));
        }
    }

    fn modrm_reg(&mut self, reg_field: u8, rm: Reg) {
        self.push(0xc0 | ((reg_field & 0x07) << 3) | rm.low_bits());
    }

    /// ModR/M + SIB + displacement for `[base + disp]`
    fn modrm_mem(&mut self, reg_field: u8, mem: Mem) {
        let mode = if mem.is_disp8() { 0x40 } else { 0x80 };
        // r/m = 100: SIB follows
        self.push(mode | ((reg_field & 0x07) << 3) | 0x04);
        // scale 1, no index, base
        self.push((0x04 << 3) | mem.base.reg().low_bits());
        if mem.is_disp8() {
            self.push(mem.disp as i8 as u8);
        } else {
            self.extend(&mem.disp.to_le_bytes());
        }
    }

    fn finish<S: ByteSink + ?Sized>(self, sink: &mut S) -> Result<usize, RasError> {
        sink.emit(&self.bytes[..self.len])?;
        Ok(self.len)
    }
}

/// x86-64 instruction encoder writing into a [`ByteSink`]
pub struct X86_64Encoder<S: ByteSink> {
    sink: S,
}

impl<S: ByteSink> X86_64Encoder<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn current_position(&self) -> usize {
        self.sink.current_position()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    /// `op dst32, src32`
    pub fn alu_reg_reg(&mut self, op: AluOp, dst: Reg, src: Reg) -> Result<usize, RasError> {
        let mut inst = Inst::new();
        inst.rex_if_needed(false, dst.is_extended(), src.is_extended());
        inst.extend(op.load_opcode());
        inst.modrm_reg(dst.low_bits(), src);
        inst.finish(&mut self.sink)
    }

    /// `op dst32, dword ptr [mem]`
    pub fn alu_reg_mem(&mut self, op: AluOp, dst: Reg, src: Mem) -> Result<usize, RasError> {
        let mut inst = Inst::new();
        inst.rex_if_needed(false, dst.is_extended(), false);
        inst.extend(op.load_opcode());
        inst.modrm_mem(dst.low_bits(), src);
        inst.finish(&mut self.sink)
    }

    /// `op dword ptr [mem], src32`
    pub fn alu_mem_reg(&mut self, op: AluOp, dst: Mem, src: Reg) -> Result<usize, RasError> {
        let opcode = op.store_opcode().ok_or_else(|| {
            RasError::EncodingError(format!("{} has no memory destination form", op.mnemonic()))
        })?;
        let mut inst = Inst::new();
        inst.rex_if_needed(false, src.is_extended(), false);
        inst.push(opcode);
        inst.modrm_mem(src.low_bits(), dst);
        inst.finish(&mut self.sink)
    }

    /// Dispatch on operand shapes; memory-to-memory is rejected
    pub fn alu(&mut self, op: AluOp, dst: Operand, src: Operand) -> Result<usize, RasError> {
        match (dst, src) {
            (Operand::Reg(d), Operand::Reg(s)) => self.alu_reg_reg(op, d, s),
            (Operand::Reg(d), Operand::Mem(s)) => self.alu_reg_mem(op, d, s),
            (Operand::Mem(d), Operand::Reg(s)) => self.alu_mem_reg(op, d, s),
            (Operand::Mem(_), Operand::Mem(_)) => Err(RasError::EncodingError(format!(
                "{} with two memory operands",
                op.mnemonic()
            ))),
        }
    }

    /// `mov dst32, imm32`
    ///
    /// 32-bit moves have no sign-extended imm8 form, so the immediate is always 4 bytes.
    pub fn mov_imm32(&mut self, dst: Operand, imm: i32) -> Result<usize, RasError> {
        let mut inst = Inst::new();
        match dst {
            Operand::Reg(reg) => {
                inst.rex_if_needed(false, false, reg.is_extended());
                inst.push(0xb8 | reg.low_bits());
            }
            Operand::Mem(mem) => {
                inst.push(0xc7);
                inst.modrm_mem(0, mem);
            }
        }
        inst.extend(&imm.to_le_bytes());
        inst.finish(&mut self.sink)
    }

    /// `idiv divisor32` (edx:eax / divisor, quotient in eax, remainder in edx)
    pub fn idiv(&mut self, divisor: Operand) -> Result<usize, RasError> {
        let mut inst = Inst::new();
        match divisor {
            Operand::Reg(reg) => {
                inst.rex_if_needed(false, false, reg.is_extended());
                inst.push(0xf7);
                inst.modrm_reg(7, reg);
            }
            Operand::Mem(mem) => {
                inst.push(0xf7);
                inst.modrm_mem(7, mem);
            }
        }
        inst.finish(&mut self.sink)
    }

    pub fn push64(&mut self, reg: Reg) -> Result<usize, RasError> {
        let mut inst = Inst::new();
        inst.rex_if_needed(false, false, reg.is_extended());
        inst.push(0x50 | reg.low_bits());
        inst.finish(&mut self.sink)
    }

    pub fn pop64(&mut self, reg: Reg) -> Result<usize, RasError> {
        let mut inst = Inst::new();
        inst.rex_if_needed(false, false, reg.is_extended());
        inst.push(0x58 | reg.low_bits());
        inst.finish(&mut self.sink)
    }

    /// `add/sub reg64, imm`
    pub fn add_sub_imm64(
        &mut self,
        op: ImmOp,
        reg: Reg,
        imm: i32,
        width: ImmWidth,
    ) -> Result<usize, RasError> {
        let ext = match op {
            ImmOp::Add => 0,
            ImmOp::Sub => 5,
        };
        let imm8 = match width {
            ImmWidth::Auto => i8::try_from(imm).ok(),
            ImmWidth::Imm32 => None,
        };
        let mut inst = Inst::new();
        inst.push(encode_rex(true, false, false, reg.is_extended()));
        match imm8 {
            Some(small) => {
                inst.push(0x83);
                inst.modrm_reg(ext, reg);
                inst.push(small as u8);
            }
            None => {
                inst.push(0x81);
                inst.modrm_reg(ext, reg);
                inst.extend(&imm.to_le_bytes());
            }
        }
        inst.finish(&mut self.sink)
    }

    /// `lea dst64, [mem]`
    pub fn lea64(&mut self, dst: Reg, src: Mem) -> Result<usize, RasError> {
        let mut inst = Inst::new();
        inst.push(encode_rex(true, dst.is_extended(), false, false));
        inst.push(0x8d);
        inst.modrm_mem(dst.low_bits(), src);
        inst.finish(&mut self.sink)
    }

    pub fn ret(&mut self) -> Result<usize, RasError> {
        let mut inst = Inst::new();
        inst.push(0xc3);
        inst.finish(&mut self.sink)
    }
}
