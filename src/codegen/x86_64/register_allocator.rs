//! Register file for the stack-to-register lowering.
//!
//! Two banks of eight 32-bit registers, each slot either free or owned by one pending
//! operand stack value. Bank A is tried before bank B; `esp` and `ebp` are never handed
//! out. A separate [`CalleeSavedSet`] remembers which preserved registers were claimed so
//! the prologue and epilogue can save and restore them.

use super::register_info::{BANK_A, BANK_B, CALLEE_SAVED_REGISTERS, is_callee_saved, is_reserved};
use ras::encoder::Reg;
use std::fmt;

/// Identity of one value pushed on the virtual operand stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    A,
    B,
}

impl Bank {
    fn registers(self) -> &'static [Reg; 8] {
        match self {
            Bank::A => &BANK_A,
            Bank::B => &BANK_B,
        }
    }

    fn slot(self) -> usize {
        match self {
            Bank::A => 0,
            Bank::B => 1,
        }
    }
}

/// A register named by bank and index within the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysReg {
    pub bank: Bank,
    pub index: u8,
}

impl PhysReg {
    pub fn from_reg(reg: Reg) -> Self {
        let bank = if reg.is_extended() { Bank::B } else { Bank::A };
        Self {
            bank,
            index: reg.code() & 0x07,
        }
    }

    pub fn reg(self) -> Reg {
        self.bank.registers()[self.index as usize]
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reg().name32())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    owners: [[Option<ValueId>; 8]; 2],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self, reg: Reg) -> Option<ValueId> {
        let phys = PhysReg::from_reg(reg);
        self.owners[phys.bank.slot()][phys.index as usize]
    }

    pub fn is_free(&self, reg: Reg) -> bool {
        !is_reserved(reg) && self.owner(reg).is_none()
    }

    /// First free register of `bank`
    pub fn first_free(&self, bank: Bank) -> Option<PhysReg> {
        bank.registers()
            .iter()
            .copied()
            .find(|&reg| self.is_free(reg))
            .map(PhysReg::from_reg)
    }

    /// Bank A first, then bank B
    pub fn find_free(&self) -> Option<PhysReg> {
        self.first_free(Bank::A).or_else(|| self.first_free(Bank::B))
    }

    pub fn claim(&mut self, phys: PhysReg, owner: ValueId) {
        debug_assert!(!is_reserved(phys.reg()), "{} is reserved", phys);
        self.owners[phys.bank.slot()][phys.index as usize] = Some(owner);
    }

    pub fn release(&mut self, phys: PhysReg) {
        self.owners[phys.bank.slot()][phys.index as usize] = None;
    }

    /// Registers currently owned, with their owners
    pub fn owned(&self) -> impl Iterator<Item = (PhysReg, ValueId)> + '_ {
        [Bank::A, Bank::B].into_iter().flat_map(move |bank| {
            (0..8u8).filter_map(move |index| {
                self.owners[bank.slot()][index as usize].map(|owner| (PhysReg { bank, index }, owner))
            })
        })
    }
}

/// Callee-preserved registers claimed during one compilation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalleeSavedSet {
    used: [bool; 7],
}

impl CalleeSavedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reg` if it is callee-saved; other registers are ignored
    pub fn mark(&mut self, reg: Reg) {
        if let Some(pos) = CALLEE_SAVED_REGISTERS.iter().position(|&r| r == reg) {
            self.used[pos] = true;
        }
    }

    pub fn contains(&self, reg: Reg) -> bool {
        is_callee_saved(reg)
            && CALLEE_SAVED_REGISTERS
                .iter()
                .position(|&r| r == reg)
                .is_some_and(|pos| self.used[pos])
    }

    pub fn len(&self) -> usize {
        self.used.iter().filter(|&&u| u).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Saved registers in push order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Reg> + '_ {
        CALLEE_SAVED_REGISTERS
            .iter()
            .zip(self.used.iter())
            .filter(|(_, used)| **used)
            .map(|(&reg, _)| reg)
    }
}

impl fmt::Display for CalleeSavedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|r| r.name64()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_order_skips_reserved() {
        let mut file = RegisterFile::new();
        let mut order = Vec::new();
        let mut next = 0;
        while let Some(phys) = file.find_free() {
            file.claim(phys, ValueId(next));
            order.push(phys.reg());
            next += 1;
        }
        assert_eq!(
            order,
            vec![
                Reg::Rax,
                Reg::Rcx,
                Reg::Rdx,
                Reg::Rbx,
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
            ]
        );
        assert_eq!(file.owned().count(), 14);
    }

    #[test]
    fn test_release_makes_register_available_again() {
        let mut file = RegisterFile::new();
        let eax = PhysReg::from_reg(Reg::Rax);
        file.claim(eax, ValueId(7));
        assert_eq!(file.owner(Reg::Rax), Some(ValueId(7)));
        assert_eq!(file.find_free().map(PhysReg::reg), Some(Reg::Rcx));
        file.release(eax);
        assert!(file.is_free(Reg::Rax));
        assert_eq!(file.find_free().map(PhysReg::reg), Some(Reg::Rax));
    }

    #[test]
    fn test_phys_reg_round_trip() {
        for reg in Reg::ALL {
            assert_eq!(PhysReg::from_reg(reg).reg(), reg);
        }
        assert_eq!(PhysReg::from_reg(Reg::R10).to_string(), "r10d");
    }

    #[test]
    fn test_callee_saved_set_order() {
        let mut saved = CalleeSavedSet::new();
        saved.mark(Reg::R13);
        saved.mark(Reg::Rax);
        saved.mark(Reg::Rbx);
        saved.mark(Reg::R13);
        assert_eq!(saved.len(), 2);
        assert!(saved.contains(Reg::Rbx));
        assert!(!saved.contains(Reg::Rax));
        assert_eq!(saved.iter().collect::<Vec<_>>(), vec![Reg::Rbx, Reg::R13]);
        assert_eq!(saved.iter().rev().collect::<Vec<_>>(), vec![Reg::R13, Reg::Rbx]);
        assert_eq!(saved.to_string(), "[rbx, r13]");
    }
}
