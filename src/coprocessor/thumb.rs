//! Thumb instruction set interpreter
//!
//! Implements the 16-bit Thumb instruction set of ARMv4T/ARMv5T cores, which
//! is what cartridge drivers are compiled to. Instructions execute one at a
//! time against a `CoprocMemory`. A memory read that yields aborts the
//! instruction before it changes anything, so the same instruction runs
//! again when the interpreter is resumed.

use std::collections::BTreeSet;

use log::trace;
use serde::{Deserialize, Serialize};

use super::{CoprocMemory, Interrupt, YieldReason};

pub const SP: usize = 13;
pub const LR: usize = 14;
pub const PC: usize = 15;

/// Register file and flags
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThumbState {
    pub regs: [u32; 16],

    /// Negative
    pub n: bool,

    /// Zero
    pub z: bool,

    /// Carry
    pub c: bool,

    /// Overflow
    pub v: bool,

    /// Instructions executed since reset
    pub instructions: u64,

    /// Execute the instruction at PC even if it carries a breakpoint
    pub resume_past_breakpoint: bool,
}

/// Why an instruction did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Yield,
    Fault(u32),
    Undefined(u16),
    ArmState(u32),
}

impl From<Interrupt> for Stop {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Yield => Stop::Yield,
            Interrupt::Fault(addr) => Stop::Fault(addr),
        }
    }
}

/// Thumb interpreter
#[derive(Debug, Clone)]
pub struct Thumb {
    state: ThumbState,

    /// Where execution starts after reset
    entry: u32,

    /// Initial stack pointer
    stack_top: u32,

    /// Return address that means the program has finished
    program_end: u32,

    breakpoints: BTreeSet<u32>,
    breakpoints_enabled: bool,
}

impl Thumb {
    pub fn new(entry: u32, stack_top: u32, program_end: u32) -> Self {
        let mut thumb = Thumb {
            state: ThumbState::default(),
            entry: entry & !1,
            stack_top,
            program_end: program_end & !1,
            breakpoints: BTreeSet::new(),
            breakpoints_enabled: false,
        };
        thumb.reset();
        thumb
    }

    /// Return to the entry point with a fresh register file
    pub fn reset(&mut self) {
        self.state = ThumbState::default();
        self.state.regs[SP] = self.stack_top;
        self.state.regs[LR] = self.program_end | 1;
        self.state.regs[PC] = self.entry;
    }

    pub fn state(&self) -> &ThumbState {
        &self.state
    }

    pub fn restore(&mut self, state: &ThumbState) {
        self.state = state.clone();
    }

    pub fn registers(&self) -> [u32; 16] {
        self.state.regs
    }

    pub fn pc(&self) -> u32 {
        self.state.regs[PC]
    }

    pub fn set_register(&mut self, n: usize, value: u32) {
        if n < 16 {
            self.state.regs[n] = value;
        }
    }

    pub fn set_breakpoints_enabled(&mut self, enabled: bool) {
        self.breakpoints_enabled = enabled;
    }

    pub fn add_breakpoint(&mut self, addr: u32) {
        self.breakpoints.insert(addr & !1);
    }

    pub fn remove_breakpoint(&mut self, addr: u32) {
        self.breakpoints.remove(&(addr & !1));
    }

    /// Execute until the program yields or `limit` instructions have run
    pub fn run(&mut self, mem: &mut dyn CoprocMemory, limit: usize) -> YieldReason {
        for _ in 0..limit {
            let pc = self.state.regs[PC];
            if pc == self.program_end {
                return YieldReason::ProgramEnded;
            }

            if self.breakpoints_enabled
                && !self.state.resume_past_breakpoint
                && self.breakpoints.contains(&pc)
            {
                self.state.resume_past_breakpoint = true;
                trace!("Thumb breakpoint at {:08X}", pc);
                return YieldReason::Breakpoint;
            }

            match self.execute(mem) {
                Ok(()) => {
                    self.state.instructions += 1;
                    self.state.resume_past_breakpoint = false;
                }
                Err(Stop::Yield) => {
                    trace!("Thumb yield at {:08X}", pc);
                    return YieldReason::SyncWithVcs;
                }
                Err(Stop::Fault(addr)) => return YieldReason::MemoryFault(addr),
                Err(Stop::Undefined(op)) => return YieldReason::UndefinedInstruction(op),
                Err(Stop::ArmState(addr)) => return YieldReason::ArmState(addr),
            }
        }
        YieldReason::Runaway
    }

    #[inline]
    fn set_nz(&mut self, value: u32) {
        self.state.n = value & 0x8000_0000 != 0;
        self.state.z = value == 0;
    }

    fn add_with_carry(&mut self, a: u32, b: u32, carry: bool) -> u32 {
        let (partial, c1) = a.overflowing_add(b);
        let (result, c2) = partial.overflowing_add(carry as u32);
        self.state.c = c1 || c2;
        self.state.v = ((a ^ result) & (b ^ result)) & 0x8000_0000 != 0;
        self.set_nz(result);
        result
    }

    fn subtract(&mut self, a: u32, b: u32) -> u32 {
        self.add_with_carry(a, !b, true)
    }

    fn condition(&self, cond: u16) -> bool {
        let s = &self.state;
        match cond {
            0x0 => s.z,
            0x1 => !s.z,
            0x2 => s.c,
            0x3 => !s.c,
            0x4 => s.n,
            0x5 => !s.n,
            0x6 => s.v,
            0x7 => !s.v,
            0x8 => s.c && !s.z,
            0x9 => !s.c || s.z,
            0xA => s.n == s.v,
            0xB => s.n != s.v,
            0xC => !s.z && s.n == s.v,
            0xD => s.z || s.n != s.v,
            _ => true,
        }
    }

    /// Execute one instruction
    fn execute(&mut self, mem: &mut dyn CoprocMemory) -> Result<(), Stop> {
        let pc = self.state.regs[PC];
        let op = mem.read16(pc)?;
        let mut next = pc.wrapping_add(2);
        let pc_value = pc.wrapping_add(4);

        let lo = |shift: u16| ((op >> shift) & 0x7) as usize;

        match op >> 13 {
            0b000 => {
                let (rd, rs) = (lo(0), lo(3));
                if (op >> 11) & 0x3 == 0x3 {
                    // add/subtract register or 3-bit immediate
                    let operand = if op & 0x0400 != 0 {
                        lo(6) as u32
                    } else {
                        self.state.regs[lo(6)]
                    };
                    let a = self.state.regs[rs];
                    self.state.regs[rd] = if op & 0x0200 != 0 {
                        self.subtract(a, operand)
                    } else {
                        self.add_with_carry(a, operand, false)
                    };
                } else {
                    // shift by immediate; zero means 32 for LSR and ASR
                    let amount = ((op >> 6) & 0x1F) as u32;
                    let value = self.state.regs[rs];
                    let carry = self.state.c;
                    let (result, c) = match (op >> 11) & 0x3 {
                        0 => lsl(value, amount, carry),
                        1 => lsr(value, if amount == 0 { 32 } else { amount }, carry),
                        _ => asr(value, if amount == 0 { 32 } else { amount }, carry),
                    };
                    self.state.c = c;
                    self.set_nz(result);
                    self.state.regs[rd] = result;
                }
            }

            0b001 => {
                // move/compare/add/subtract immediate
                let rd = lo(8);
                let imm = (op & 0xFF) as u32;
                let a = self.state.regs[rd];
                match (op >> 11) & 0x3 {
                    0 => {
                        self.set_nz(imm);
                        self.state.regs[rd] = imm;
                    }
                    1 => {
                        self.subtract(a, imm);
                    }
                    2 => self.state.regs[rd] = self.add_with_carry(a, imm, false),
                    _ => self.state.regs[rd] = self.subtract(a, imm),
                }
            }

            0b010 => {
                if op & 0x1000 != 0 {
                    self.load_store_register(mem, op)?;
                } else if op & 0x0800 != 0 {
                    // PC-relative load
                    let addr = (pc_value & !3).wrapping_add(((op & 0xFF) as u32) << 2);
                    let value = mem.read32(addr)?;
                    self.state.regs[lo(8)] = value;
                } else if op & 0x0400 == 0 {
                    self.alu(op);
                } else {
                    self.hi_register(op, pc_value, &mut next)?;
                }
            }

            0b011 => {
                // load/store with 5-bit immediate offset
                let (rd, rb) = (lo(0), lo(3));
                let imm = ((op >> 6) & 0x1F) as u32;
                let base = self.state.regs[rb];
                match (op >> 11) & 0x3 {
                    0 => mem.write32(base.wrapping_add(imm << 2), self.state.regs[rd])?,
                    1 => self.state.regs[rd] = mem.read32(base.wrapping_add(imm << 2))?,
                    2 => mem.write8(base.wrapping_add(imm), self.state.regs[rd] as u8)?,
                    _ => self.state.regs[rd] = mem.read8(base.wrapping_add(imm))? as u32,
                }
            }

            0b100 => {
                if op & 0x1000 == 0 {
                    // load/store halfword
                    let (rd, rb) = (lo(0), lo(3));
                    let addr = self.state.regs[rb].wrapping_add((((op >> 6) & 0x1F) as u32) << 1);
                    if op & 0x0800 != 0 {
                        self.state.regs[rd] = mem.read16(addr)? as u32;
                    } else {
                        mem.write16(addr, self.state.regs[rd] as u16)?;
                    }
                } else {
                    // SP-relative load/store
                    let rd = lo(8);
                    let addr = self.state.regs[SP].wrapping_add(((op & 0xFF) as u32) << 2);
                    if op & 0x0800 != 0 {
                        self.state.regs[rd] = mem.read32(addr)?;
                    } else {
                        mem.write32(addr, self.state.regs[rd])?;
                    }
                }
            }

            0b101 => {
                if op & 0x1000 == 0 {
                    // load address
                    let base = if op & 0x0800 != 0 {
                        self.state.regs[SP]
                    } else {
                        pc_value & !3
                    };
                    self.state.regs[lo(8)] = base.wrapping_add(((op & 0xFF) as u32) << 2);
                } else if op & 0x0F00 == 0x0000 {
                    // adjust stack pointer
                    let offset = ((op & 0x7F) as u32) << 2;
                    let sp = self.state.regs[SP];
                    self.state.regs[SP] = if op & 0x0080 != 0 {
                        sp.wrapping_sub(offset)
                    } else {
                        sp.wrapping_add(offset)
                    };
                } else if op & 0x0600 == 0x0400 {
                    self.push_pop(mem, op, &mut next)?;
                } else {
                    return Err(Stop::Undefined(op));
                }
            }

            0b110 => {
                if op & 0x1000 == 0 {
                    self.multiple(mem, op)?;
                } else {
                    let cond = (op >> 8) & 0xF;
                    if cond >= 0xE {
                        return Err(Stop::Undefined(op));
                    }
                    if self.condition(cond) {
                        let offset = ((op & 0xFF) as i8 as i32) << 1;
                        next = pc_value.wrapping_add(offset as u32);
                    }
                }
            }

            _ => match (op >> 11) & 0x3 {
                0 => {
                    let offset = ((((op & 0x7FF) << 5) as i16 >> 5) as i32) << 1;
                    next = pc_value.wrapping_add(offset as u32);
                }
                1 => return Err(Stop::Undefined(op)),
                2 => {
                    // long branch with link, high part
                    let offset = ((((op & 0x7FF) << 5) as i16 >> 5) as i32) << 12;
                    self.state.regs[LR] = pc_value.wrapping_add(offset as u32);
                }
                _ => {
                    // long branch with link, low part
                    let target = self.state.regs[LR].wrapping_add(((op & 0x7FF) as u32) << 1);
                    self.state.regs[LR] = next | 1;
                    next = target & !1;
                }
            },
        }

        self.state.regs[PC] = next;
        Ok(())
    }

    /// Load/store with register offset, including sign-extended forms
    fn load_store_register(&mut self, mem: &mut dyn CoprocMemory, op: u16) -> Result<(), Stop> {
        let rd = (op & 0x7) as usize;
        let rb = ((op >> 3) & 0x7) as usize;
        let ro = ((op >> 6) & 0x7) as usize;
        let addr = self.state.regs[rb].wrapping_add(self.state.regs[ro]);
        let value = self.state.regs[rd];

        if op & 0x0200 == 0 {
            match (op >> 10) & 0x3 {
                0 => mem.write32(addr, value)?,
                1 => mem.write8(addr, value as u8)?,
                2 => self.state.regs[rd] = mem.read32(addr)?,
                _ => self.state.regs[rd] = mem.read8(addr)? as u32,
            }
        } else {
            match (op >> 10) & 0x3 {
                0 => mem.write16(addr, value as u16)?,
                1 => self.state.regs[rd] = mem.read8(addr)? as i8 as i32 as u32,
                2 => self.state.regs[rd] = mem.read16(addr)? as u32,
                _ => self.state.regs[rd] = mem.read16(addr)? as i16 as i32 as u32,
            }
        }
        Ok(())
    }

    /// Data processing between low registers
    fn alu(&mut self, op: u16) {
        let rd = (op & 0x7) as usize;
        let rs = ((op >> 3) & 0x7) as usize;
        let a = self.state.regs[rd];
        let b = self.state.regs[rs];
        let carry = self.state.c;

        let shifted = |f: fn(u32, u32, bool) -> (u32, bool)| f(a, b & 0xFF, carry);

        let result = match (op >> 6) & 0xF {
            0x0 => Some(a & b),
            0x1 => Some(a ^ b),
            0x2 | 0x3 | 0x4 | 0x7 => {
                let (result, c) = match (op >> 6) & 0xF {
                    0x2 => shifted(lsl),
                    0x3 => shifted(lsr),
                    0x4 => shifted(asr),
                    _ => shifted(ror),
                };
                self.state.c = c;
                Some(result)
            }
            0x5 => {
                self.state.regs[rd] = self.add_with_carry(a, b, carry);
                None
            }
            0x6 => {
                self.state.regs[rd] = self.add_with_carry(a, !b, carry);
                None
            }
            0x8 => {
                self.set_nz(a & b);
                None
            }
            0x9 => {
                self.state.regs[rd] = self.subtract(0, b);
                None
            }
            0xA => {
                self.subtract(a, b);
                None
            }
            0xB => {
                self.add_with_carry(a, b, false);
                None
            }
            0xC => Some(a | b),
            0xD => Some(a.wrapping_mul(b)),
            0xE => Some(a & !b),
            _ => Some(!b),
        };

        if let Some(result) = result {
            self.set_nz(result);
            self.state.regs[rd] = result;
        }
    }

    /// High register operations and branch exchange
    fn hi_register(&mut self, op: u16, pc_value: u32, next: &mut u32) -> Result<(), Stop> {
        let rs = ((op >> 3) & 0xF) as usize;
        let rd = ((op & 0x7) | ((op >> 4) & 0x8)) as usize;
        let read = |regs: &[u32; 16], r: usize| if r == PC { pc_value } else { regs[r] };
        let a = read(&self.state.regs, rd);
        let b = read(&self.state.regs, rs);

        match (op >> 8) & 0x3 {
            0 => {
                let result = a.wrapping_add(b);
                if rd == PC {
                    *next = result & !1;
                } else {
                    self.state.regs[rd] = result;
                }
            }
            1 => {
                self.subtract(a, b);
            }
            2 => {
                if rd == PC {
                    *next = b & !1;
                } else {
                    self.state.regs[rd] = b;
                }
            }
            _ => {
                if b & 1 == 0 {
                    return Err(Stop::ArmState(b));
                }
                if op & 0x0080 != 0 {
                    self.state.regs[LR] = *next | 1;
                }
                *next = b & !1;
            }
        }
        Ok(())
    }

    /// PUSH and POP
    fn push_pop(&mut self, mem: &mut dyn CoprocMemory, op: u16, next: &mut u32) -> Result<(), Stop> {
        let list = op & 0xFF;
        let extra = op & 0x0100 != 0;
        let sp = self.state.regs[SP];

        if op & 0x0800 == 0 {
            let count = list.count_ones() + extra as u32;
            let base = sp.wrapping_sub(count * 4);
            let mut addr = base;
            for r in (0..8).filter(|r| list & (1 << r) != 0) {
                mem.write32(addr, self.state.regs[r])?;
                addr = addr.wrapping_add(4);
            }
            if extra {
                mem.write32(addr, self.state.regs[LR])?;
            }
            self.state.regs[SP] = base;
            return Ok(());
        }

        // gather everything before touching registers
        let mut values = [0u32; 8];
        let mut addr = sp;
        for r in (0..8).filter(|r| list & (1 << r) != 0) {
            values[r] = mem.read32(addr)?;
            addr = addr.wrapping_add(4);
        }
        let target = if extra {
            let target = mem.read32(addr)?;
            addr = addr.wrapping_add(4);
            if target & 1 == 0 {
                return Err(Stop::ArmState(target));
            }
            Some(target)
        } else {
            None
        };

        for r in (0..8).filter(|r| list & (1 << r) != 0) {
            self.state.regs[r] = values[r];
        }
        self.state.regs[SP] = addr;
        if let Some(target) = target {
            *next = target & !1;
        }
        Ok(())
    }

    /// LDMIA and STMIA
    fn multiple(&mut self, mem: &mut dyn CoprocMemory, op: u16) -> Result<(), Stop> {
        let list = op & 0xFF;
        let rb = ((op >> 8) & 0x7) as usize;
        let mut addr = self.state.regs[rb];

        if op & 0x0800 == 0 {
            for r in (0..8).filter(|r| list & (1 << r) != 0) {
                mem.write32(addr, self.state.regs[r])?;
                addr = addr.wrapping_add(4);
            }
            self.state.regs[rb] = addr;
            return Ok(());
        }

        let mut values = [0u32; 8];
        for r in (0..8).filter(|r| list & (1 << r) != 0) {
            values[r] = mem.read32(addr)?;
            addr = addr.wrapping_add(4);
        }
        for r in (0..8).filter(|r| list & (1 << r) != 0) {
            self.state.regs[r] = values[r];
        }
        if list & (1 << rb) == 0 {
            self.state.regs[rb] = addr;
        }
        Ok(())
    }
}

fn lsl(value: u32, amount: u32, carry: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry),
        1..=31 => (value << amount, (value >> (32 - amount)) & 1 != 0),
        32 => (0, value & 1 != 0),
        _ => (0, false),
    }
}

fn lsr(value: u32, amount: u32, carry: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry),
        1..=31 => (value >> amount, (value >> (amount - 1)) & 1 != 0),
        32 => (0, value & 0x8000_0000 != 0),
        _ => (0, false),
    }
}

fn asr(value: u32, amount: u32, carry: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry),
        1..=31 => (((value as i32) >> amount) as u32, (value >> (amount - 1)) & 1 != 0),
        _ => (((value as i32) >> 31) as u32, value & 0x8000_0000 != 0),
    }
}

fn ror(value: u32, amount: u32, carry: bool) -> (u32, bool) {
    if amount == 0 {
        return (value, carry);
    }
    let result = value.rotate_right(amount & 31);
    (result, result & 0x8000_0000 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PROGRAM_END: u32 = 0x200;
    const STACK_TOP: u32 = 0x400;
    const PORT: u32 = 0x1000;

    /// Flat memory with a port that yields unless it has fresh data
    struct TestMemory {
        ram: Vec<u8>,
        port: u32,
        fresh: bool,
    }

    impl TestMemory {
        fn new(program: &[u16]) -> Self {
            let mut ram = vec![0; STACK_TOP as usize];
            for (i, op) in program.iter().enumerate() {
                ram[i * 2..i * 2 + 2].copy_from_slice(&op.to_le_bytes());
            }
            TestMemory { ram, port: 0, fresh: false }
        }

        fn byte(&self, addr: u32) -> Result<u8, Interrupt> {
            self.ram.get(addr as usize).copied().ok_or(Interrupt::Fault(addr))
        }
    }

    impl CoprocMemory for TestMemory {
        fn read8(&mut self, addr: u32) -> Result<u8, Interrupt> {
            self.byte(addr)
        }

        fn read16(&mut self, addr: u32) -> Result<u16, Interrupt> {
            Ok(u16::from_le_bytes([self.byte(addr)?, self.byte(addr + 1)?]))
        }

        fn read32(&mut self, addr: u32) -> Result<u32, Interrupt> {
            if addr == PORT {
                if !self.fresh {
                    return Err(Interrupt::Yield);
                }
                self.fresh = false;
                return Ok(self.port);
            }
            Ok(u32::from_le_bytes([
                self.byte(addr)?,
                self.byte(addr + 1)?,
                self.byte(addr + 2)?,
                self.byte(addr + 3)?,
            ]))
        }

        fn write8(&mut self, addr: u32, data: u8) -> Result<(), Interrupt> {
            match self.ram.get_mut(addr as usize) {
                Some(b) => {
                    *b = data;
                    Ok(())
                }
                None => Err(Interrupt::Fault(addr)),
            }
        }

        fn write16(&mut self, addr: u32, data: u16) -> Result<(), Interrupt> {
            for (i, b) in data.to_le_bytes().iter().enumerate() {
                self.write8(addr + i as u32, *b)?;
            }
            Ok(())
        }

        fn write32(&mut self, addr: u32, data: u32) -> Result<(), Interrupt> {
            for (i, b) in data.to_le_bytes().iter().enumerate() {
                self.write8(addr + i as u32, *b)?;
            }
            Ok(())
        }

        fn peek32(&self, addr: u32) -> Option<u32> {
            let b = |a: u32| self.ram.get(a as usize).copied();
            Some(u32::from_le_bytes([b(addr)?, b(addr + 1)?, b(addr + 2)?, b(addr + 3)?]))
        }
    }

    fn run(program: &[u16]) -> (Thumb, YieldReason) {
        let mut mem = TestMemory::new(program);
        let mut arm = Thumb::new(0, STACK_TOP, PROGRAM_END);
        let reason = arm.run(&mut mem, 10_000);
        (arm, reason)
    }

    #[test]
    fn subtract_and_compare_flags() {
        // MOVS r0,#5; MOVS r1,#3; SUBS r2,r0,r1; CMP r1,r0; BX LR
        let (arm, reason) = run(&[0x2005, 0x2103, 0x1A42, 0x4281, 0x4770]);
        assert_eq!(reason, YieldReason::ProgramEnded);
        assert_eq!(arm.registers()[2], 2);
        let s = arm.state();
        assert_eq!((s.n, s.z, s.c, s.v), (true, false, false, false));
    }

    #[test]
    fn counted_loop() {
        // MOVS r0,#0; MOVS r1,#10; loop: ADDS r0,#3; SUBS r1,#1; BNE loop; BX LR
        let (arm, reason) = run(&[0x2000, 0x210A, 0x3003, 0x3901, 0xD1FC, 0x4770]);
        assert_eq!(reason, YieldReason::ProgramEnded);
        assert_eq!(arm.registers()[0], 30);
        assert_eq!(arm.registers()[1], 0);
    }

    #[test]
    fn call_and_return_through_stack() {
        let mut program = vec![0u16; 0x12];
        // PUSH {LR}; BL 0x20; POP {PC}
        program[0] = 0xB500;
        program[1] = 0xF000;
        program[2] = 0xF80D;
        program[3] = 0xBD00;
        // 0x20: MOVS r0,#42; BX LR
        program[0x10] = 0x202A;
        program[0x11] = 0x4770;

        let (arm, reason) = run(&program);
        assert_eq!(reason, YieldReason::ProgramEnded);
        assert_eq!(arm.registers()[0], 42);
        assert_eq!(arm.registers()[SP], STACK_TOP);
    }

    #[test]
    fn shifts_set_carry() {
        // MOVS r0,#1; LSLS r0,r0,#31; LSLS r1,r0,#1; ASRS r2,r0,#32; BX LR
        let (arm, reason) = run(&[0x2001, 0x07C0, 0x0041, 0x1002, 0x4770]);
        assert_eq!(reason, YieldReason::ProgramEnded);
        let regs = arm.registers();
        assert_eq!(regs[0], 0x8000_0000);
        assert_eq!(regs[1], 0);
        assert_eq!(regs[2], 0xFFFF_FFFF);
        assert!(arm.state().c);
        assert!(arm.state().n);
    }

    #[test]
    fn yield_leaves_instruction_to_rerun() {
        // LDR r1,[pc,#4]; LDR r0,[r1,#0]; BX LR; NOP; .word PORT
        let program = [0x4901, 0x6808, 0x4770, 0x46C0, PORT as u16, 0x0000];
        let mut mem = TestMemory::new(&program);
        let mut arm = Thumb::new(0, STACK_TOP, PROGRAM_END);

        assert_eq!(arm.run(&mut mem, 100), YieldReason::SyncWithVcs);
        assert_eq!(arm.pc(), 2);
        assert_eq!(arm.registers()[1], PORT);
        assert_eq!(arm.registers()[0], 0);

        mem.port = 0x55;
        mem.fresh = true;
        assert_eq!(arm.run(&mut mem, 100), YieldReason::ProgramEnded);
        assert_eq!(arm.registers()[0], 0x55);
    }

    #[test]
    fn identical_runs_are_deterministic() {
        let program = [0x2000, 0x210A, 0x3003, 0x3901, 0xD1FC, 0x4770];
        let (a, _) = run(&program);
        let (b, _) = run(&program);
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn breakpoint_stops_once() {
        let program = [0x2000, 0x210A, 0x3003, 0x3901, 0xD1FC, 0x4770];
        let mut mem = TestMemory::new(&program);
        let mut arm = Thumb::new(0, STACK_TOP, PROGRAM_END);
        arm.add_breakpoint(0x0A);
        arm.set_breakpoints_enabled(true);

        assert_eq!(arm.run(&mut mem, 1000), YieldReason::Breakpoint);
        assert_eq!(arm.pc(), 0x0A);
        assert_eq!(arm.registers()[0], 30);
        assert_eq!(arm.run(&mut mem, 1000), YieldReason::ProgramEnded);
    }

    #[test]
    fn runaway_and_undefined() {
        // B .
        let (_, reason) = run(&[0xE7FE]);
        assert_eq!(reason, YieldReason::Runaway);

        let (arm, reason) = run(&[0xDE00]);
        assert_eq!(reason, YieldReason::UndefinedInstruction(0xDE00));
        assert_eq!(arm.pc(), 0);
    }

    #[test]
    fn bx_to_arm_state_is_reported() {
        // MOVS r0,#4; BX r0
        let (_, reason) = run(&[0x2004, 0x4700]);
        assert_eq!(reason, YieldReason::ArmState(4));
    }
}
