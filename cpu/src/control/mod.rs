//! The CPU: instruction decode, validation, and execution.
//!
//! `execute` interprets one instruction word against the core image
//! and the I/O coprocessor and returns the next program counter;
//! `tick` runs it on the shared timeline, doing nothing until the
//! clock reaches the instruction's completion timestamp.  The word
//! executed is normally `memory[pc]`, but `execute` accepts any word
//! so a front end can inject instructions while debugging.

use tracing::{event, Level};

use base::instruction::opcode;
use base::prelude::*;

use crate::fault::{Fault, Stop};
use crate::io::IoCoprocessor;
use crate::memory::{Comparison, CoreImage, OverflowFlag, MEM_SIZE};

mod timing;

#[cfg(test)]
mod tests;

/// Arithmetic: ADD, SUB, MUL, DIV.
fn is_arith(c: u8) -> bool {
    (opcode::ADD..=opcode::DIV).contains(&c)
}

/// Memory: MOVE, LD*, LD*N, ST*, STJ, STZ.
fn is_mem(c: u8) -> bool {
    (opcode::MOVE..=opcode::STZ).contains(&c)
}

/// Jumps, including the device-gated JBUS and JRED.
fn is_jump(c: u8) -> bool {
    c == opcode::JBUS || (opcode::JRED..=47).contains(&c)
}

/// Transfers: INC*, DEC*, ENT*, ENN*.
fn is_transfer(c: u8) -> bool {
    (48..=55).contains(&c)
}

/// Comparisons: CMPA .. CMPX.
fn is_cmp(c: u8) -> bool {
    c >= 56
}

/// What a CPU tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuStep {
    /// The current instruction is not due yet.
    Waiting,
    /// An instruction was executed.
    Executed,
}

/// The CPU's own state: everything else lives in the core image.
#[derive(Debug)]
pub struct Cpu {
    pc: u16,
    previous_ts: i64,
}

impl Default for Cpu {
    fn default() -> Cpu {
        Cpu::new()
    }
}

impl Cpu {
    pub fn new() -> Cpu {
        Cpu {
            pc: 0,
            previous_ts: 0,
        }
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    /// The timestamp at which the instruction at the current program
    /// counter will complete.
    pub fn next_ts(&self, core: &CoreImage, io: &IoCoprocessor) -> i64 {
        let w = core
            .memory
            .get(usize::from(self.pc))
            .copied()
            .unwrap_or(Word::ZERO);
        timing::completion_ts(self.previous_ts, self.pc, w, io)
    }

    /// Execute the current instruction if the clock has reached its
    /// completion timestamp.
    pub fn tick(
        &mut self,
        core: &mut CoreImage,
        io: &mut IoCoprocessor,
        now: i64,
    ) -> Result<CpuStep, Stop> {
        let pc = usize::from(self.pc);
        if pc >= MEM_SIZE {
            return Err(Stop::Fault(Fault::PcOutOfRange { pc: self.pc }));
        }
        let w = core.memory[pc];
        if now < timing::completion_ts(self.previous_ts, self.pc, w, io) {
            return Ok(CpuStep::Waiting);
        }
        let next_pc = self.execute(w, core, io, now)?;
        self.previous_ts = now;
        self.pc = next_pc;
        Ok(CpuStep::Executed)
    }

    /// Decode, validate, and execute `w` as though it were the
    /// current instruction, returning the next program counter.
    pub fn execute(
        &mut self,
        w: Word,
        core: &mut CoreImage,
        io: &mut IoCoprocessor,
        now: i64,
    ) -> Result<u16, Stop> {
        let inst = Instruction::from_word(w);
        let c = inst.opcode;
        let f = inst.field;
        if inst.index > 6 {
            return Err(Stop::Fault(Fault::BadIndex {
                inst: w,
                index: inst.index,
            }));
        }

        // The effective address is a word, not a native integer: a
        // zero M keeps the sign of AA.
        let mut m = inst.address;
        if inst.index > 0 {
            m = m + core.i[usize::from(inst.index) - 1];
        }
        let mv = m.value();

        let needs_memory_address = is_arith(c) || is_mem(c) || is_jump(c) || is_cmp(c);
        let in_memory = (0..MEM_SIZE as i64).contains(&mv);
        if (needs_memory_address && !in_memory) || (c == opcode::SHIFT && mv < 0) {
            return Err(Stop::Fault(Fault::BadAddress {
                inst: w,
                address: mv,
            }));
        }

        // Field validation.  MOVE's F is a word count and the I/O
        // opcodes carry a unit number, so neither is an (L:R) pair.
        let field_bearing = is_arith(c) || (is_mem(c) && c != opcode::MOVE) || is_cmp(c);
        let spec = inst.field_spec();
        let bad_field = (field_bearing && spec.is_none())
            || (c == opcode::SPECIAL && f > 2)
            || (c == opcode::SHIFT && f > 5)
            || (c == opcode::JMP && f > 9)
            || ((40..=47).contains(&c) && f > 5)
            || (is_transfer(c) && f > 3);
        if bad_field {
            return Err(Stop::Fault(Fault::BadField { inst: w, field: f }));
        }
        if (c == opcode::JBUS || c == opcode::JRED) && usize::from(f) >= crate::io::NUM_DEVICES {
            return Err(Stop::Fault(Fault::BadDevice { inst: w, unit: f }));
        }
        // Validated above for every opcode that reads it; the default
        // is never consulted.
        let fspec = spec.unwrap_or(FieldSpec::WORD);

        event!(Level::TRACE, "executing {} at pc {}", inst, self.pc);

        let mem_word = if in_memory {
            core.memory[mv as usize]
        } else {
            Word::ZERO
        };
        let mut next_pc = (self.pc + 1) % MEM_SIZE as u16;

        match c {
            opcode::NOP => {}
            opcode::ADD => {
                core.a = core.a + mem_word.field(fspec);
            }
            opcode::SUB => {
                core.a = core.a + -mem_word.field(fspec);
            }
            opcode::MUL => {
                let v = mem_word.field(fspec);
                let sign = core.a.sign().combine(v.sign());
                let product = u64::from(core.a.magnitude()) * u64::from(v.magnitude());
                core.a = Word::from_parts(sign, product >> 30);
                core.x = Word::from_parts(sign, product & ((1 << 30) - 1));
            }
            opcode::DIV => {
                exec_div(core, mem_word.field(fspec));
            }
            opcode::SPECIAL => match f {
                0 => exec_num(core),
                1 => exec_chr(core),
                _ => {
                    event!(Level::DEBUG, "halt at pc {}", self.pc);
                    return Err(Stop::Halted);
                }
            },
            opcode::SHIFT => exec_shift(core, f, mv),
            opcode::MOVE => {
                exec_move(core, mv, f)?;
            }
            8..=15 => {
                let r = Register::from_opcode(c);
                core.set_reg(r, mem_word.field(fspec));
            }
            16..=23 => {
                let r = Register::from_opcode(c);
                core.set_reg(r, (-mem_word).field(fspec));
            }
            24..=31 => {
                let r = Register::from_opcode(c);
                core.memory[mv as usize] = mem_word.with_field(core.reg(r), fspec);
            }
            opcode::STJ => {
                core.memory[mv as usize] = mem_word.with_field(core.j, fspec);
            }
            opcode::STZ => {
                core.memory[mv as usize] = mem_word.with_field(Word::ZERO, fspec);
            }
            opcode::JBUS => {
                if io.is_busy(usize::from(f)) {
                    core.j = Word::from_value(i64::from(next_pc));
                    next_pc = mv as u16;
                }
            }
            opcode::IOC | opcode::IN | opcode::OUT => {
                io.execute(w, m, core, now)?;
            }
            opcode::JRED => {
                if !io.is_busy(usize::from(f)) {
                    core.j = Word::from_value(i64::from(next_pc));
                    next_pc = mv as u16;
                }
            }
            opcode::JMP => {
                next_pc = exec_global_jump(core, f, mv as u16, next_pc);
            }
            40..=47 => {
                let v = core.reg(Register::from_opcode(c)).value();
                let jump = match f {
                    0 => v < 0,
                    1 => v == 0,
                    2 => v > 0,
                    3 => v >= 0,
                    4 => v != 0,
                    _ => v <= 0,
                };
                if jump {
                    core.j = Word::from_value(i64::from(next_pc));
                    next_pc = mv as u16;
                }
            }
            48..=55 => {
                let r = Register::from_opcode(c);
                let new = match f {
                    0 => core.reg(r) + m,
                    1 => core.reg(r) + -m,
                    2 => m,
                    _ => -m,
                };
                core.set_reg(r, new);
            }
            _ => {
                let rf = core.reg(Register::from_opcode(c)).field(fspec).value();
                let mf = mem_word.field(fspec).value();
                core.set_comparison(match rf.cmp(&mf) {
                    std::cmp::Ordering::Less => Comparison::Less,
                    std::cmp::Ordering::Equal => Comparison::Equal,
                    std::cmp::Ordering::Greater => Comparison::Greater,
                });
            }
        }

        // An index register holding more than two bytes is a fatal
        // condition, unlike the A/X overflow below.
        for n in 0..6 {
            if core.i[n].index_overflowed() {
                return Err(Stop::Fault(Fault::IndexOverflow {
                    register: n as u8 + 1,
                    value: core.i[n],
                }));
            }
        }
        if core.a.overflowed() {
            core.set_overflow(OverflowFlag::On);
            core.a = core.a.without_overflow();
        }
        if core.x.overflowed() {
            core.set_overflow(OverflowFlag::On);
            core.x = core.x.without_overflow();
        }

        Ok(next_pc)
    }
}

fn exec_div(core: &mut CoreImage, v: Word) {
    if v.is_zero() {
        // Registers are left alone; the program sees only the flag.
        event!(Level::DEBUG, "divide by zero");
        core.set_overflow(OverflowFlag::On);
        return;
    }
    let dividend = (u64::from(core.a.magnitude()) << 30) | u64::from(core.x.magnitude());
    let divisor = u64::from(v.magnitude());
    let a_sign = core.a.sign();
    core.a = Word::from_parts(a_sign.combine(v.sign()), dividend / divisor);
    core.x = Word::from_parts(a_sign, dividend % divisor);
}

/// NUM: pack the low decimal digits of the bytes of A and X into A's
/// magnitude, keeping A's sign.
fn exec_num(core: &mut CoreImage) {
    let mut num: u64 = 0;
    for i in 1..=5 {
        num = num * 10 + u64::from(core.a.byte(i) % 10);
    }
    for i in 1..=5 {
        num = num * 10 + u64::from(core.x.byte(i) % 10);
    }
    core.a = Word::from_parts(core.a.sign(), num);
}

/// CHR: unpack A's magnitude into ten character-code digits across A
/// and X.
fn exec_chr(core: &mut CoreImage) {
    let mut num = u64::from(core.a.magnitude());
    let mut digits = [0u8; 10];
    for d in digits.iter_mut().rev() {
        *d = 30 + (num % 10) as u8;
        num /= 10;
    }
    let mut a = [0u8; 5];
    let mut x = [0u8; 5];
    a.copy_from_slice(&digits[..5]);
    x.copy_from_slice(&digits[5..]);
    core.a = Word::from_bytes(core.a.sign(), a);
    core.x = Word::from_bytes(core.x.sign(), x);
}

fn exec_shift(core: &mut CoreImage, f: u8, count: i64) {
    // Left shifts move bytes toward byte 1, i.e. to lower indices.
    let shift = if f % 2 == 0 { -count } else { count };
    match f {
        0 | 1 => {
            let src = core.a.bytes();
            let mut out = [0u8; 5];
            for (i, b) in src.iter().enumerate() {
                let t = i as i64 + shift;
                if (0..5).contains(&t) {
                    out[t as usize] = *b;
                }
            }
            core.a = Word::from_bytes(core.a.sign(), out);
        }
        2 | 3 | 4 | 5 => {
            let circular = f >= 4;
            let mut src = [0u8; 10];
            src[..5].copy_from_slice(&core.a.bytes());
            src[5..].copy_from_slice(&core.x.bytes());
            let mut out = [0u8; 10];
            for (i, b) in src.iter().enumerate() {
                let t = i as i64 + shift;
                if circular {
                    out[t.rem_euclid(10) as usize] = *b;
                } else if (0..10).contains(&t) {
                    out[t as usize] = *b;
                }
            }
            let mut a = [0u8; 5];
            let mut x = [0u8; 5];
            a.copy_from_slice(&out[..5]);
            x.copy_from_slice(&out[5..]);
            core.a = Word::from_bytes(core.a.sign(), a);
            core.x = Word::from_bytes(core.x.sign(), x);
        }
        _ => unreachable!("shift field validated to 0..=5"),
    }
}

fn exec_move(core: &mut CoreImage, src0: i64, count: u8) -> Result<(), Stop> {
    let dest0 = core.i[0].value();
    for k in 0..i64::from(count) {
        let s = src0 + k;
        let d = dest0 + k;
        if !(0..MEM_SIZE as i64).contains(&s) || !(0..MEM_SIZE as i64).contains(&d) {
            return Err(Stop::Fault(Fault::MoveOverrun { src: s, dest: d }));
        }
        core.memory[d as usize] = core.memory[s as usize];
    }
    core.i[0] = core.i[0] + Word::from_value(i64::from(count));
    Ok(())
}

fn exec_global_jump(core: &mut CoreImage, f: u8, m: u16, next_pc: u16) -> u16 {
    // JSJ jumps without touching J; every other taken jump records
    // the return address first.
    if f == 1 {
        return m;
    }
    let taken = match f {
        0 => true,
        2 => {
            if core.overflow() == OverflowFlag::On {
                core.set_overflow(OverflowFlag::Off);
                true
            } else {
                false
            }
        }
        3 => {
            // JNOV consumes the flag either way.
            if core.overflow() == OverflowFlag::On {
                core.set_overflow(OverflowFlag::Off);
                false
            } else {
                true
            }
        }
        4 => core.comparison() == Comparison::Less,
        5 => core.comparison() == Comparison::Equal,
        6 => core.comparison() == Comparison::Greater,
        7 => core.comparison() != Comparison::Less,
        8 => core.comparison() != Comparison::Equal,
        _ => core.comparison() != Comparison::Greater,
    };
    if taken {
        core.j = Word::from_value(i64::from(next_pc));
        m
    } else {
        next_pc
    }
}
