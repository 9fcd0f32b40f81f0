//! Instruction timing.
//!
//! Given the previous instruction's completion timestamp, compute
//! when the next one will complete.  Most costs are the fixed unit
//! counts of the architecture; the device instructions instead wait
//! for the unit to come free, which is how CPU stalls against
//! in-flight I/O arise.

use base::instruction::opcode;
use base::prelude::*;

use crate::io::IoCoprocessor;

pub(crate) fn completion_ts(previous_ts: i64, pc: u16, w: Word, io: &IoCoprocessor) -> i64 {
    let inst = Instruction::from_word(w);
    let c = inst.opcode;
    let f = inst.field;
    match c {
        opcode::ADD | opcode::SUB | opcode::SHIFT => previous_ts + 2,
        8..=33 => previous_ts + 2, // loads, stores
        56..=63 => previous_ts + 2, // comparisons
        opcode::MUL => previous_ts + 10,
        opcode::SPECIAL if f == 0 || f == 1 => previous_ts + 10, // NUM, CHR
        opcode::DIV => previous_ts + 12,
        opcode::MOVE => previous_ts + 1 + 2 * i64::from(f),
        opcode::IOC | opcode::IN | opcode::OUT => gated(previous_ts, f, io),
        // JBUS spinning on its own address is a stall, not a spin:
        // bill the whole wait up front.
        opcode::JBUS if inst.index == 0 && inst.address.value() == i64::from(pc) => {
            gated(previous_ts, f, io)
        }
        _ => previous_ts + 1,
    }
}

/// Device instructions execute one tick after the unit comes free.
fn gated(previous_ts: i64, unit: u8, io: &IoCoprocessor) -> i64 {
    match io.free_ts(usize::from(unit)) {
        None => previous_ts + 1,
        Some(free) => free + 1,
    }
}
