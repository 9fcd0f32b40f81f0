//! The conditions that stop the machine.
//!
//! A [`Stop`] is anything that ends the run loop: the HLT instruction
//! (a clean termination) or a [`Fault`].  Faults are unrecoverable;
//! arithmetic overflow is *not* here because MIX handles it with the
//! overflow flag and keeps going.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

use base::prelude::*;

/// A fatal machine condition.
#[derive(Debug)]
pub enum Fault {
    /// The instruction's index byte is outside 0..6.
    BadIndex { inst: Word, index: u8 },
    /// The effective address is outside the range the opcode allows.
    BadAddress { inst: Word, address: i64 },
    /// The field byte is invalid for the opcode.
    BadField { inst: Word, field: u8 },
    /// The unit number does not name one of the 21 devices.
    BadDevice { inst: Word, unit: u8 },
    /// The named device cannot perform the requested operation.
    Unsupported { unit: u8, op: &'static str },
    /// A blocking I/O instruction was issued to a busy device.  The
    /// program is expected to gate on JBUS/JRED.
    DeviceBusy { unit: u8, inst: Word },
    /// A block number outside the device's storage.
    BadBlock { unit: u8, block: i64 },
    /// An input device ran out of data.
    OutOfData { unit: u8 },
    /// Character output of a byte in 56..63, which has no character.
    Unprintable { unit: u8, byte: u8 },
    /// Character input of a character outside the 56-entry table.
    Untranslatable { unit: u8, ch: char },
    /// An index register was left holding more than two bytes.
    IndexOverflow { register: u8, value: Word },
    /// MOVE ran off either end of memory.
    MoveOverrun { src: i64, dest: i64 },
    /// The program counter does not address memory.
    PcOutOfRange { pc: u16 },
    /// A host I/O operation failed; carries the OS error.
    Host { context: String, source: io::Error },
}

impl Fault {
    pub fn host(context: impl Into<String>, source: io::Error) -> Fault {
        Fault::Host {
            context: context.into(),
            source,
        }
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        use Fault::*;
        match self {
            BadIndex { inst, index } => {
                write!(f, "instruction {} has invalid index byte {}", inst, index)
            }
            BadAddress { inst, address } => {
                write!(f, "instruction {} has invalid address {}", inst, address)
            }
            BadField { inst, field } => {
                write!(f, "instruction {} has invalid field byte {}", inst, field)
            }
            BadDevice { inst, unit } => {
                write!(f, "instruction {} names nonexistent unit {}", inst, unit)
            }
            Unsupported { unit, op } => {
                write!(f, "unit {} does not support {}", unit, op)
            }
            DeviceBusy { unit, inst } => write!(
                f,
                "instruction {} issued to busy unit {} (missing JBUS/JRED gate?)",
                inst, unit
            ),
            BadBlock { unit, block } => {
                write!(f, "block {} is outside the storage of unit {}", block, unit)
            }
            OutOfData { unit } => write!(f, "unit {} has no more input", unit),
            Unprintable { unit, byte } => {
                write!(f, "byte {} has no character, cannot print on unit {}", byte, unit)
            }
            Untranslatable { unit, ch } => {
                write!(f, "character '{}' on unit {} is not in the MIX table", ch, unit)
            }
            IndexOverflow { register, value } => {
                write!(f, "index register I{} overflowed: {}", register, value)
            }
            MoveOverrun { src, dest } => {
                write!(f, "MOVE left memory (source {}, destination {})", src, dest)
            }
            PcOutOfRange { pc } => write!(f, "program counter {} does not address memory", pc),
            Host { context, source } => write!(f, "{}: {}", context, source),
        }
    }
}

impl Error for Fault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Fault::Host { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Why the machine stopped ticking.
#[derive(Debug)]
pub enum Stop {
    /// The HLT instruction: a normal termination.
    Halted,
    Fault(Fault),
}

impl From<Fault> for Stop {
    fn from(fault: Fault) -> Stop {
        Stop::Fault(fault)
    }
}

impl Display for Stop {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Stop::Halted => f.write_str("halted"),
            Stop::Fault(fault) => write!(f, "fault: {}", fault),
        }
    }
}

impl Error for Stop {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Stop::Halted => None,
            Stop::Fault(fault) => Some(fault),
        }
    }
}
