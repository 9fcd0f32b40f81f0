//! Assembly failures.  Every variant that arises from a source line
//! carries its 1-based line number.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

#[derive(Debug)]
pub enum AsmError {
    Io {
        context: String,
        source: io::Error,
    },
    /// A character outside the MIXAL alphabet in a LOC, OP, or ADDR
    /// field.
    InvalidChar {
        line: usize,
        text: String,
    },
    MissingOp {
        line: usize,
    },
    UnknownOp {
        line: usize,
        op: String,
    },
    /// A symbol must contain at least one letter and only letters and
    /// digits.
    BadSymbol {
        line: usize,
        symbol: String,
    },
    DuplicateSymbol {
        line: usize,
        symbol: String,
    },
    /// An `nH` definition used where a reference is expected, or
    /// `nF`/`nB` used as a location.
    LocalMisuse {
        line: usize,
        symbol: String,
    },
    UndefinedSymbol {
        line: usize,
        symbol: String,
    },
    /// An `nF` reference with no later `nH`, detected at END.
    UndefinedLocal {
        digit: u8,
    },
    BadExpression {
        line: usize,
        reason: String,
    },
    DivisionByZero {
        line: usize,
    },
    BadField {
        line: usize,
        field: i64,
    },
    /// An address part that does not fit the two address bytes.
    AddressTooLarge {
        line: usize,
        value: i64,
    },
    /// The location counter left assemblable memory.
    StarOutOfRange {
        line: usize,
        value: i64,
    },
    /// An ALF character outside the 56-entry table.
    UnmappableChar {
        line: usize,
        ch: char,
    },
    /// EQU requires a location symbol to define.
    MissingLocation {
        line: usize,
    },
    MissingEnd,
}

impl AsmError {
    pub fn io(context: impl Into<String>, source: io::Error) -> AsmError {
        AsmError::Io {
            context: context.into(),
            source,
        }
    }
}

impl Display for AsmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        use AsmError::*;
        match self {
            Io { context, source } => write!(f, "{}: {}", context, source),
            InvalidChar { line, text } => {
                write!(f, "line {}: invalid characters in '{}'", line, text)
            }
            MissingOp { line } => write!(f, "line {}: no opcode field", line),
            UnknownOp { line, op } => write!(f, "line {}: unknown opcode '{}'", line, op),
            BadSymbol { line, symbol } => write!(
                f,
                "line {}: '{}' is not a symbol (letters and digits, at least one letter)",
                line, symbol
            ),
            DuplicateSymbol { line, symbol } => {
                write!(f, "line {}: symbol '{}' is already defined", line, symbol)
            }
            LocalMisuse { line, symbol } => write!(
                f,
                "line {}: local symbol '{}' used in the wrong context",
                line, symbol
            ),
            UndefinedSymbol { line, symbol } => {
                write!(f, "line {}: undefined symbol '{}'", line, symbol)
            }
            UndefinedLocal { digit } => write!(
                f,
                "END reached with unresolved forward reference {}F",
                digit
            ),
            BadExpression { line, reason } => {
                write!(f, "line {}: bad expression: {}", line, reason)
            }
            DivisionByZero { line } => write!(f, "line {}: division by zero", line),
            BadField { line, field } => write!(f, "line {}: invalid field value {}", line, field),
            AddressTooLarge { line, value } => write!(
                f,
                "line {}: address {} does not fit in two bytes",
                line, value
            ),
            StarOutOfRange { line, value } => write!(
                f,
                "line {}: location counter {} is outside memory",
                line, value
            ),
            UnmappableChar { line, ch } => {
                write!(f, "line {}: character '{}' is not in the MIX table", line, ch)
            }
            MissingLocation { line } => {
                write!(f, "line {}: EQU requires a location symbol", line)
            }
            MissingEnd => f.write_str("source ended without an END line"),
        }
    }
}

impl Error for AsmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AsmError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
