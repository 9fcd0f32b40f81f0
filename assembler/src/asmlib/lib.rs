//! The MIXAL assembler library.
//!
//! Source goes in as lines of `LOC OP ADDRESS`, and a [`driver::Listing`]
//! comes out: assembled words keyed by address plus the program entry
//! point, ready for the simulator's loader.  The pass is single;
//! forward references and literal constants are resolved by patching
//! at definition time and at END.

pub mod driver;
pub mod lexer;
pub mod optable;
pub mod parser;
pub mod symtab;
pub mod types;

pub use driver::{Assembler, Listing};
pub use types::AsmError;
