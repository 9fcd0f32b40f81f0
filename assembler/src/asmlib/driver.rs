//! The assembly pass itself.
//!
//! One `Assembler` owns the location counter, the symbol tables, the
//! pending literals, and the assembled words; feed it lines and then
//! `finish` it into a [`Listing`].  The pass is single but forward
//! references are free: an instruction naming a symbol that is not
//! yet defined is emitted with a zero A-field and recorded as a
//! patch site, and definition rewrites every waiting site.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use tracing::{event, Level};

use base::prelude::*;

use crate::lexer;
use crate::optable;
use crate::parser::{self, APart, EvalContext};
use crate::symtab::{classify, SymbolRef, SymbolTable};
use crate::types::AsmError;

/// Addresses the location counter may assemble into.
const MEM_SIZE: i64 = 4000;

/// Largest value the two address bytes can carry.
const ADDR_MAX: i64 = 4095;

/// The output of assembly: the words, sorted by address, and the
/// program entry point from END's W-value.
#[derive(Debug, PartialEq, Eq)]
pub struct Listing {
    pub words: BTreeMap<u16, Word>,
    pub entry: Option<u16>,
}

impl Listing {
    /// Emit the textual form consumed by the machine's loader:
    /// `NNNN: ± b1 b2 b3 b4 b5` lines and a trailing `PC:` line when
    /// there is an entry point.
    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (addr, word) in &self.words {
            writeln!(out, "{:04}: {}", addr, word)?;
        }
        if let Some(entry) = self.entry {
            writeln!(out, "PC: {:04}", entry)?;
        }
        Ok(())
    }
}

pub struct Assembler {
    star: i64,
    line_no: usize,
    ended: bool,
    entry: Option<u16>,
    words: BTreeMap<u16, Word>,
    symbols: SymbolTable,
    /// `(hidden symbol, value)` in order of first use.
    literals: Vec<(String, i64)>,
}

impl Default for Assembler {
    fn default() -> Assembler {
        Assembler::new()
    }
}

impl Assembler {
    pub fn new() -> Assembler {
        Assembler {
            star: 0,
            line_no: 0,
            ended: false,
            entry: None,
            words: BTreeMap::new(),
            symbols: SymbolTable::new(),
            literals: Vec::new(),
        }
    }

    /// Assemble an entire source.  Lines after END are ignored.
    pub fn assemble<R: BufRead>(input: R) -> Result<Listing, AsmError> {
        let mut asm = Assembler::new();
        for line in input.lines() {
            let line = line.map_err(|e| AsmError::io("reading source", e))?;
            asm.assemble_line(&line)?;
            if asm.ended {
                break;
            }
        }
        asm.finish()
    }

    pub fn assemble_str(source: &str) -> Result<Listing, AsmError> {
        Assembler::assemble(source.as_bytes())
    }

    pub fn finish(self) -> Result<Listing, AsmError> {
        if !self.ended {
            return Err(AsmError::MissingEnd);
        }
        Ok(Listing {
            words: self.words,
            entry: self.entry,
        })
    }

    /// Assemble one source line.
    pub fn assemble_line(&mut self, line: &str) -> Result<(), AsmError> {
        self.line_no += 1;
        if self.ended || line.is_empty() || line.starts_with('*') {
            return Ok(());
        }
        if line.trim().is_empty() {
            return Ok(());
        }
        if !line.is_ascii() {
            return Err(AsmError::InvalidChar {
                line: self.line_no,
                text: line.to_string(),
            });
        }

        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() && bytes[i] != b' ' {
            i += 1;
        }
        let loc = &line[..i];
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        let op_start = i;
        while i < bytes.len() && bytes[i] != b' ' {
            i += 1;
        }
        let op = &line[op_start..i];
        if op.is_empty() {
            return Err(AsmError::MissingOp { line: self.line_no });
        }

        let addr: String = if op == "ALF" {
            // The five characters begin one space after the opcode,
            // or two when the first character is itself a blank.
            if i < bytes.len() {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b' ' {
                i += 1;
            }
            let raw = &line[i.min(line.len())..];
            let mut field: String = raw.chars().take(5).collect();
            while field.len() < 5 {
                field.push(' ');
            }
            field
        } else {
            while i < bytes.len() && bytes[i] == b' ' {
                i += 1;
            }
            let addr_start = i;
            while i < bytes.len() && bytes[i] != b' ' {
                i += 1;
            }
            // Anything after the address field is a remark.
            line[addr_start..i].to_string()
        };

        event!(
            Level::TRACE,
            "line {}: loc={:?} op={:?} addr={:?}",
            self.line_no,
            loc,
            op,
            addr
        );

        match op {
            "EQU" => {
                let value = self.eval_w(&addr)?.value();
                if loc.is_empty() {
                    return Err(AsmError::MissingLocation { line: self.line_no });
                }
                self.define_location(loc, value)
            }
            "ORIG" => {
                if !loc.is_empty() {
                    self.define_location(loc, self.star)?;
                }
                let target = self.eval_w(&addr)?.value();
                if !(0..=MEM_SIZE).contains(&target) {
                    return Err(AsmError::StarOutOfRange {
                        line: self.line_no,
                        value: target,
                    });
                }
                self.star = target;
                Ok(())
            }
            "CON" => {
                if !loc.is_empty() {
                    self.define_location(loc, self.star)?;
                }
                let w = self.eval_w(&addr)?;
                self.emit(w)
            }
            "ALF" => {
                if !loc.is_empty() {
                    self.define_location(loc, self.star)?;
                }
                let mut packed = [0u8; 5];
                for (slot, ch) in packed.iter_mut().zip(addr.chars()) {
                    *slot = charset::to_byte(ch).ok_or(AsmError::UnmappableChar {
                        line: self.line_no,
                        ch,
                    })?;
                }
                self.emit(Word::from_bytes(Sign::Plus, packed))
            }
            "END" => {
                if !loc.is_empty() {
                    self.define_location(loc, self.star)?;
                }
                let entry = self.eval_w(&addr)?.value();
                if !(0..MEM_SIZE).contains(&entry) {
                    return Err(AsmError::StarOutOfRange {
                        line: self.line_no,
                        value: entry,
                    });
                }
                self.entry = Some(entry as u16);
                self.resolve_trailers()?;
                self.ended = true;
                Ok(())
            }
            _ => self.assemble_instruction(loc, op, &addr),
        }
    }

    fn assemble_instruction(&mut self, loc: &str, op: &str, addr: &str) -> Result<(), AsmError> {
        let (c, default_f) = optable::lookup(op).ok_or_else(|| AsmError::UnknownOp {
            line: self.line_no,
            op: op.to_string(),
        })?;
        if !loc.is_empty() {
            self.define_location(loc, self.star)?;
        }

        let tokens = self.tokenize(addr)?;
        let parsed = {
            let ctx = self.ctx();
            parser::parse_address_field(&tokens, &ctx)?
        };

        let f = parsed.field.unwrap_or(i64::from(default_f));
        if !(0..=63).contains(&f) {
            return Err(AsmError::BadField {
                line: self.line_no,
                field: f,
            });
        }
        if !(0..=63).contains(&parsed.index) {
            return Err(AsmError::BadExpression {
                line: self.line_no,
                reason: format!("index {} does not fit in a byte", parsed.index),
            });
        }

        let site = self.site()?;
        let a = match parsed.a {
            APart::Empty => 0,
            APart::Value(v) => {
                if v.abs() > ADDR_MAX {
                    return Err(AsmError::AddressTooLarge {
                        line: self.line_no,
                        value: v,
                    });
                }
                v
            }
            APart::Literal(value) => {
                let name = format!("*LIT{}", self.literals.len());
                self.literals.push((name.clone(), value));
                self.symbols.forward_global(&name, site);
                0
            }
            APart::ForwardGlobal(name) => {
                self.symbols.forward_global(&name, site);
                0
            }
            APart::ForwardLocal(digit) => {
                self.symbols.forward_local(digit, site);
                0
            }
        };

        self.emit(Instruction::build(a, parsed.index as u8, f as u8, c))
    }

    /// Synthesize definitions for everything still unresolved at
    /// END: a `CON 0` trailer word per unresolved global, then the
    /// literal constants in order of first use.  Unresolved local
    /// forwards have nothing to resolve to and are an error.
    fn resolve_trailers(&mut self) -> Result<(), AsmError> {
        for name in self.symbols.unresolved_globals() {
            if name.starts_with('*') {
                continue; // a literal, deposited below
            }
            event!(Level::DEBUG, "synthesizing trailer for {}", name);
            self.define_location(&name, self.star)?;
            self.emit(Word::ZERO)?;
        }
        for (name, value) in std::mem::take(&mut self.literals) {
            event!(Level::DEBUG, "depositing literal {} = {}", name, value);
            let sites = self
                .symbols
                .define_global(&name, self.star)
                .expect("literal names cannot collide");
            let here = self.star;
            for s in sites {
                self.patch(s, here)?;
            }
            self.emit(Word::from_value(value).without_overflow())?;
        }
        if let Some(digit) = self.symbols.first_unresolved_local() {
            return Err(AsmError::UndefinedLocal { digit });
        }
        Ok(())
    }

    /// Define the LOC field of a line (or a trailer symbol) and
    /// rewrite every instruction that was waiting for it.
    fn define_location(&mut self, loc: &str, value: i64) -> Result<(), AsmError> {
        let sites = match self.classify_location(loc)? {
            SymbolRef::Global(name) => self.symbols.define_global(&name, value).map_err(|()| {
                AsmError::DuplicateSymbol {
                    line: self.line_no,
                    symbol: name.clone(),
                }
            })?,
            SymbolRef::LocalDef(digit) => self.symbols.define_local(digit, value),
            SymbolRef::LocalBack(_) | SymbolRef::LocalForward(_) => {
                return Err(AsmError::LocalMisuse {
                    line: self.line_no,
                    symbol: loc.to_string(),
                });
            }
        };
        for site in sites {
            self.patch(site, value)?;
        }
        Ok(())
    }

    fn classify_location(&self, loc: &str) -> Result<SymbolRef, AsmError> {
        // Trailer symbols are driver-made and bypass spelling rules.
        if loc.starts_with('*') {
            return Ok(SymbolRef::Global(loc.to_string()));
        }
        let well_formed = loc.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
            && loc.bytes().any(|b| b.is_ascii_uppercase());
        if !well_formed {
            return Err(AsmError::BadSymbol {
                line: self.line_no,
                symbol: loc.to_string(),
            });
        }
        Ok(classify(loc))
    }

    /// Rewrite the A-field of an already-emitted word.
    fn patch(&mut self, site: u16, value: i64) -> Result<(), AsmError> {
        if value.abs() > ADDR_MAX {
            return Err(AsmError::AddressTooLarge {
                line: self.line_no,
                value,
            });
        }
        let old = self.words[&site];
        let new = old
            .with_field(Word::from_value(value), FieldSpec::ADDRESS)
            .without_overflow();
        event!(Level::TRACE, "patching {:04}: {} -> {}", site, old, new);
        self.words.insert(site, new);
        Ok(())
    }

    fn emit(&mut self, w: Word) -> Result<(), AsmError> {
        let site = self.site()?;
        self.words.insert(site, w);
        self.star += 1;
        Ok(())
    }

    /// The current location counter as an assembled address.
    fn site(&self) -> Result<u16, AsmError> {
        if (0..MEM_SIZE).contains(&self.star) {
            Ok(self.star as u16)
        } else {
            Err(AsmError::StarOutOfRange {
                line: self.line_no,
                value: self.star,
            })
        }
    }

    fn tokenize(&self, text: &str) -> Result<Vec<lexer::Token>, AsmError> {
        lexer::tokenize(text).map_err(|bad| AsmError::InvalidChar {
            line: self.line_no,
            text: bad,
        })
    }

    fn eval_w(&self, addr: &str) -> Result<Word, AsmError> {
        let tokens = self.tokenize(addr)?;
        let ctx = self.ctx();
        parser::eval_wvalue(&tokens, &ctx)
    }

    fn ctx(&self) -> EvalContext<'_> {
        EvalContext {
            symbols: &self.symbols,
            star: self.star,
            line: self.line_no,
        }
    }
}
