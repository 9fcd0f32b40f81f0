//! Symbol tables: global symbols, the ten local symbols, and the
//! forward references awaiting each.
//!
//! A forward reference is recorded as the address of the instruction
//! whose A-field needs rewriting once the symbol is defined.  The
//! driver owns the assembled words, so definition hands the recorded
//! patch sites back to it rather than rewriting here.

use std::collections::{BTreeMap, HashMap};

use tracing::{event, Level};

/// How a symbol occurrence reads, by its spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolRef {
    Global(String),
    /// `nH`: defines local `n` here.  Only valid as a location.
    LocalDef(u8),
    /// `nB`: the most recent `nH`.
    LocalBack(u8),
    /// `nF`: the next `nH`.
    LocalForward(u8),
}

/// Classify a symex that is known to contain at least one letter.
pub fn classify(text: &str) -> SymbolRef {
    let bytes = text.as_bytes();
    if bytes.len() == 2 && bytes[0].is_ascii_digit() {
        let digit = bytes[0] - b'0';
        match bytes[1] {
            b'H' => return SymbolRef::LocalDef(digit),
            b'B' => return SymbolRef::LocalBack(digit),
            b'F' => return SymbolRef::LocalForward(digit),
            _ => {}
        }
    }
    SymbolRef::Global(text.to_string())
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    globals: HashMap<String, i64>,
    locals: [Option<i64>; 10],
    // BTreeMap so END's trailer words come out in a stable order.
    forward_globals: BTreeMap<String, Vec<u16>>,
    forward_locals: [Vec<u16>; 10],
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    pub fn lookup_global(&self, name: &str) -> Option<i64> {
        self.globals.get(name).copied()
    }

    pub fn lookup_local_back(&self, digit: u8) -> Option<i64> {
        self.locals[usize::from(digit)]
    }

    /// Define a global symbol.  Fails if it is already defined.  On
    /// success, returns the forward-reference sites now resolved.
    pub fn define_global(&mut self, name: &str, value: i64) -> Result<Vec<u16>, ()> {
        if self.globals.contains_key(name) {
            return Err(());
        }
        event!(Level::DEBUG, "defining {} = {}", name, value);
        self.globals.insert(name.to_string(), value);
        Ok(self.forward_globals.remove(name).unwrap_or_default())
    }

    /// Define local `digit` here.  Redefinition is the point of local
    /// symbols; the previous value simply stops being reachable.
    pub fn define_local(&mut self, digit: u8, value: i64) -> Vec<u16> {
        event!(Level::DEBUG, "defining {}H = {}", digit, value);
        self.locals[usize::from(digit)] = Some(value);
        std::mem::take(&mut self.forward_locals[usize::from(digit)])
    }

    pub fn forward_global(&mut self, name: &str, site: u16) {
        self.forward_globals
            .entry(name.to_string())
            .or_default()
            .push(site);
    }

    pub fn forward_local(&mut self, digit: u8, site: u16) {
        self.forward_locals[usize::from(digit)].push(site);
    }

    /// Global symbols still awaiting definition, in stable order.
    pub fn unresolved_globals(&self) -> Vec<String> {
        self.forward_globals.keys().cloned().collect()
    }

    /// The first local digit with dangling forward references, if
    /// any.  Unlike globals these cannot be synthesized at END.
    pub fn first_unresolved_local(&self) -> Option<u8> {
        self.forward_locals
            .iter()
            .position(|sites| !sites.is_empty())
            .map(|d| d as u8)
    }
}
