//! The core image: registers, flags, and the 4000 words of memory,
//! in the fixed layout shared by the in-memory machine and the
//! mmap-backed core file.
//!
//! The layout is `repr(C)` and contains nothing but 32-bit cells, so
//! a core file can be inspected or edited with a hex viewer: nine
//! register words, two flag cells, five words of padding, and then
//! memory starting at byte offset 64.

use std::io::{self, BufRead, Write};
use std::str::FromStr;

use tracing::{event, Level};

use base::prelude::*;

/// Number of memory words.
pub const MEM_SIZE: usize = 4000;

/// The overflow flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowFlag {
    Off,
    On,
}

/// The comparison indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
}

/// The machine state that lives in the core file.
///
/// The flag cells are stored as raw `u32` rather than Rust enums so
/// that an image edited from outside can never hold an invalid enum
/// value; out-of-range cells read as `Off`/`Equal`.
#[repr(C)]
pub struct CoreImage {
    pub a: Word,
    pub x: Word,
    pub i: [Word; 6],
    pub j: Word,
    overflow: u32,
    comp: u32,
    pad: [Word; 5],
    pub memory: [Word; MEM_SIZE],
}

impl CoreImage {
    pub fn new() -> CoreImage {
        CoreImage {
            a: Word::ZERO,
            x: Word::ZERO,
            i: [Word::ZERO; 6],
            j: Word::ZERO,
            overflow: 0,
            comp: 0,
            pad: [Word::ZERO; 5],
            memory: [Word::ZERO; MEM_SIZE],
        }
    }

    /// Wipe all registers, flags, and memory to `+0`.
    pub fn clean(&mut self) {
        *self = CoreImage::new();
    }

    pub fn overflow(&self) -> OverflowFlag {
        if self.overflow == 1 {
            OverflowFlag::On
        } else {
            OverflowFlag::Off
        }
    }

    pub fn set_overflow(&mut self, flag: OverflowFlag) {
        self.overflow = match flag {
            OverflowFlag::Off => 0,
            OverflowFlag::On => 1,
        };
    }

    /// A zeroed cell reads as `Equal`, so a fresh image starts with a
    /// neutral indicator.
    pub fn comparison(&self) -> Comparison {
        match self.comp {
            1 => Comparison::Less,
            2 => Comparison::Greater,
            _ => Comparison::Equal,
        }
    }

    pub fn set_comparison(&mut self, c: Comparison) {
        self.comp = match c {
            Comparison::Equal => 0,
            Comparison::Less => 1,
            Comparison::Greater => 2,
        };
    }

    /// The register named by a family opcode's `C mod 8`.
    pub fn reg(&self, r: Register) -> Word {
        match r {
            Register::A => self.a,
            Register::X => self.x,
            Register::I(n) => self.i[usize::from(n) - 1],
        }
    }

    pub fn set_reg(&mut self, r: Register, w: Word) {
        match r {
            Register::A => self.a = w,
            Register::X => self.x = w,
            Register::I(n) => self.i[usize::from(n) - 1] = w,
        }
    }

    /// Write the textual listing: registers, then every memory word
    /// that is not `+0`, sorted by address.
    pub fn write_listing<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "A: {}", self.a)?;
        writeln!(out, "X: {}", self.x)?;
        for n in 1..=6 {
            writeln!(out, "I[{}]: {}", n, self.i[n - 1])?;
        }
        writeln!(out, "J: {}", self.j)?;
        for (addr, w) in self.memory.iter().enumerate() {
            if *w != Word::ZERO {
                writeln!(out, "{:04}: {}", addr, w)?;
            }
        }
        Ok(())
    }

    /// Apply a textual listing onto this image.  Invalid lines are
    /// skipped.  Returns how many lines were applied and the entry
    /// point if the listing carried a `PC:` line.
    pub fn load_listing<R: BufRead>(&mut self, input: R) -> io::Result<LoadSummary> {
        let mut summary = LoadSummary {
            words: 0,
            entry: None,
        };
        for (lineno, line) in input.lines().enumerate() {
            let line = line?;
            match parse_listing_line(&line) {
                Some(ListingLine::Reg(r, w)) => {
                    self.set_reg(r, w);
                    summary.words += 1;
                }
                Some(ListingLine::J(w)) => {
                    self.j = w;
                    summary.words += 1;
                }
                Some(ListingLine::Mem(addr, w)) => {
                    self.memory[addr] = w;
                    summary.words += 1;
                }
                Some(ListingLine::Pc(pc)) => {
                    summary.entry = Some(pc);
                }
                None => {
                    if !line.trim().is_empty() {
                        event!(
                            Level::DEBUG,
                            "skipping unparseable listing line {}: {:?}",
                            lineno + 1,
                            line
                        );
                    }
                }
            }
        }
        Ok(summary)
    }
}

impl Default for CoreImage {
    fn default() -> CoreImage {
        CoreImage::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Lines applied (register and memory words).
    pub words: usize,
    /// The `PC:` entry point, if present.
    pub entry: Option<u16>,
}

enum ListingLine {
    Reg(Register, Word),
    J(Word),
    Mem(usize, Word),
    Pc(u16),
}

fn parse_listing_line(line: &str) -> Option<ListingLine> {
    let (label, rest) = line.split_once(':')?;
    let label = label.trim();
    let rest = rest.trim();
    if label == "PC" {
        let pc = rest.parse::<u16>().ok()?;
        if usize::from(pc) < MEM_SIZE {
            return Some(ListingLine::Pc(pc));
        }
        return None;
    }
    let w = Word::from_str(rest).ok()?;
    match label {
        "A" => Some(ListingLine::Reg(Register::A, w)),
        "X" => Some(ListingLine::Reg(Register::X, w)),
        "J" => Some(ListingLine::J(w)),
        _ => {
            if let Some(n) = label.strip_prefix("I[").and_then(|s| s.strip_suffix(']')) {
                let n = n.parse::<u8>().ok()?;
                if (1..=6).contains(&n) {
                    return Some(ListingLine::Reg(Register::I(n), w));
                }
                return None;
            }
            let addr = label.parse::<usize>().ok()?;
            if addr < MEM_SIZE {
                Some(ListingLine::Mem(addr, w))
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::word;

    #[test]
    fn image_layout_is_stable() {
        // 9 register words + 2 flag cells + 5 pad words + 4000 memory
        // words, 4 bytes each; memory begins at byte offset 64.
        assert_eq!(std::mem::size_of::<CoreImage>(), 4016 * 4);
        assert_eq!(std::mem::offset_of!(CoreImage, memory), 64);
    }

    #[test]
    fn clean_wipes_everything() {
        let mut core = CoreImage::new();
        core.a = word!(- 1, 2, 3, 4, 5);
        core.memory[123] = Word::from_value(9);
        core.set_overflow(OverflowFlag::On);
        core.clean();
        assert_eq!(core.a, Word::ZERO);
        assert_eq!(core.memory[123], Word::ZERO);
        assert_eq!(core.overflow(), OverflowFlag::Off);
        assert_eq!(core.comparison(), Comparison::Equal);
    }

    #[test]
    fn flags_tolerate_foreign_bits() {
        let mut core = CoreImage::new();
        core.overflow = 77;
        core.comp = 99;
        assert_eq!(core.overflow(), OverflowFlag::Off);
        assert_eq!(core.comparison(), Comparison::Equal);
    }

    #[test]
    fn listing_round_trip() {
        let mut core = CoreImage::new();
        core.a = word!(- 1, 2, 3, 4, 5);
        core.x = Word::from_value(77);
        core.i[2] = Word::from_value(1003);
        core.j = Word::from_value(3002);
        core.memory[0] = Word::from_value(42);
        core.memory[3999] = word!(- 0, 0, 0, 0, 0); // -0 must survive
        let mut text = Vec::new();
        core.write_listing(&mut text).unwrap();

        let mut reloaded = CoreImage::new();
        let summary = reloaded.load_listing(&text[..]).unwrap();
        assert_eq!(summary.entry, None);
        assert_eq!(reloaded.a, core.a);
        assert_eq!(reloaded.x, core.x);
        assert_eq!(reloaded.i[2], core.i[2]);
        assert_eq!(reloaded.j, core.j);
        assert_eq!(reloaded.memory[0], core.memory[0]);
        assert_eq!(reloaded.memory[3999], core.memory[3999]);

        // Idempotence: dumping the reloaded image reproduces the text.
        let mut text2 = Vec::new();
        reloaded.write_listing(&mut text2).unwrap();
        assert_eq!(text, text2);
    }

    #[test]
    fn loader_skips_garbage_and_reads_pc() {
        let listing = "\
0001: + 00 00 00 00 08
this line is noise
4000: + 00 00 00 00 01
0002: * 00 00 00 00 01
PC: 0001
";
        let mut core = CoreImage::new();
        let summary = core.load_listing(listing.as_bytes()).unwrap();
        assert_eq!(summary.words, 1);
        assert_eq!(summary.entry, Some(1));
        assert_eq!(core.memory[1], Word::from_value(8));
    }
}
