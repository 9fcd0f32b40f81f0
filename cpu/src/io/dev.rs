//! The peripheral devices: 21 file-backed units with fixed block
//! sizes, formats, and latencies.
//!
//! Binary devices (tapes and disks) store words in the same native
//! 32-bit layout as the core image.  Character and card devices store
//! one line of table characters per block.  Fixed-size devices are
//! truncated to their full length on open so that block reads never
//! run off the end of the file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{event, Level};

use base::prelude::*;

use crate::fault::Fault;

/// Number of peripheral units.
pub const NUM_DEVICES: usize = 21;

/// Latency divisor applied when a disk operation needs no head
/// movement (register X already equals the head position).
pub const DISK_SEEK_FACTOR: i64 = 10;

const WORD_BYTES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Tape,
    Disk,
    CardReader,
    CardPunch,
    LinePrinter,
    Terminal,
    PaperTape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFormat {
    Binary,
    Char,
    Card,
}

/// The static properties of a unit.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSpec {
    pub kind: DeviceKind,
    pub format: BlockFormat,
    /// Words per block.
    pub block_words: usize,
    /// Block count for fixed-size devices; `None` for streams.
    pub blocks: Option<i64>,
    pub input: bool,
    pub output: bool,
    /// Ticks from issue until the transfer touches memory.
    pub time_to_do_io: i64,
    /// Ticks from issue until the device is free again.
    pub time_to_finish: i64,
}

impl DeviceSpec {
    pub fn for_unit(unit: usize) -> DeviceSpec {
        use BlockFormat::*;
        use DeviceKind::*;
        match unit {
            0..=7 => DeviceSpec {
                kind: Tape,
                format: Binary,
                block_words: 100,
                blocks: Some(100),
                input: true,
                output: true,
                time_to_do_io: 2500,
                time_to_finish: 5000,
            },
            8..=15 => DeviceSpec {
                kind: Disk,
                format: Binary,
                block_words: 100,
                blocks: Some(100),
                input: true,
                output: true,
                time_to_do_io: 5000,
                time_to_finish: 10000,
            },
            16 => DeviceSpec {
                kind: CardReader,
                format: Card,
                block_words: 16,
                blocks: None,
                input: true,
                output: false,
                time_to_do_io: 5000,
                time_to_finish: 10000,
            },
            17 => DeviceSpec {
                kind: CardPunch,
                format: Card,
                block_words: 16,
                blocks: None,
                input: false,
                output: true,
                time_to_do_io: 10000,
                time_to_finish: 20000,
            },
            18 => DeviceSpec {
                kind: LinePrinter,
                format: Char,
                block_words: 24,
                blocks: None,
                input: false,
                output: true,
                // Fixed by the timing contract of the simulator: a
                // print issued at t transfers at t+3750 and frees the
                // printer at t+7500.
                time_to_do_io: 3750,
                time_to_finish: 7500,
            },
            19 => DeviceSpec {
                kind: Terminal,
                format: Char,
                block_words: 14,
                blocks: None,
                input: true,
                output: true,
                time_to_do_io: 3750,
                time_to_finish: 7500,
            },
            20 => DeviceSpec {
                kind: PaperTape,
                format: Char,
                block_words: 14,
                blocks: Some(1000),
                input: true,
                output: true,
                time_to_do_io: 5000,
                time_to_finish: 10000,
            },
            _ => panic!("unit {} out of range", unit),
        }
    }

    pub fn file_name(unit: usize) -> String {
        match DeviceSpec::for_unit(unit).kind {
            DeviceKind::Tape => format!("t{}", unit),
            DeviceKind::Disk => format!("d{}", unit - 8),
            DeviceKind::CardReader => "cr0".to_string(),
            DeviceKind::CardPunch => "cp0".to_string(),
            DeviceKind::LinePrinter => "lp0".to_string(),
            DeviceKind::Terminal => "term0".to_string(),
            DeviceKind::PaperTape => "pt0".to_string(),
        }
    }

    /// Characters per line for character/card formats.
    fn line_width(&self) -> usize {
        self.block_words * 5
    }
}

/// One peripheral unit and its backing file.
pub struct Device {
    unit: usize,
    spec: DeviceSpec,
    file: File,
    /// Next block for sequentially-positioned devices (tape, paper
    /// tape); head position for disks; unused for plain streams.
    pos: i64,
    /// Byte offset of the next sequential character read, for stream
    /// input devices.  Kept separately because output appends move
    /// the shared file cursor.
    read_offset: u64,
}

impl Device {
    pub fn open(unit: usize, dir: &Path) -> Result<Device, Fault> {
        let spec = DeviceSpec::for_unit(unit);
        let path = dir.join(DeviceSpec::file_name(unit));
        let context = || format!("device file {}", path.display());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| Fault::host(context(), e))?;
        if spec.format == BlockFormat::Binary {
            if let Some(blocks) = spec.blocks {
                let len = (blocks as u64) * (spec.block_words * WORD_BYTES) as u64;
                file.set_len(len).map_err(|e| Fault::host(context(), e))?;
            }
        }
        event!(Level::TRACE, "unit {} backed by {}", unit, path.display());
        Ok(Device {
            unit,
            spec,
            file,
            pos: 0,
            read_offset: 0,
        })
    }

    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    /// The logical position: block index for tapes and paper tape,
    /// head position for disks.
    pub fn pos(&self) -> i64 {
        self.pos
    }

    pub fn set_pos(&mut self, pos: i64) {
        self.pos = pos;
    }

    pub fn advance(&mut self) {
        self.pos += 1;
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
        self.read_offset = 0;
    }

    fn host_err(&self, e: std::io::Error) -> Fault {
        Fault::host(format!("unit {}", self.unit), e)
    }

    /// Read one block from the device into `dest`
    /// (`dest.len() == block_words`).  `block` selects a block for
    /// random-access and positioned devices; `None` reads the next
    /// line of a stream.
    pub fn read_block(&mut self, block: Option<i64>, dest: &mut [Word]) -> Result<(), Fault> {
        match self.spec.format {
            BlockFormat::Binary => self.read_words(block.unwrap_or(0), dest),
            BlockFormat::Char | BlockFormat::Card => self.read_line(block, dest),
        }
    }

    /// Write one block from `src` to the device.
    pub fn write_block(&mut self, block: Option<i64>, src: &[Word]) -> Result<(), Fault> {
        match self.spec.format {
            BlockFormat::Binary => self.write_words(block.unwrap_or(0), src),
            BlockFormat::Char | BlockFormat::Card => self.write_line(block, src),
        }
    }

    fn read_words(&mut self, block: i64, dest: &mut [Word]) -> Result<(), Fault> {
        let offset = (block as u64) * (self.spec.block_words * WORD_BYTES) as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| self.host_err(e))?;
        for w in dest.iter_mut() {
            let mut bytes = [0u8; WORD_BYTES];
            self.file
                .read_exact(&mut bytes)
                .map_err(|e| self.host_err(e))?;
            *w = raw_word(bytes);
        }
        Ok(())
    }

    fn write_words(&mut self, block: i64, src: &[Word]) -> Result<(), Fault> {
        let offset = (block as u64) * (self.spec.block_words * WORD_BYTES) as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| self.host_err(e))?;
        for w in src {
            self.file
                .write_all(&raw_bytes(*w))
                .map_err(|e| self.host_err(e))?;
        }
        Ok(())
    }

    fn read_line(&mut self, block: Option<i64>, dest: &mut [Word]) -> Result<(), Fault> {
        let width = self.spec.line_width();
        match block {
            Some(b) => {
                // Positioned character device: fixed-width lines.
                let offset = (b as u64) * (width as u64 + 1);
                self.file
                    .seek(SeekFrom::Start(offset))
                    .map_err(|e| self.host_err(e))?;
            }
            None => {
                self.file
                    .seek(SeekFrom::Start(self.read_offset))
                    .map_err(|e| self.host_err(e))?;
            }
        }
        let line = match self.next_line()? {
            Some(line) => line,
            None => return Err(Fault::OutOfData { unit: self.unit as u8 }),
        };
        if block.is_none() {
            self.read_offset = self
                .file
                .stream_position()
                .map_err(|e| self.host_err(e))?;
        }
        let mut chars = line.chars();
        for w in dest.iter_mut() {
            let mut bytes = [0u8; 5];
            for b in bytes.iter_mut() {
                let ch = chars.next().unwrap_or(' ');
                *b = charset::to_byte(ch).ok_or(Fault::Untranslatable {
                    unit: self.unit as u8,
                    ch,
                })?;
            }
            *w = Word::from_bytes(Sign::Plus, bytes);
        }
        Ok(())
    }

    /// Read up to the next newline (or EOF) from the current file
    /// position.  `None` means there was no data at all.
    fn next_line(&mut self) -> Result<Option<String>, Fault> {
        let mut buf = Vec::new();
        let mut consumed = false;
        let mut byte = [0u8; 1];
        loop {
            let n = self.file.read(&mut byte).map_err(|e| self.host_err(e))?;
            if n == 0 {
                break;
            }
            consumed = true;
            if byte[0] == b'\n' {
                break;
            }
            buf.push(byte[0]);
        }
        if !consumed {
            return Ok(None);
        }
        String::from_utf8(buf)
            .map(Some)
            .map_err(|_| Fault::Untranslatable {
                unit: self.unit as u8,
                ch: '\u{fffd}',
            })
    }

    fn write_line(&mut self, block: Option<i64>, src: &[Word]) -> Result<(), Fault> {
        let mut line = String::with_capacity(self.spec.line_width() + 1);
        for w in src {
            for i in 1..=5 {
                let b = w.byte(i);
                let ch = charset::to_char(b).ok_or(Fault::Unprintable {
                    unit: self.unit as u8,
                    byte: b,
                })?;
                line.push(ch);
            }
        }
        line.push('\n');
        // Positioned character devices overwrite their fixed-width
        // block; streams append.
        let target = match block {
            Some(b) => SeekFrom::Start((b as u64) * (self.spec.line_width() as u64 + 1)),
            None => SeekFrom::End(0),
        };
        self.file.seek(target).map_err(|e| self.host_err(e))?;
        self.file
            .write_all(line.as_bytes())
            .map_err(|e| self.host_err(e))
    }

    /// Page eject on the line printer: a block of 42 newlines.
    pub fn form_feed(&mut self) -> Result<(), Fault> {
        self.file
            .seek(SeekFrom::End(0))
            .map_err(|e| self.host_err(e))?;
        self.file
            .write_all(&[b'\n'; 42])
            .map_err(|e| self.host_err(e))
    }
}

fn raw_word(bytes: [u8; WORD_BYTES]) -> Word {
    word_from_bits(u32::from_ne_bytes(bytes))
}

fn raw_bytes(w: Word) -> [u8; WORD_BYTES] {
    word_to_bits(w).to_ne_bytes()
}

fn word_from_bits(bits: u32) -> Word {
    let sign = if bits & (1 << 30) != 0 {
        Sign::Minus
    } else {
        Sign::Plus
    };
    Word::from_parts(sign, u64::from(bits & ((1 << 30) - 1)))
}

fn word_to_bits(w: Word) -> u32 {
    let mut bits = w.magnitude();
    if w.is_negative() {
        bits |= 1 << 30;
    }
    bits
}
