//! The I/O coprocessor: validation, staging, and completion of
//! device instructions on the shared timeline.
//!
//! A device instruction is validated and *staged* when the CPU
//! executes it; nothing touches memory at that point.  The actual
//! transfer happens at the staged `do_io` timestamp and the device
//! becomes free again at `finish`.  The CPU reads `free_ts` to learn
//! how long a dependent instruction must stall, and the clock reads
//! `next_ts` to jump straight to the next device event.

use std::fmt::{self, Debug, Formatter};
use std::fs;
use std::path::Path;

use tracing::{event, Level};

use base::instruction::opcode;
use base::prelude::*;

use crate::fault::Fault;
use crate::memory::{CoreImage, MEM_SIZE};

pub mod dev;

pub use dev::{Device, DeviceKind, DeviceSpec, DISK_SEEK_FACTOR, NUM_DEVICES};

/// One staged operation.  `do_io` and `finish` are absolute
/// timestamps; a device is busy exactly while `finish` is set, and
/// `do_io` is always within `[now, finish]` for a busy device.
#[derive(Clone, Copy, Default)]
struct InFlight {
    do_io: Option<i64>,
    finish: Option<i64>,
    /// The staged instruction word.
    inst: Word,
    /// The effective address, resolved at issue time.
    addr: i64,
}

pub struct IoCoprocessor {
    devices: Vec<Device>,
    inflight: [InFlight; NUM_DEVICES],
}

impl Debug for IoCoprocessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let busy: Vec<usize> = (0..NUM_DEVICES).filter(|&u| self.is_busy(u)).collect();
        f.debug_struct("IoCoprocessor").field("busy", &busy).finish()
    }
}

impl IoCoprocessor {
    /// Open all 21 devices under `dir`, creating the directory and
    /// any missing backing files.
    pub fn open(dir: &Path) -> Result<IoCoprocessor, Fault> {
        fs::create_dir_all(dir)
            .map_err(|e| Fault::host(format!("device directory {}", dir.display()), e))?;
        let mut devices = Vec::with_capacity(NUM_DEVICES);
        for unit in 0..NUM_DEVICES {
            devices.push(Device::open(unit, dir)?);
        }
        Ok(IoCoprocessor {
            devices,
            inflight: [InFlight::default(); NUM_DEVICES],
        })
    }

    pub fn is_busy(&self, unit: usize) -> bool {
        unit < NUM_DEVICES && self.inflight[unit].finish.is_some()
    }

    /// When the unit becomes free, or `None` if it is already free.
    pub fn free_ts(&self, unit: usize) -> Option<i64> {
        if unit < NUM_DEVICES {
            self.inflight[unit].finish
        } else {
            None
        }
    }

    /// The earliest scheduled device event at or after `now`, if any.
    pub fn next_ts(&self, now: i64) -> Option<i64> {
        self.inflight
            .iter()
            .flat_map(|s| [s.do_io, s.finish])
            .flatten()
            .filter(|&t| t >= now)
            .min()
    }

    /// Validate and stage an IN/OUT/IOC instruction whose effective
    /// address is `m`.  Called by the CPU at issue time.
    pub fn execute(&mut self, w: Word, m: Word, core: &CoreImage, now: i64) -> Result<(), Fault> {
        let inst = Instruction::from_word(w);
        let unit = usize::from(inst.field);
        if unit >= NUM_DEVICES {
            return Err(Fault::BadDevice {
                inst: w,
                unit: inst.field,
            });
        }
        if self.is_busy(unit) {
            return Err(Fault::DeviceBusy {
                unit: inst.field,
                inst: w,
            });
        }
        let mv = m.value();
        let spec = *self.devices[unit].spec();
        match inst.opcode {
            opcode::IN | opcode::OUT => {
                let op = if inst.opcode == opcode::IN {
                    "input"
                } else {
                    "output"
                };
                let supported = if inst.opcode == opcode::IN {
                    spec.input
                } else {
                    spec.output
                };
                if !supported {
                    return Err(Fault::Unsupported {
                        unit: inst.field,
                        op,
                    });
                }
                if mv < 0 || mv + spec.block_words as i64 > MEM_SIZE as i64 {
                    return Err(Fault::BadAddress {
                        inst: w,
                        address: mv,
                    });
                }
                match spec.kind {
                    DeviceKind::Disk => self.check_disk_block(unit, core)?,
                    DeviceKind::Tape | DeviceKind::PaperTape => {
                        let pos = self.devices[unit].pos();
                        if pos >= spec.blocks.unwrap_or(i64::MAX) {
                            return Err(Fault::BadBlock {
                                unit: inst.field,
                                block: pos,
                            });
                        }
                    }
                    _ => {}
                }
            }
            opcode::IOC => match spec.kind {
                DeviceKind::Tape => {
                    if mv != 0 {
                        let target = self.devices[unit].pos() + mv;
                        if target < 0 || target >= spec.blocks.unwrap_or(i64::MAX) {
                            return Err(Fault::BadBlock {
                                unit: inst.field,
                                block: target,
                            });
                        }
                    }
                }
                DeviceKind::Disk => {
                    if mv != 0 {
                        return Err(Fault::BadAddress {
                            inst: w,
                            address: mv,
                        });
                    }
                    self.check_disk_block(unit, core)?;
                }
                DeviceKind::LinePrinter | DeviceKind::PaperTape => {
                    if mv != 0 {
                        return Err(Fault::BadAddress {
                            inst: w,
                            address: mv,
                        });
                    }
                }
                _ => {
                    return Err(Fault::Unsupported {
                        unit: inst.field,
                        op: "control operations",
                    });
                }
            },
            c => panic!("opcode {} is not an I/O coprocessor instruction", c),
        }

        let mut do_io = spec.time_to_do_io;
        let mut finish = spec.time_to_finish;
        if spec.kind == DeviceKind::Disk && core.x.value() == self.devices[unit].pos() {
            do_io /= DISK_SEEK_FACTOR;
            finish /= DISK_SEEK_FACTOR;
        }
        self.inflight[unit] = InFlight {
            do_io: Some(now + do_io),
            finish: Some(now + finish),
            inst: w,
            addr: mv,
        };
        event!(
            Level::DEBUG,
            "unit {} staged {} at {}: transfer at {}, free at {}",
            unit,
            w,
            now,
            now + do_io,
            now + finish
        );
        Ok(())
    }

    fn check_disk_block(&self, unit: usize, core: &CoreImage) -> Result<(), Fault> {
        let block = core.x.value();
        let blocks = self.devices[unit].spec().blocks.unwrap_or(i64::MAX);
        if block < 0 || block >= blocks {
            Err(Fault::BadBlock {
                unit: unit as u8,
                block,
            })
        } else {
            Ok(())
        }
    }

    /// Advance the device population to timestamp `now`: perform any
    /// transfer scheduled for this instant, then release any device
    /// whose operation finishes now.
    pub fn tick(&mut self, core: &mut CoreImage, now: i64) -> Result<(), Fault> {
        for unit in 0..NUM_DEVICES {
            if self.inflight[unit].do_io == Some(now) {
                self.transfer(unit, core)?;
                self.inflight[unit].do_io = None;
            }
            if self.inflight[unit].finish == Some(now) {
                self.inflight[unit] = InFlight::default();
                event!(Level::DEBUG, "unit {} free at {}", unit, now);
            }
        }
        Ok(())
    }

    /// The memory transfer (or control action) of the staged
    /// instruction on `unit`.
    fn transfer(&mut self, unit: usize, core: &mut CoreImage) -> Result<(), Fault> {
        let staged = self.inflight[unit];
        let inst = Instruction::from_word(staged.inst);
        let spec = *self.devices[unit].spec();
        let dev = &mut self.devices[unit];
        match inst.opcode {
            opcode::IN => {
                let block = match spec.kind {
                    DeviceKind::Disk => Some(disk_block(unit, dev, core)?),
                    DeviceKind::Tape | DeviceKind::PaperTape => Some(dev.pos()),
                    _ => None,
                };
                let addr = staged.addr as usize;
                dev.read_block(block, &mut core.memory[addr..addr + spec.block_words])?;
                after_transfer(&spec, dev, block);
                event!(Level::TRACE, "unit {} read block into {}", unit, addr);
            }
            opcode::OUT => {
                let block = match spec.kind {
                    DeviceKind::Disk => Some(disk_block(unit, dev, core)?),
                    DeviceKind::Tape | DeviceKind::PaperTape => Some(dev.pos()),
                    _ => None,
                };
                let addr = staged.addr as usize;
                dev.write_block(block, &core.memory[addr..addr + spec.block_words])?;
                after_transfer(&spec, dev, block);
                event!(Level::TRACE, "unit {} wrote block from {}", unit, addr);
            }
            opcode::IOC => match spec.kind {
                DeviceKind::Tape => {
                    if staged.addr == 0 {
                        dev.rewind();
                    } else {
                        dev.set_pos(dev.pos() + staged.addr);
                    }
                }
                DeviceKind::Disk => {
                    let block = disk_block(unit, dev, core)?;
                    dev.set_pos(block);
                }
                DeviceKind::LinePrinter => dev.form_feed()?,
                DeviceKind::PaperTape => dev.rewind(),
                _ => {}
            },
            c => panic!("staged opcode {} is not an I/O instruction", c),
        }
        Ok(())
    }
}

/// Positions move with the medium: sequential devices step to the
/// next block, a disk head stays on the block it just touched.
fn after_transfer(spec: &DeviceSpec, dev: &mut Device, block: Option<i64>) {
    match spec.kind {
        DeviceKind::Tape | DeviceKind::PaperTape => dev.advance(),
        DeviceKind::Disk => {
            if let Some(b) = block {
                dev.set_pos(b);
            }
        }
        _ => {}
    }
}

/// The disk block number, read from register X at transfer time and
/// re-checked: the program may have clobbered X since issue.
fn disk_block(unit: usize, dev: &Device, core: &CoreImage) -> Result<i64, Fault> {
    let block = core.x.value();
    let blocks = dev.spec().blocks.unwrap_or(i64::MAX);
    if block < 0 || block >= blocks {
        Err(Fault::BadBlock {
            unit: unit as u8,
            block,
        })
    } else {
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::word;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mix-io-test-{}-{}",
            std::process::id(),
            name
        ));
        // A stale directory from an interrupted run would make the
        // fixed-size devices appear pre-written.
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn io_inst(c: u8, m: i64, unit: u8) -> Word {
        Instruction::build(m, 0, unit, c)
    }

    #[test]
    fn out_stages_and_transfers_on_schedule() {
        let dir = scratch_dir("printer");
        let mut io = IoCoprocessor::open(&dir).unwrap();
        let mut core = CoreImage::new();
        // "HELLO" followed by blanks.
        core.memory[100] = word!(+ 8, 5, 13, 13, 16);
        let w = io_inst(opcode::OUT, 100, 18);
        io.execute(w, Word::from_value(100), &core, 0).unwrap();
        assert!(io.is_busy(18));
        assert_eq!(io.free_ts(18), Some(7500));
        assert_eq!(io.next_ts(0), Some(3750));

        // Nothing on disk until the transfer instant.
        io.tick(&mut core, 1).unwrap();
        assert_eq!(std::fs::read(dir.join("lp0")).unwrap(), Vec::<u8>::new());

        io.tick(&mut core, 3750).unwrap();
        let printed = String::from_utf8(std::fs::read(dir.join("lp0")).unwrap()).unwrap();
        assert!(printed.starts_with("HELLO"));
        assert_eq!(printed.len(), 24 * 5 + 1);
        assert!(io.is_busy(18), "busy until finish even after transfer");
        assert_eq!(io.next_ts(3751), Some(7500));

        io.tick(&mut core, 7500).unwrap();
        assert!(!io.is_busy(18));
        assert_eq!(io.next_ts(7501), None);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn busy_device_rejects_new_work() {
        let dir = scratch_dir("busy");
        let mut io = IoCoprocessor::open(&dir).unwrap();
        let core = CoreImage::new();
        let w = io_inst(opcode::OUT, 0, 18);
        io.execute(w, Word::ZERO, &core, 0).unwrap();
        match io.execute(w, Word::ZERO, &core, 1) {
            Err(Fault::DeviceBusy { unit: 18, .. }) => {}
            other => panic!("expected DeviceBusy, got {:?}", other.map(|_| ())),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn tape_blocks_round_trip_and_advance() {
        let dir = scratch_dir("tape");
        let mut io = IoCoprocessor::open(&dir).unwrap();
        let mut core = CoreImage::new();
        for k in 0..100 {
            core.memory[200 + k] = Word::from_value(k as i64 - 50);
        }
        io.execute(io_inst(opcode::OUT, 200, 3), Word::from_value(200), &core, 0)
            .unwrap();
        io.tick(&mut core, 2500).unwrap();
        io.tick(&mut core, 5000).unwrap();

        // Rewind, then read the block back to a different address.
        io.execute(io_inst(opcode::IOC, 0, 3), Word::ZERO, &core, 5001)
            .unwrap();
        io.tick(&mut core, 7501).unwrap();
        io.tick(&mut core, 10001).unwrap();
        io.execute(io_inst(opcode::IN, 1000, 3), Word::from_value(1000), &core, 10002)
            .unwrap();
        io.tick(&mut core, 12502).unwrap();
        io.tick(&mut core, 15002).unwrap();
        for k in 0..100 {
            assert_eq!(core.memory[1000 + k], core.memory[200 + k], "word {}", k);
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn disk_seek_factor_applies_when_head_is_in_place() {
        let dir = scratch_dir("disk");
        let mut io = IoCoprocessor::open(&dir).unwrap();
        let mut core = CoreImage::new();
        core.x = Word::from_value(0); // head starts at 0
        io.execute(io_inst(opcode::OUT, 0, 8), Word::ZERO, &core, 0)
            .unwrap();
        assert_eq!(io.free_ts(8), Some(1000), "10000 / DISK_SEEK_FACTOR");
        io.tick(&mut core, 500).unwrap();
        io.tick(&mut core, 1000).unwrap();

        core.x = Word::from_value(57);
        io.execute(io_inst(opcode::OUT, 0, 8), Word::ZERO, &core, 1001)
            .unwrap();
        assert_eq!(io.free_ts(8), Some(1001 + 10000));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn invalid_disk_block_faults_at_issue() {
        let dir = scratch_dir("diskbad");
        let mut io = IoCoprocessor::open(&dir).unwrap();
        let mut core = CoreImage::new();
        core.x = Word::from_value(100);
        match io.execute(io_inst(opcode::IN, 0, 8), Word::ZERO, &core, 0) {
            Err(Fault::BadBlock { unit: 8, block: 100 }) => {}
            other => panic!("expected BadBlock, got {:?}", other.map(|_| ())),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn card_reader_reads_lines_and_runs_dry() {
        let dir = scratch_dir("cards");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("cr0"), "FIRST CARD\n").unwrap();
        let mut io = IoCoprocessor::open(&dir).unwrap();
        let mut core = CoreImage::new();
        io.execute(io_inst(opcode::IN, 0, 16), Word::ZERO, &core, 0)
            .unwrap();
        io.tick(&mut core, 5000).unwrap();
        io.tick(&mut core, 10000).unwrap();
        // F-I-R-S-T
        assert_eq!(core.memory[0], word!(+ 6, 9, 19, 22, 23));
        // Padded with blanks past the text.
        assert_eq!(core.memory[3], Word::from_bytes(Sign::Plus, [0; 5]));

        io.execute(io_inst(opcode::IN, 0, 16), Word::ZERO, &core, 10001)
            .unwrap();
        match io.tick(&mut core, 15001) {
            Err(Fault::OutOfData { unit: 16 }) => {}
            other => panic!("expected OutOfData, got {:?}", other.map(|_| ())),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unprintable_byte_faults_on_output() {
        let dir = scratch_dir("unprintable");
        let mut io = IoCoprocessor::open(&dir).unwrap();
        let mut core = CoreImage::new();
        core.memory[0] = word!(+ 0, 0, 0, 0, 60);
        io.execute(io_inst(opcode::OUT, 0, 18), Word::ZERO, &core, 0)
            .unwrap();
        match io.tick(&mut core, 3750) {
            Err(Fault::Unprintable { unit: 18, byte: 60 }) => {}
            other => panic!("expected Unprintable, got {:?}", other.map(|_| ())),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn ioc_on_card_reader_is_unsupported() {
        let dir = scratch_dir("iocbad");
        let mut io = IoCoprocessor::open(&dir).unwrap();
        let core = CoreImage::new();
        match io.execute(io_inst(opcode::IOC, 0, 16), Word::ZERO, &core, 0) {
            Err(Fault::Unsupported { unit: 16, .. }) => {}
            other => panic!("expected Unsupported, got {:?}", other.map(|_| ())),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
