//! The machine: one owner for the core image, the CPU, the I/O
//! coprocessor, and the logical clock.
//!
//! Both tick sources share a single timestamp.  Within one tick the
//! CPU always runs before the devices, so an instruction issued at a
//! device's release instant still sees it busy, and the device comes
//! free at the end of that same tick.

use std::path::Path;

use tracing::{event, Level};

use crate::control::{Cpu, CpuStep};
use crate::fault::Stop;
use crate::io::IoCoprocessor;
use crate::mapped::MappedCore;
use crate::memory::CoreImage;

/// Where the core image lives: process memory, or a shared mapping
/// of a core file.
pub enum CoreStore {
    Owned(Box<CoreImage>),
    Mapped(MappedCore),
}

impl CoreStore {
    pub fn in_memory() -> CoreStore {
        CoreStore::Owned(Box::new(CoreImage::new()))
    }

    pub fn mapped(path: &Path) -> Result<CoreStore, crate::fault::Fault> {
        Ok(CoreStore::Mapped(MappedCore::open(path)?))
    }

    fn image(&self) -> &CoreImage {
        match self {
            CoreStore::Owned(core) => core,
            CoreStore::Mapped(mapped) => mapped.image(),
        }
    }

    fn image_mut(&mut self) -> &mut CoreImage {
        match self {
            CoreStore::Owned(core) => core,
            CoreStore::Mapped(mapped) => mapped.image_mut(),
        }
    }
}

pub struct Machine {
    store: CoreStore,
    cpu: Cpu,
    io: IoCoprocessor,
    ts: i64,
}

impl Machine {
    pub fn new(store: CoreStore, io: IoCoprocessor) -> Machine {
        Machine {
            store,
            cpu: Cpu::new(),
            io,
            ts: 0,
        }
    }

    pub fn ts(&self) -> i64 {
        self.ts
    }

    pub fn core(&self) -> &CoreImage {
        self.store.image()
    }

    pub fn core_mut(&mut self) -> &mut CoreImage {
        self.store.image_mut()
    }

    pub fn pc(&self) -> u16 {
        self.cpu.pc()
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.cpu.set_pc(pc);
    }

    /// The next timestamp at which anything is scheduled to happen.
    /// Never in the past: a stalled CPU whose gate has already opened
    /// reports `now`.
    pub fn next_ts(&self) -> i64 {
        let cpu = self.cpu.next_ts(self.store.image(), &self.io);
        let both = match self.io.next_ts(self.ts) {
            Some(io) => cpu.min(io),
            None => cpu,
        };
        both.max(self.ts)
    }

    /// Advance the clock by one tick.
    pub fn tick(&mut self) -> Result<CpuStep, Stop> {
        self.tick_at(self.ts + 1)
    }

    /// Jump the clock to `ts` and tick the CPU, then the devices.
    pub fn tick_at(&mut self, ts: i64) -> Result<CpuStep, Stop> {
        self.ts = ts;
        let step = self
            .cpu
            .tick(self.store.image_mut(), &mut self.io, ts)?;
        self.io.tick(self.store.image_mut(), ts)?;
        Ok(step)
    }

    /// Run until the CPU retires one instruction, jumping the clock
    /// across idle time.  Device events on the way fire as they come
    /// due.
    pub fn step(&mut self) -> Result<(), Stop> {
        loop {
            let target = self.next_ts().max(self.ts + 1);
            if let CpuStep::Executed = self.tick_at(target)? {
                return Ok(());
            }
        }
    }

    /// Step until HLT or a fault.
    pub fn run(&mut self) -> Stop {
        loop {
            if let Err(stop) = self.step() {
                event!(Level::DEBUG, "machine stopped at {}: {}", self.ts, stop);
                return stop;
            }
        }
    }
}
