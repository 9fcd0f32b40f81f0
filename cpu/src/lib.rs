//! Cycle-accurate simulation of the MIX machine: the core image and
//! register file, the CPU, the population of peripheral devices, and
//! the discrete-event clock that coordinates them.
//!
//! The interesting contract is between the CPU and the devices: a
//! device instruction only *stages* work, the transfer itself fires
//! later on the shared timeline, and dependent instructions stall
//! exactly until the device comes free.  [`machine::Machine`] owns
//! all the pieces and exposes tick/step/run loops over them.

pub mod control;
pub mod fault;
pub mod io;
pub mod machine;
pub mod mapped;
pub mod memory;

pub use control::{Cpu, CpuStep};
pub use fault::{Fault, Stop};
pub use io::{DeviceKind, DeviceSpec, IoCoprocessor, DISK_SEEK_FACTOR, NUM_DEVICES};
pub use machine::{CoreStore, Machine};
pub use mapped::MappedCore;
pub use memory::{Comparison, CoreImage, LoadSummary, OverflowFlag, MEM_SIZE};
