//! The interactive command loop over a [`Machine`].
//!
//! One command per line on the input; output goes to the writer so
//! the loop is scriptable and testable.  Unknown or malformed
//! commands report and continue; machine faults report and leave the
//! REPL alive so the state can be inspected post mortem.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use tracing::{event, Level};

use cpu::{CpuStep, Machine, Stop, MEM_SIZE};

const HELP: &str = "\
commands:
  run            run until HLT or a fault
  step [n]       execute n instructions (default 1)
  timestep [n]   advance the clock n single ticks (default 1)
  load <path>    apply a listing file to the core
  dump <path>    write the core as a listing file
  registers      print registers and flags
  memory         print non-zero memory words
  memory_zero    print all 4000 memory words
  ts             print the clock
  pc [n]         print (or set) the program counter
  clean          wipe registers, flags, and memory
  help           this text
  quit           leave the repl";

pub struct Repl {
    machine: Machine,
}

impl Repl {
    pub fn new(machine: Machine) -> Repl {
        Repl { machine }
    }

    /// Drive the command loop until `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> io::Result<()> {
        for line in input.lines() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let command = match parts.next() {
                Some(c) => c,
                None => continue,
            };
            let arg = parts.next();
            match command {
                "quit" | "exit" => break,
                _ => self.dispatch(command, arg, out)?,
            }
        }
        Ok(())
    }

    fn dispatch<W: Write>(&mut self, command: &str, arg: Option<&str>, out: &mut W) -> io::Result<()> {
        match command {
            "run" => {
                let stop = self.machine.run();
                self.report_stop(&stop, out)?;
            }
            "step" => {
                let n = parse_count(arg).unwrap_or(1);
                for _ in 0..n {
                    if let Err(stop) = self.machine.step() {
                        self.report_stop(&stop, out)?;
                        break;
                    }
                }
                writeln!(out, "ts {} pc {}", self.machine.ts(), self.machine.pc())?;
            }
            "timestep" => {
                let n = parse_count(arg).unwrap_or(1);
                for _ in 0..n {
                    match self.machine.tick() {
                        Ok(CpuStep::Waiting) | Ok(CpuStep::Executed) => {}
                        Err(stop) => {
                            self.report_stop(&stop, out)?;
                            break;
                        }
                    }
                }
                writeln!(out, "ts {} pc {}", self.machine.ts(), self.machine.pc())?;
            }
            "load" => match arg {
                None => writeln!(out, "load needs a file path")?,
                Some(path) => match File::open(path) {
                    Err(e) => writeln!(out, "cannot open {}: {}", path, e)?,
                    Ok(file) => {
                        let summary = self.machine.core_mut().load_listing(BufReader::new(file))?;
                        if let Some(entry) = summary.entry {
                            self.machine.set_pc(entry);
                        }
                        writeln!(
                            out,
                            "loaded {} words{}",
                            summary.words,
                            match summary.entry {
                                Some(pc) => format!(", pc {}", pc),
                                None => String::new(),
                            }
                        )?;
                    }
                },
            },
            "dump" => match arg {
                None => writeln!(out, "dump needs a file path")?,
                Some(path) => match File::create(path) {
                    Err(e) => writeln!(out, "cannot create {}: {}", path, e)?,
                    Ok(file) => {
                        let mut writer = BufWriter::new(file);
                        self.machine.core().write_listing(&mut writer)?;
                        writeln!(out, "dumped to {}", path)?;
                    }
                },
            },
            "registers" => {
                let core = self.machine.core();
                writeln!(out, "A: {}", core.a)?;
                writeln!(out, "X: {}", core.x)?;
                for n in 1..=6 {
                    writeln!(out, "I[{}]: {}", n, core.i[n - 1])?;
                }
                writeln!(out, "J: {}", core.j)?;
                writeln!(
                    out,
                    "overflow {:?}, comparison {:?}",
                    core.overflow(),
                    core.comparison()
                )?;
            }
            "memory" => {
                let core = self.machine.core();
                for (addr, w) in core.memory.iter().enumerate() {
                    if *w != base::word::Word::ZERO {
                        writeln!(out, "{:04}: {}", addr, w)?;
                    }
                }
            }
            "memory_zero" => {
                let core = self.machine.core();
                for (addr, w) in core.memory.iter().enumerate() {
                    writeln!(out, "{:04}: {}", addr, w)?;
                }
            }
            "ts" => writeln!(out, "{}", self.machine.ts())?,
            "pc" => match arg {
                None => writeln!(out, "{}", self.machine.pc())?,
                Some(text) => match text.parse::<u16>() {
                    Ok(pc) if usize::from(pc) < MEM_SIZE => self.machine.set_pc(pc),
                    _ => writeln!(out, "pc must be an address in 0..{}", MEM_SIZE)?,
                },
            },
            "clean" => {
                self.machine.core_mut().clean();
                writeln!(out, "core cleaned")?;
            }
            "help" => writeln!(out, "{}", HELP)?,
            other => writeln!(out, "unknown command '{}' (try help)", other)?,
        }
        Ok(())
    }

    fn report_stop<W: Write>(&self, stop: &Stop, out: &mut W) -> io::Result<()> {
        event!(Level::INFO, "stopped at ts {}: {}", self.machine.ts(), stop);
        match stop {
            Stop::Halted => writeln!(out, "halted at ts {}", self.machine.ts()),
            Stop::Fault(fault) => writeln!(
                out,
                "fault at ts {} pc {}: {}",
                self.machine.ts(),
                self.machine.pc(),
                fault
            ),
        }
    }
}

fn parse_count(arg: Option<&str>) -> Option<u64> {
    arg.and_then(|text| text.parse::<u64>().ok())
}
