//! `mix`: the interactive MIX machine.
//!
//! Builds a machine over an in-memory or file-backed core plus the
//! device directory, then hands control to the command loop on
//! standard input.

mod repl;

use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{event, Level};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

use cpu::{CoreStore, Fault, IoCoprocessor, Machine};

/// Simulate the MIX machine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Memory-map this core image file (created if missing); without
    /// it the machine runs on an in-memory core that vanishes on exit
    #[arg(long)]
    core: Option<PathBuf>,

    /// Directory holding the device backing files
    #[arg(long, default_value = "./dev")]
    dev_dir: PathBuf,
}

fn build_machine(cli: &Cli) -> Result<Machine, Fault> {
    let store = match cli.core.as_ref() {
        Some(path) => {
            event!(Level::INFO, "using core image {}", path.display());
            CoreStore::mapped(path)?
        }
        None => {
            event!(Level::WARN, "no --core given, machine state will not persist");
            CoreStore::in_memory()
        }
    };
    let io = IoCoprocessor::open(&cli.dev_dir)?;
    Ok(Machine::new(store, io))
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let cli = Cli::parse();
    let machine = match build_machine(&cli) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("mix: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut repl = repl::Repl::new(machine);
    match repl.run(BufReader::new(stdin.lock()), &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mix: {}", e);
            ExitCode::FAILURE
        }
    }
}
