//! `mixal`: assemble a MIXAL source file into a machine listing.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{event, Level};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

use asmlib::{Assembler, AsmError};

/// Assemble MIXAL source into a loadable listing
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// MIXAL source file
    input: PathBuf,

    /// Listing file to write
    output: PathBuf,
}

fn run(cli: &Cli) -> Result<(), AsmError> {
    let input = File::open(&cli.input)
        .map_err(|e| AsmError::io(format!("opening {}", cli.input.display()), e))?;
    let listing = Assembler::assemble(BufReader::new(input))?;
    event!(
        Level::INFO,
        "assembled {} words, entry point {:?}",
        listing.words.len(),
        listing.entry
    );
    let output = File::create(&cli.output)
        .map_err(|e| AsmError::io(format!("creating {}", cli.output.display()), e))?;
    let mut writer = BufWriter::new(output);
    listing
        .write(&mut writer)
        .map_err(|e| AsmError::io(format!("writing {}", cli.output.display()), e))?;
    Ok(())
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
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mixal: {}", e);
            ExitCode::FAILURE
        }
    }
}
