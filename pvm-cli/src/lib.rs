//! PVM CLI: assemble, disassemble, run and hash program blobs.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Input/decode/assembly/structural error
//! - 3: Execution ended in a panic, out of gas or a page fault

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Exit code for input and structural errors.
pub const EXIT_INPUT_ERROR: i32 = 1;
/// Exit code when the guest panics, runs out of gas or faults.
pub const EXIT_RUNTIME_ERROR: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "pvm", version, about = "Assemble and run PVM programs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Assemble text to a program blob
    Assemble {
        input: PathBuf,
        /// Output path; defaults to the input with a `.pvm` extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Disassemble a program blob to text
    Disassemble { input: PathBuf },
    /// Execute a standard program blob
    Run(RunArgs),
    /// Print the blake3 hash of a blob
    Hash { input: PathBuf },
}

#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    pub input: PathBuf,
    /// Treat the input as a bare program with empty general memory
    #[arg(long)]
    pub raw: bool,
    /// Entry point; overrides the config file
    #[arg(long)]
    pub pc: Option<u32>,
    /// Gas budget; overrides the config file
    #[arg(long)]
    pub gas: Option<u64>,
    /// Argument bytes as hex, placed in the input zone
    #[arg(long = "arg-hex", default_value = "")]
    pub arg_hex: String,
    /// JSON file with invocation defaults
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Run a parsed command line, returning the process exit code.
pub fn execute(cli: Cli) -> i32 {
    let result = match cli.command {
        Command::Assemble { input, output } => commands::assemble(&input, output.as_deref()),
        Command::Disassemble { input } => commands::disassemble(&input),
        Command::Run(args) => commands::run(&args),
        Command::Hash { input } => commands::hash(&input),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_INPUT_ERROR
        }
    }
}
