use std::process;

use clap::Parser;
use pvm_cli::{execute, Cli};

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    process::exit(execute(cli));
}
