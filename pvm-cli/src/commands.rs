//! CLI command implementations.
//!
//! Each command returns the process exit code on completion; `Err` means
//! the input could not be read, parsed or assembled.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, info};
use pvm_common::ProgramCode;
use pvm_vm::{
    invoke_with_config, Engine, ExitReason, Gas, GeneralMemory, NoHostCalls, PageMap, PvmConfig,
    Registers, VmState,
};

use crate::{RunArgs, EXIT_RUNTIME_ERROR};

/// Assemble a text file to a bare program blob.
pub fn assemble(input: &Path, output: Option<&Path>) -> Result<i32> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input));

    let text = fs::read_to_string(input)
        .with_context(|| format!("cannot read '{}'", input.display()))?;
    let program = pvm_assembler::assemble(&text)?;
    let bytes = program.encode();

    fs::write(&output, &bytes).with_context(|| format!("cannot write '{}'", output.display()))?;

    eprintln!(
        "assembled {} instructions ({} bytes) -> {}",
        program.instructions().count(),
        bytes.len(),
        output.display()
    );
    Ok(0)
}

/// `prog.pvmasm` → `prog.pvm`; anything else gets `.pvm` appended.
fn default_output(input: &Path) -> PathBuf {
    match input.extension() {
        Some(ext) if ext == "pvmasm" => input.with_extension("pvm"),
        _ => {
            let mut name = input.as_os_str().to_owned();
            name.push(".pvm");
            PathBuf::from(name)
        }
    }
}

/// Disassemble a bare program blob to text on stdout.
pub fn disassemble(input: &Path) -> Result<i32> {
    let program = read_program(input)?;
    print!("{}", pvm_assembler::disassemble(&program));
    Ok(0)
}

/// Execute a standard program blob, or a bare program with `--raw`.
pub fn run(args: &RunArgs) -> Result<i32> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("cannot read config '{}'", path.display()))?;
            PvmConfig::from_json(&text)
                .with_context(|| format!("invalid config '{}'", path.display()))?
        }
        None => PvmConfig::default(),
    };
    if let Some(pc) = args.pc {
        config.pc = pc;
    }
    if let Some(gas) = args.gas {
        config.gas = gas;
    }
    let argument = parse_hex(&args.arg_hex).context("invalid --arg-hex")?;
    debug!("run config: {config:?}");

    let bytes = read_bytes(&args.input)?;
    let initial = Gas::from(config.gas);

    let (exit, gas, output, registers) = if args.raw {
        let program = ProgramCode::parse(&bytes)
            .with_context(|| format!("cannot parse '{}'", args.input.display()))?;
        let memory =
            GeneralMemory::with_page_map(PageMap::with_cache_capacity(config.access_cache_capacity));
        let mut state = VmState::new(config.pc, Registers::default(), initial, memory);
        let exit = Engine::run(&program, &mut state);
        (exit, state.gas(), None, *state.registers())
    } else {
        let invocation = invoke_with_config(&config, &bytes, &argument, &mut NoHostCalls)
            .with_context(|| format!("cannot load '{}'", args.input.display()))?;
        (
            invocation.exit,
            invocation.gas,
            invocation.output,
            invocation.registers,
        )
    };
    info!("{} exited with {exit}", args.input.display());

    println!("exit: {exit}");
    println!("gas used: {}", gas.used_since(initial));
    println!("gas left: {}", gas.value());
    if let Some(output) = output {
        println!("output: {}", to_hex(&output));
    }
    for (index, value) in registers.values().iter().enumerate() {
        println!("r{index}: {value:#018x}");
    }

    Ok(match exit {
        ExitReason::Halt | ExitReason::HostCall(_) => 0,
        ExitReason::Panic(_) | ExitReason::OutOfGas | ExitReason::PageFault(_) => {
            EXIT_RUNTIME_ERROR
        }
    })
}

/// Print the blake3 hash of a file.
pub fn hash(input: &Path) -> Result<i32> {
    let bytes = read_bytes(input)?;
    println!("{}", blake3::hash(&bytes).to_hex());
    Ok(0)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot read '{}'", path.display()))
}

fn read_program(path: &Path) -> Result<ProgramCode> {
    let bytes = read_bytes(path)?;
    ProgramCode::parse(&bytes).with_context(|| format!("cannot parse '{}'", path.display()))
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let text = text.strip_prefix("0x").unwrap_or(text);
    if text.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            let pair = text.get(i..i + 2).context("non-ASCII hex")?;
            u8::from_str_radix(pair, 16).with_context(|| format!("bad hex byte '{pair}'"))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(parse_hex("0x00ff10").unwrap(), vec![0x00, 0xFF, 0x10]);
        assert_eq!(parse_hex("AbCd").unwrap(), vec![0xAB, 0xCD]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(to_hex(&[]), "");
        assert_eq!(to_hex(&[0x01, 0xAB]), "01ab");
    }

    #[test]
    fn default_output_names() {
        assert_eq!(
            default_output(Path::new("dir/prog.pvmasm")),
            PathBuf::from("dir/prog.pvm")
        );
        assert_eq!(
            default_output(Path::new("prog.txt")),
            PathBuf::from("prog.txt.pvm")
        );
    }
}
