use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use bytelox::InterpretResult;
use bytelox::scanner::Scanner;
use bytelox::vm::vm::Vm;

const EXIT_COMPILE_ERROR: u8 = 65;
const EXIT_RUNTIME_ERROR: u8 = 70;
const EXIT_IO_ERROR: u8 = 74;

#[derive(Parser, Debug)]
#[command(
    name = "bytelox",
    about = "A bytecode compiler and stack VM for Lox expressions"
)]
struct Cli {
    /// Lox source file to run (omit for REPL)
    file: Option<PathBuf>,

    /// Compile and print the bytecode listing instead of running
    #[arg(long)]
    disassemble: bool,

    /// Dump tokens and exit
    #[arg(long)]
    dump_tokens: bool,

    /// Log compiled chunks (-v) or every executed instruction (-vv) to stderr
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn read_source(path: &PathBuf) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read source file '{}'", path.display()))
}

fn dump_tokens(source: &str) {
    for token in Scanner::new(source) {
        println!("{token}");
    }
}

fn disassemble(source: &str, name: &str) -> ExitCode {
    match bytelox::vm::compile_to_chunk(source) {
        Ok(chunk) => {
            print!("{}", chunk.disassemble(name));
            ExitCode::SUCCESS
        }
        Err(err) => {
            let report = miette::Report::new(err.with_source_code(name, source));
            eprintln!("{report:?}");
            ExitCode::from(EXIT_COMPILE_ERROR)
        }
    }
}

fn run_file(path: &PathBuf, cli: &Cli) -> Result<ExitCode> {
    let source = read_source(path)?;

    if cli.dump_tokens {
        dump_tokens(&source);
        return Ok(ExitCode::SUCCESS);
    }

    if cli.disassemble {
        return Ok(disassemble(&source, &path.display().to_string()));
    }

    let code = match Vm::new().interpret(&source) {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(EXIT_COMPILE_ERROR),
        InterpretResult::RuntimeError => ExitCode::from(EXIT_RUNTIME_ERROR),
    };
    Ok(code)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.file {
        Some(path) => run_file(path, &cli),
        None => bytelox::repl::run_repl()
            .map(|()| ExitCode::SUCCESS)
            .context("read from stdin"),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(EXIT_IO_ERROR)
        }
    }
}
