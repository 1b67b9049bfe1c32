//! Monkey CLI: execute files, evaluate one-liners, or run the REPL.

use std::env;
use std::fs;
use std::process;

use colored::Colorize;
use mimalloc::MiMalloc;

use monkey_lang::repl::Repl;
use monkey_lang::value::Value;
use monkey_lang::{run_with_options, ExecutionMode};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Run a script file
    Run { file: String },
    /// Evaluate a string
    Eval { code: String },
    /// Start the REPL
    Repl,
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut mode = ExecutionMode::Bytecode;
    let mut disassemble = false;
    let mut positional = Vec::new();

    for arg in &args {
        match arg.as_str() {
            "--treewalk" | "-t" => mode = ExecutionMode::TreeWalk,
            "--disassemble" | "-d" => disassemble = true,
            "--version" | "-V" => {
                println!("monkey {}", VERSION);
                return;
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            flag if flag.starts_with('-') => {
                fail(&format!("unknown flag '{}'", flag));
            }
            _ => positional.push(arg.clone()),
        }
    }

    let command = match positional.first().map(String::as_str) {
        None => Command::Repl,
        Some("repl") => Command::Repl,
        Some("run") => match positional.get(1) {
            Some(file) => Command::Run { file: file.clone() },
            None => fail("usage: monkey run <file>"),
        },
        Some("eval") => match positional.get(1) {
            Some(code) => Command::Eval { code: code.clone() },
            None => fail("usage: monkey eval <code>"),
        },
        // A bare path runs that file.
        Some(file) => Command::Run {
            file: file.to_string(),
        },
    };

    match command {
        Command::Repl => Repl::new(mode).run(),
        Command::Run { file } => {
            let source = match fs::read_to_string(&file) {
                Ok(source) => source,
                Err(err) => fail(&format!("failed to read '{}': {}", file, err)),
            };
            if let Err(err) = run_with_options(&source, mode, disassemble) {
                fail(&err.to_string());
            }
        }
        Command::Eval { code } => match run_with_options(&code, mode, disassemble) {
            Ok(value) => {
                if !matches!(value, Value::Null) {
                    println!("{}", value);
                }
            }
            Err(err) => fail(&err.to_string()),
        },
    }
}

fn print_usage() {
    println!("monkey {}", VERSION);
    println!();
    println!("Usage:");
    println!("  monkey                  start the REPL");
    println!("  monkey <file>           run a script");
    println!("  monkey run <file>       run a script");
    println!("  monkey eval <code>      evaluate a one-liner");
    println!();
    println!("Options:");
    println!("  -t, --treewalk          use the tree-walking interpreter");
    println!("  -d, --disassemble       print bytecode before executing");
    println!("  -V, --version           print the version");
    println!("  -h, --help              show this help");
}

fn fail(message: &str) -> ! {
    eprintln!("{} {}", "error:".red().bold(), message);
    process::exit(1);
}
