//! Monkey REPL: a line-oriented loop with persistent state.
//!
//! In bytecode mode the symbol table, constant pool, and global slots
//! survive across lines, so each line compiles against everything defined
//! before it. In tree-walk mode the interpreter's environment persists.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use colored::Colorize;

use crate::bytecode::{self, Compiler, SymbolTable, Vm};
use crate::interpreter::Interpreter;
use crate::lexer::Scanner;
use crate::parser::Parser;
use crate::value::Value;
use crate::ExecutionMode;

pub struct Repl {
    mode: ExecutionMode,
    show_disassembly: bool,
    // Bytecode-mode state, persistent across lines.
    symbol_table: Rc<RefCell<SymbolTable>>,
    constants: Vec<Value>,
    globals: Rc<RefCell<Vec<Value>>>,
    // Tree-walk-mode state.
    interpreter: Interpreter,
}

impl Repl {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            show_disassembly: false,
            symbol_table: Rc::new(RefCell::new(SymbolTable::with_builtins())),
            constants: Vec::new(),
            globals: Rc::new(RefCell::new(Vec::new())),
            interpreter: Interpreter::new(),
        }
    }

    pub fn run(&mut self) {
        println!("Monkey {} - REPL", env!("CARGO_PKG_VERSION"));
        println!("Type .help for available commands.\n");

        let stdin = io::stdin();

        loop {
            print!("{}", ">> ".green());
            io::stdout().flush().unwrap();

            let mut line = String::new();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => {
                    println!("Goodbye!");
                    break;
                }
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "exit" || line == "quit" || line == ".exit" || line == ".quit" {
                        println!("Goodbye!");
                        break;
                    }
                    if line.starts_with('.') {
                        self.handle_command(line);
                        continue;
                    }
                    self.execute(line);
                }
            }
        }
    }

    fn handle_command(&mut self, line: &str) {
        match line {
            ".help" => {
                println!(".help          show this help");
                println!(".mode          show the execution mode");
                println!(".mode vm       switch to the bytecode VM");
                println!(".mode tree     switch to the tree-walking interpreter");
                println!(".disasm        toggle disassembly output");
                println!(".exit          leave the REPL");
            }
            ".mode" => match self.mode {
                ExecutionMode::Bytecode => println!("bytecode VM"),
                ExecutionMode::TreeWalk => println!("tree-walking interpreter"),
            },
            ".mode vm" => {
                self.mode = ExecutionMode::Bytecode;
                println!("switched to the bytecode VM");
            }
            ".mode tree" => {
                self.mode = ExecutionMode::TreeWalk;
                println!("switched to the tree-walking interpreter");
            }
            ".disasm" => {
                self.show_disassembly = !self.show_disassembly;
                println!(
                    "disassembly {}",
                    if self.show_disassembly { "on" } else { "off" }
                );
            }
            other => println!("unknown command: {}", other),
        }
    }

    fn execute(&mut self, line: &str) {
        let tokens = match Scanner::new(line).scan_tokens() {
            Ok(tokens) => tokens,
            Err(err) => return report(&err.to_string()),
        };
        let program = match Parser::new(tokens).parse() {
            Ok(program) => program,
            Err(err) => return report(&err.to_string()),
        };

        match self.mode {
            ExecutionMode::Bytecode => {
                let mut compiler =
                    Compiler::new_with_state(self.symbol_table.clone(), self.constants.clone());
                let bytecode = match compiler.compile(&program) {
                    Ok(bytecode) => bytecode,
                    Err(err) => return report(&err.to_string()),
                };
                self.constants = bytecode.constants.clone();

                if self.show_disassembly {
                    print!("{}", bytecode::disassemble_bytecode(&bytecode));
                    println!("---");
                }

                let mut vm = Vm::with_globals(bytecode, self.globals.clone());
                match vm.run() {
                    Ok(()) => echo(vm.last_popped()),
                    Err(err) => report(&err.to_string()),
                }
            }
            ExecutionMode::TreeWalk => match self.interpreter.interpret(&program) {
                Ok(value) => echo(&value),
                Err(err) => report(&err.to_string()),
            },
        }
    }
}

fn echo(value: &Value) {
    if !matches!(value, Value::Null) {
        println!("{}", value);
    }
}

fn report(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}
