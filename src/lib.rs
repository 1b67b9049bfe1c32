//! Monkey: a dynamically-typed scripting language.
//!
//! This is the library root that exports all modules.
//!
//! # Execution Modes
//!
//! Monkey supports two execution modes over the same AST:
//! - **Tree-walk interpreter**: simple, direct AST evaluation
//! - **Bytecode VM**: compilation to a stack machine (the default)

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod span;
pub mod value;

use error::MonkeyError;
use value::Value;

/// Execution mode for running Monkey programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Tree-walking interpreter (kept for comparison)
    TreeWalk,
    /// Bytecode virtual machine
    #[default]
    Bytecode,
}

/// Parse source code into an AST without executing.
pub fn parse(source: &str) -> Result<ast::Program, MonkeyError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile source code to bytecode without executing.
pub fn compile(source: &str) -> Result<bytecode::Bytecode, MonkeyError> {
    let program = parse(source)?;
    let mut compiler = bytecode::Compiler::new();
    Ok(compiler.compile(&program)?)
}

/// Disassemble a compiled unit to a string.
pub fn disassemble(bytecode: &bytecode::Bytecode) -> String {
    bytecode::disassemble_bytecode(bytecode)
}

/// Run a Monkey program using the default execution mode, returning the
/// value of its last top-level expression.
pub fn run(source: &str) -> Result<Value, MonkeyError> {
    run_with_options(source, ExecutionMode::default(), false)
}

/// Run a Monkey program with full control over execution options.
pub fn run_with_options(
    source: &str,
    mode: ExecutionMode,
    disassemble: bool,
) -> Result<Value, MonkeyError> {
    let program = parse(source)?;

    match mode {
        ExecutionMode::TreeWalk => {
            let mut interpreter = interpreter::Interpreter::new();
            Ok(interpreter.interpret(&program)?)
        }
        ExecutionMode::Bytecode => {
            let mut compiler = bytecode::Compiler::new();
            let bytecode = compiler.compile(&program)?;

            if disassemble {
                bytecode::print_disassembly(&bytecode);
                println!("---");
            }

            let mut vm = bytecode::Vm::new(bytecode);
            vm.run()?;
            Ok(vm.last_popped().clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Programs both engines must agree on. (Closure capture-by-value vs
    /// by-reference is the one documented divergence and is avoided here.)
    #[test]
    fn test_engines_agree() {
        let programs = [
            "50 / 2 * 2 + 10 - 5",
            "!(1 > 2) && (3 <= 3)",
            "if (1 < 2) { \"yes\" } else { \"no\" }",
            "let a = 1; a = a + 1; a * 10",
            "let add = fn(a, b) { a + b }; add(add(1, 2), 3)",
            "let adder = fn(a) { fn(b) { a + b } }; adder(4)(5)",
            "let fib = fn(n) { 0 }; \
             fib = fn(n) { if (n < 2) { n } else { fib(n - 1) + fib(n - 2) } }; \
             fib(12)",
            "fold(map([1, 2, 3], fn(x) { x * x }), 0, fn(acc, x) { acc + x })",
            "let sum = 0; for (v, i in [7, 8, 9]) { sum = sum + v * i; } sum",
            "len(rest([1, 2, 3])) + len(\"abc\")",
            "{\"a\": 1, \"b\": 2}[\"b\"]",
        ];

        for source in programs {
            let vm = run_with_options(source, ExecutionMode::Bytecode, false).unwrap();
            let tree = run_with_options(source, ExecutionMode::TreeWalk, false).unwrap();
            assert_eq!(
                format!("{}", vm),
                format!("{}", tree),
                "engines disagree on {:?}",
                source
            );
        }
    }

    #[test]
    fn test_compile_errors_surface_before_execution() {
        let err = run("puts(undefined_name)").unwrap_err();
        assert!(matches!(err, MonkeyError::Compile(_)));
    }

    #[test]
    fn test_parse_errors_surface() {
        assert!(matches!(
            run("let = 5;").unwrap_err(),
            MonkeyError::Parser(_)
        ));
    }
}
