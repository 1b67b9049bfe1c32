//! Bytecode compiler and virtual machine for Monkey.
//!
//! # Architecture
//!
//! - `instruction`: opcode definitions, operand layouts, binary encode/decode
//! - `chunk`: the `Bytecode` container and compiled callable types
//! - `symbol_table`: scope resolution (global/local/free/builtin)
//! - `compiler`: single-pass AST-to-bytecode code generator
//! - `disassembler`: human-readable instruction listings
//! - `frame`: per-invocation call frames
//! - `vm`: the stack machine executing a compiled unit

pub mod chunk;
pub mod compiler;
pub mod disassembler;
pub mod frame;
pub mod instruction;
pub mod symbol_table;
pub mod vm;

pub use chunk::{Bytecode, Closure, CompiledFunction, Instructions};
pub use compiler::Compiler;
pub use disassembler::{disassemble, disassemble_bytecode, print_disassembly};
pub use instruction::{make, read_operands, Definition, Op};
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};
pub use vm::{Vm, FRAMES_MAX, STACK_MAX};
