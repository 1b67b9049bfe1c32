//! Bytecode disassembler for debugging.
//!
//! One line per instruction: a zero-padded 4-digit byte offset, the opcode
//! name, and the operand values joined by spaces.

use std::fmt::Write;

use crate::value::Value;

use super::chunk::Bytecode;
use super::instruction::{read_operands, Definition, Op};

/// Disassemble a flat instruction stream.
pub fn disassemble(instructions: &[u8]) -> String {
    let mut lines = Vec::new();
    let mut offset = 0;

    while offset < instructions.len() {
        let byte = instructions[offset];
        let Some(op) = Op::from_u8(byte) else {
            lines.push(format!("{:04} ERROR: unknown opcode {}", offset, byte));
            offset += 1;
            continue;
        };
        let def = op.definition();
        let (operands, bytes_read) = read_operands(def, &instructions[offset + 1..]);
        lines.push(format!("{:04} {}", offset, fmt_instruction(def, &operands)));
        offset += 1 + bytes_read;
    }

    lines.join("\n")
}

fn fmt_instruction(def: &Definition, operands: &[usize]) -> String {
    if operands.len() != def.operand_widths.len() {
        return format!(
            "ERROR: operand len {} does not match definition {}",
            operands.len(),
            def.operand_widths.len()
        );
    }
    let rendered: Vec<String> = operands.iter().map(|o| o.to_string()).collect();
    format!("{} {}", def.name, rendered.join(" "))
}

/// Disassemble a whole unit: the main instruction stream followed by each
/// compiled function in the constant pool.
pub fn disassemble_bytecode(bytecode: &Bytecode) -> String {
    let mut output = String::new();

    writeln!(&mut output, "== main ==").unwrap();
    writeln!(&mut output, "{}", disassemble(&bytecode.instructions)).unwrap();

    for (index, constant) in bytecode.constants.iter().enumerate() {
        if let Value::CompiledFunction(function) = constant {
            writeln!(
                &mut output,
                "\n== fn {} (arity: {}, locals: {}) ==",
                index, function.num_parameters, function.num_locals
            )
            .unwrap();
            writeln!(&mut output, "{}", disassemble(&function.instructions)).unwrap();
        }
    }

    output
}

/// Print disassembly to stdout.
pub fn print_disassembly(bytecode: &Bytecode) {
    print!("{}", disassemble_bytecode(bytecode));
}
