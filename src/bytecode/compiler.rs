//! AST-to-bytecode compiler.
//!
//! Single-pass compilation: walks the AST once, emitting encoded
//! instructions into the current compilation scope. One scope is pushed per
//! function literal (and per for-each body); leaving a scope captures its
//! buffer into a `CompiledFunction` constant. Forward jumps are emitted with
//! placeholder targets and backpatched once the destination offset is known.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use crate::error::CompileError;
use crate::value::Value;

use super::chunk::{Bytecode, CompiledFunction, Instructions};
use super::instruction::{make, Op};
use super::symbol_table::{Symbol, SymbolScope, SymbolTable};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// The opcode and byte position of an already-emitted instruction.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Op,
    position: usize,
}

/// One function body under construction.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The compiler: transforms AST into bytecode.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: Rc<RefCell<SymbolTable>>,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::new_with_state(
            Rc::new(RefCell::new(SymbolTable::with_builtins())),
            Vec::new(),
        )
    }

    /// Resume with an existing symbol table and constant pool (REPL mode).
    pub fn new_with_state(symbol_table: Rc<RefCell<SymbolTable>>, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Compile a full program into an executable unit.
    pub fn compile(&mut self, program: &Program) -> CompileResult<Bytecode> {
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(Bytecode {
            instructions: self.scopes[0].instructions.clone(),
            constants: self.constants.clone(),
        })
    }

    // --- Statements ---

    fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                self.compile_expr(value)?;
                let symbol = self.symbol_table.borrow_mut().define(name);
                self.emit_store(&symbol);
            }
            StmtKind::Assign { name, value } => {
                let symbol = self
                    .symbol_table
                    .borrow_mut()
                    .resolve(name)
                    .ok_or_else(|| CompileError::undefined_variable(name, stmt.span))?;
                match symbol.scope {
                    SymbolScope::Global | SymbolScope::Local => {
                        self.compile_expr(value)?;
                        self.emit_store(&symbol);
                    }
                    SymbolScope::Free => {
                        return Err(CompileError::invalid_assignment(
                            name,
                            "captured variables are immutable",
                            stmt.span,
                        ));
                    }
                    SymbolScope::Builtin => {
                        return Err(CompileError::invalid_assignment(
                            name,
                            "builtins cannot be reassigned",
                            stmt.span,
                        ));
                    }
                }
            }
            StmtKind::Return(value) => match value {
                Some(expr) => {
                    self.compile_expr(expr)?;
                    self.emit(Op::ReturnValue, &[]);
                }
                None => {
                    self.emit(Op::Return, &[]);
                }
            },
            StmtKind::Expression(expr) => {
                self.compile_expr(expr)?;
                self.emit(Op::Pop, &[]);
            }
            StmtKind::For {
                item,
                index,
                iterable,
                body,
            } => {
                self.compile_expr(iterable)?;

                // The body compiles like a function literal whose parameters
                // are the loop variables, terminated by a frame discard
                // instead of a return.
                self.enter_scope();
                self.symbol_table.borrow_mut().define(item);
                if let Some(index_name) = index {
                    self.symbol_table.borrow_mut().define(index_name);
                }
                let arity = if index.is_some() { 2 } else { 1 };
                for stmt in body {
                    self.compile_stmt(stmt)?;
                }
                self.emit(Op::PopFrame, &[]);
                let (instructions, num_locals, free_symbols) = self.leave_scope();

                for symbol in &free_symbols {
                    self.emit_load(symbol);
                }
                let function = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: arity,
                };
                let index = self.add_constant(Value::CompiledFunction(Rc::new(function)));
                self.emit(Op::ForEach, &[index, arity, free_symbols.len()]);
                // The loop's own result (null) is discarded in statement position.
                self.emit(Op::Pop, &[]);
            }
        }
        Ok(())
    }

    // --- Expressions ---

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::IntLiteral(value) => {
                let index = self.add_constant(Value::Int(*value));
                self.emit(Op::Constant, &[index]);
            }
            ExprKind::StringLiteral(value) => {
                let index = self.add_constant(Value::String(Rc::new(value.clone())));
                self.emit(Op::Constant, &[index]);
            }
            ExprKind::BoolLiteral(true) => {
                self.emit(Op::True, &[]);
            }
            ExprKind::BoolLiteral(false) => {
                self.emit(Op::False, &[]);
            }
            ExprKind::Null => {
                self.emit(Op::Null, &[]);
            }
            ExprKind::Variable(name) => {
                let symbol = self
                    .symbol_table
                    .borrow_mut()
                    .resolve(name)
                    .ok_or_else(|| CompileError::undefined_variable(name, expr.span))?;
                self.emit_load(&symbol);
            }
            ExprKind::Unary { operator, operand } => {
                self.compile_expr(operand)?;
                match operator {
                    UnaryOp::Negate => self.emit(Op::Minus, &[]),
                    UnaryOp::Not => self.emit(Op::Bang, &[]),
                };
            }
            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                // No less-than opcodes: swap the operand order instead.
                match operator {
                    BinaryOp::Less => {
                        self.compile_expr(right)?;
                        self.compile_expr(left)?;
                        self.emit(Op::Greater, &[]);
                    }
                    BinaryOp::LessEqual => {
                        self.compile_expr(right)?;
                        self.compile_expr(left)?;
                        self.emit(Op::GreaterEqual, &[]);
                    }
                    _ => {
                        self.compile_expr(left)?;
                        self.compile_expr(right)?;
                        self.emit(binary_opcode(*operator), &[]);
                    }
                }
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(condition)?;
                let jump_not_truthy = self.emit(Op::JumpNotTruthy, &[0xffff]);

                self.compile_branch(then_branch)?;
                let jump = self.emit(Op::Jump, &[0xffff]);

                let after_consequence = self.current_instructions().len();
                self.change_operand(jump_not_truthy, after_consequence);

                match else_branch {
                    Some(branch) => self.compile_branch(branch)?,
                    None => {
                        self.emit(Op::Null, &[]);
                    }
                }

                let after_alternative = self.current_instructions().len();
                self.change_operand(jump, after_alternative);
            }
            ExprKind::Function { params, body } => {
                self.enter_scope();
                for param in params {
                    self.symbol_table.borrow_mut().define(param);
                }
                for stmt in body {
                    self.compile_stmt(stmt)?;
                }
                // Last expression is the return value: rewrite its trailing
                // pop in place. A body with no value returns void.
                if self.last_instruction_is(Op::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(Op::ReturnValue) {
                    self.emit(Op::Return, &[]);
                }
                let num_parameters = params.len();
                let (instructions, num_locals, free_symbols) = self.leave_scope();

                // Push the current value of each captured variable; the
                // closure opcode bundles them.
                for symbol in &free_symbols {
                    self.emit_load(symbol);
                }
                let function = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters,
                };
                let index = self.add_constant(Value::CompiledFunction(Rc::new(function)));
                self.emit(Op::Closure, &[index, free_symbols.len()]);
            }
            ExprKind::Call { callee, arguments } => {
                self.compile_expr(callee)?;
                for argument in arguments {
                    self.compile_expr(argument)?;
                }
                self.emit(Op::Call, &[arguments.len()]);
            }
            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit(Op::Array, &[elements.len()]);
            }
            ExprKind::Hash(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Op::Hash, &[pairs.len()]);
            }
            ExprKind::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit(Op::Index, &[]);
            }
        }
        Ok(())
    }

    /// Compile an if-branch so it leaves exactly one value: strip the
    /// trailing discard of a final expression statement, or push null when
    /// the branch has no value of its own.
    fn compile_branch(&mut self, branch: &[Stmt]) -> CompileResult<()> {
        let start = self.current_instructions().len();
        for stmt in branch {
            self.compile_stmt(stmt)?;
        }
        if self.last_instruction_is(Op::Pop) && self.last_position() >= start {
            self.remove_last_instruction();
        } else {
            self.emit(Op::Null, &[]);
        }
        Ok(())
    }

    // --- Symbols ---

    fn emit_load(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            SymbolScope::Free => self.emit(Op::GetFree, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
        };
    }

    fn emit_store(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::SetGlobal, &[symbol.index]),
            _ => self.emit(Op::SetLocal, &[symbol.index]),
        };
    }

    // --- Scope management ---

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let enclosed = SymbolTable::enclosed(self.symbol_table.clone());
        self.symbol_table = Rc::new(RefCell::new(enclosed));
    }

    fn leave_scope(&mut self) -> (Instructions, usize, Vec<Symbol>) {
        let scope = self.scopes.pop().expect("leaving the root scope");
        let (num_locals, free_symbols, outer) = {
            let table = self.symbol_table.borrow();
            (
                table.num_definitions,
                table.free_symbols.clone(),
                table.outer().expect("scope table without an outer table"),
            )
        };
        self.symbol_table = outer;
        (scope.instructions, num_locals, free_symbols)
    }

    // --- Emission helpers ---

    fn current_scope(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("no active compilation scope")
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes.last().expect("no active compilation scope").instructions
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let scope = self.current_scope();
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(&instruction);
        scope.previous_instruction = scope.last_instruction.take();
        scope.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position,
        });
        position
    }

    fn last_instruction_is(&self, op: Op) -> bool {
        self.scopes
            .last()
            .and_then(|scope| scope.last_instruction)
            .is_some_and(|last| last.opcode == op)
    }

    fn last_position(&self) -> usize {
        self.scopes
            .last()
            .and_then(|scope| scope.last_instruction)
            .map(|last| last.position)
            .unwrap_or(0)
    }

    fn remove_last_instruction(&mut self) {
        let scope = self.current_scope();
        let last = scope
            .last_instruction
            .take()
            .expect("no instruction to remove");
        scope.instructions.truncate(last.position);
        scope.last_instruction = scope.previous_instruction.take();
    }

    /// Rewrite the opcode of the last emitted instruction in place.
    fn replace_last_pop_with_return(&mut self) {
        let scope = self.current_scope();
        let last = scope
            .last_instruction
            .as_mut()
            .expect("no instruction to replace");
        scope.instructions[last.position] = Op::ReturnValue as u8;
        last.opcode = Op::ReturnValue;
    }

    /// Backpatch the operand of a previously-emitted jump.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = Op::from_u8(self.current_instructions()[position])
            .expect("patching an invalid opcode");
        let instruction = make(op, &[operand]);
        let scope = self.current_scope();
        scope.instructions[position..position + instruction.len()]
            .copy_from_slice(&instruction);
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn binary_opcode(operator: BinaryOp) -> Op {
    match operator {
        BinaryOp::Add => Op::Add,
        BinaryOp::Subtract => Op::Sub,
        BinaryOp::Multiply => Op::Mul,
        BinaryOp::Divide => Op::Div,
        BinaryOp::Equal => Op::Equal,
        BinaryOp::NotEqual => Op::NotEqual,
        BinaryOp::Greater => Op::Greater,
        BinaryOp::GreaterEqual => Op::GreaterEqual,
        BinaryOp::And => Op::And,
        BinaryOp::Or => Op::Or,
        BinaryOp::Less | BinaryOp::LessEqual => {
            unreachable!("less-than compiles via swapped operands")
        }
    }
}
