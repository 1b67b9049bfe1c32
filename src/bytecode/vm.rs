//! Stack-based virtual machine for executing bytecode.
//!
//! One fetch/decode/execute step per opcode against an operand stack and a
//! frame stack. The constant pool and the global slots are shared by
//! reference with any nested VM spawned for a builtin callback, so callback
//! mutations of globals are visible to the caller. Stack and frame capacity
//! are fixed; exceeding either aborts the run.

use std::cell::RefCell;
use std::rc::Rc;

use crate::builtins::{Builtin, CallContext, BUILTINS};
use crate::error::RuntimeError;
use crate::value::{HashEntries, HashKey, Value};

use super::chunk::{Bytecode, Closure, CompiledFunction};
use super::frame::Frame;
use super::instruction::{self, Op};

/// Maximum operand-stack depth.
pub const STACK_MAX: usize = 2048;
/// Maximum call depth.
pub const FRAMES_MAX: usize = 1024;

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// A virtual machine executing one compiled unit.
pub struct Vm {
    constants: Rc<Vec<Value>>,
    globals: Rc<RefCell<Vec<Value>>>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    last_popped: Value,
}

impl Vm {
    /// A VM over a compiled unit with fresh globals.
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, Rc::new(RefCell::new(Vec::new())))
    }

    /// A VM over a compiled unit sharing an existing global array (REPL mode).
    pub fn with_globals(bytecode: Bytecode, globals: Rc<RefCell<Vec<Value>>>) -> Self {
        let main_function = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        };
        let main_closure = Rc::new(Closure::bare(Rc::new(main_function)));
        Self {
            constants: Rc::new(bytecode.constants),
            globals,
            stack: Vec::with_capacity(STACK_MAX),
            frames: vec![Frame::new(main_closure, 0)],
            last_popped: Value::Null,
        }
    }

    /// A bare VM for running a single callable from a builtin: no main
    /// frame, but the caller's constant pool and globals.
    fn nested(constants: Rc<Vec<Value>>, globals: Rc<RefCell<Vec<Value>>>) -> Self {
        Self {
            constants,
            globals,
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::new(),
            last_popped: Value::Null,
        }
    }

    /// Drive the machine to completion (or a fatal fault).
    pub fn run(&mut self) -> VmResult<()> {
        self.run_until(0)
    }

    /// The value most recently discarded by a pop: the value of the last
    /// top-level expression.
    pub fn last_popped(&self) -> &Value {
        &self.last_popped
    }

    /// Step until the frame stack shrinks back to `depth`, or the bottom
    /// frame's instruction stream is exhausted.
    fn run_until(&mut self, depth: usize) -> VmResult<()> {
        while self.frames.len() > depth {
            let frame = self.current_frame();
            if frame.ip >= frame.instructions().len() {
                break;
            }
            self.step()?;
        }
        Ok(())
    }

    /// One fetch/decode/execute cycle.
    fn step(&mut self) -> VmResult<()> {
        let byte = self.read_byte();
        let op = Op::from_u8(byte).ok_or(RuntimeError::UnknownOpcode(byte))?;

        match op {
            Op::Constant => {
                let index = self.read_u16() as usize;
                let value = self
                    .constants
                    .get(index)
                    .cloned()
                    .ok_or_else(|| RuntimeError::new("constant index out of range"))?;
                self.push(value)?;
            }
            Op::Pop => {
                self.pop()?;
            }

            Op::Add | Op::Sub | Op::Mul | Op::Div => self.execute_binary_operation(op)?,

            Op::True => self.push(Value::Bool(true))?,
            Op::False => self.push(Value::Bool(false))?,
            Op::Null => self.push(Value::Null)?,

            Op::Equal | Op::NotEqual => {
                let right = self.pop()?;
                let left = self.pop()?;
                let equal = left == right;
                self.push(Value::Bool(if op == Op::Equal { equal } else { !equal }))?;
            }
            Op::Greater | Op::GreaterEqual => self.execute_comparison(op)?,
            Op::And | Op::Or => {
                let right = self.pop()?;
                let left = self.pop()?;
                let result = if op == Op::And {
                    left.is_truthy() && right.is_truthy()
                } else {
                    left.is_truthy() || right.is_truthy()
                };
                self.push(Value::Bool(result))?;
            }

            Op::Minus => {
                let operand = self.pop()?;
                match operand {
                    Value::Int(value) => self.push(Value::Int(value.wrapping_neg()))?,
                    other => {
                        return Err(RuntimeError::new(format!(
                            "unsupported type for negation: {}",
                            other.type_name()
                        )))
                    }
                }
            }
            Op::Bang => {
                let operand = self.pop()?;
                self.push(Value::Bool(!operand.is_truthy()))?;
            }

            Op::Jump => {
                let target = self.read_u16() as usize;
                self.current_frame_mut().ip = target;
            }
            Op::JumpNotTruthy => {
                let target = self.read_u16() as usize;
                let condition = self.pop()?;
                if !condition.is_truthy() {
                    self.current_frame_mut().ip = target;
                }
            }

            Op::SetGlobal => {
                let slot = self.read_u16() as usize;
                let value = self.pop()?;
                let mut globals = self.globals.borrow_mut();
                if slot >= globals.len() {
                    globals.resize(slot + 1, Value::Null);
                }
                globals[slot] = value;
            }
            Op::GetGlobal => {
                let slot = self.read_u16() as usize;
                let value = self
                    .globals
                    .borrow()
                    .get(slot)
                    .cloned()
                    .ok_or_else(|| RuntimeError::new("global slot out of range"))?;
                self.push(value)?;
            }
            Op::SetLocal => {
                let slot = self.read_byte() as usize;
                let base = self.current_frame().base_pointer;
                let value = self.pop()?;
                self.stack[base + slot] = value;
            }
            Op::GetLocal => {
                let slot = self.read_byte() as usize;
                let base = self.current_frame().base_pointer;
                let value = self.stack[base + slot].clone();
                self.push(value)?;
            }
            Op::GetFree => {
                let slot = self.read_byte() as usize;
                let value = self.current_frame().closure.free[slot].clone();
                self.push(value)?;
            }
            Op::GetBuiltin => {
                let index = self.read_byte() as usize;
                let builtin = BUILTINS
                    .get(index)
                    .ok_or_else(|| RuntimeError::new("builtin index out of range"))?;
                self.push(Value::Builtin(builtin))?;
            }

            Op::Array => {
                let count = self.read_u16() as usize;
                let start = self.stack.len() - count;
                let elements: Vec<Value> = self.stack.drain(start..).collect();
                self.push(Value::Array(Rc::new(RefCell::new(elements))))?;
            }
            Op::Hash => {
                let pairs = self.read_u16() as usize;
                let start = self.stack.len() - 2 * pairs;
                let items: Vec<Value> = self.stack.drain(start..).collect();
                let mut entries = HashEntries::default();
                for pair in items.chunks(2) {
                    let key = HashKey::from_value(&pair[0]).ok_or_else(|| {
                        RuntimeError::UnusableHashKey(pair[0].type_name().to_string())
                    })?;
                    entries.insert(key, pair[1].clone());
                }
                self.push(Value::Hash(Rc::new(RefCell::new(entries))))?;
            }
            Op::Index => {
                let index = self.pop()?;
                let object = self.pop()?;
                self.execute_index(object, index)?;
            }

            Op::Call => {
                let argc = self.read_byte() as usize;
                self.execute_call(argc)?;
            }
            Op::ReturnValue => {
                let value = self.pop()?;
                let frame = self.frames.pop().expect("return without a frame");
                self.stack.truncate(frame.base_pointer.saturating_sub(1));
                self.push(value)?;
            }
            Op::Return => {
                let frame = self.frames.pop().expect("return without a frame");
                self.stack.truncate(frame.base_pointer.saturating_sub(1));
                self.push(Value::Null)?;
            }
            Op::PopFrame => {
                let frame = self.frames.pop().expect("pop-frame without a frame");
                self.stack.truncate(frame.base_pointer.saturating_sub(1));
            }

            Op::Closure => {
                let index = self.read_u16() as usize;
                let num_free = self.read_byte() as usize;
                self.push_closure(index, num_free)?;
            }
            Op::ForEach => {
                let index = self.read_u16() as usize;
                let arity = self.read_byte() as usize;
                let num_free = self.read_byte() as usize;
                self.execute_for_each(index, arity, num_free)?;
            }
        }
        Ok(())
    }

    // --- Operations ---

    fn execute_binary_operation(&mut self, op: Op) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Value::Int(l), Value::Int(r)) => {
                let result = match op {
                    Op::Add => l.wrapping_add(*r),
                    Op::Sub => l.wrapping_sub(*r),
                    Op::Mul => l.wrapping_mul(*r),
                    Op::Div => {
                        if *r == 0 {
                            return Err(RuntimeError::new("division by zero"));
                        }
                        l.wrapping_div(*r)
                    }
                    _ => unreachable!("not a binary arithmetic opcode"),
                };
                self.push(Value::Int(result))
            }
            (Value::String(l), Value::String(r)) if op == Op::Add => {
                self.push(Value::String(Rc::new(format!("{}{}", l, r))))
            }
            _ => Err(RuntimeError::new(format!(
                "unsupported types for binary operation: {} {} {}",
                left.type_name(),
                op.definition().symbol.unwrap_or("?"),
                right.type_name()
            ))),
        }
    }

    fn execute_comparison(&mut self, op: Op) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Value::Int(l), Value::Int(r)) => {
                let result = match op {
                    Op::Greater => l > r,
                    Op::GreaterEqual => l >= r,
                    _ => unreachable!("not a comparison opcode"),
                };
                self.push(Value::Bool(result))
            }
            _ => Err(RuntimeError::new(format!(
                "unsupported types for binary operation: {} {} {}",
                left.type_name(),
                op.definition().symbol.unwrap_or("?"),
                right.type_name()
            ))),
        }
    }

    fn execute_index(&mut self, object: Value, index: Value) -> VmResult<()> {
        match &object {
            Value::Array(arr) => {
                let i = match index {
                    Value::Int(i) => i,
                    other => {
                        return Err(RuntimeError::new(format!(
                            "array index must be int, got {}",
                            other.type_name()
                        )))
                    }
                };
                let value = {
                    let arr = arr.borrow();
                    if i >= 0 && (i as usize) < arr.len() {
                        arr[i as usize].clone()
                    } else {
                        Value::Null
                    }
                };
                self.push(value)
            }
            Value::Hash(hash) => {
                let key = HashKey::from_value(&index).ok_or_else(|| {
                    RuntimeError::UnusableHashKey(index.type_name().to_string())
                })?;
                let value = hash.borrow().get(&key).cloned().unwrap_or(Value::Null);
                self.push(value)
            }
            other => Err(RuntimeError::new(format!(
                "index operator not supported: {}",
                other.type_name()
            ))),
        }
    }

    fn execute_call(&mut self, argc: usize) -> VmResult<()> {
        let callee = self.stack[self.stack.len() - 1 - argc].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, argc),
            Value::CompiledFunction(function) => {
                self.call_closure(Rc::new(Closure::bare(function)), argc)
            }
            Value::Builtin(builtin) => self.call_builtin(builtin, argc),
            other => Err(RuntimeError::NotCallable(other.type_name().to_string())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> VmResult<()> {
        let num_parameters = closure.function.num_parameters;
        if argc != num_parameters {
            return Err(RuntimeError::wrong_arity(num_parameters, argc));
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(RuntimeError::FrameOverflow);
        }

        let base_pointer = self.stack.len() - argc;
        let num_locals = closure.function.num_locals;
        if base_pointer + num_locals > STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        // Reserve the local slots above the arguments.
        self.stack.resize(base_pointer + num_locals, Value::Null);
        self.frames.push(Frame::new(closure, base_pointer));
        Ok(())
    }

    fn call_builtin(&mut self, builtin: &'static Builtin, argc: usize) -> VmResult<()> {
        let start = self.stack.len() - argc;
        let args: Vec<Value> = self.stack.drain(start..).collect();
        self.pop()?; // the callee

        let mut context = VmContext {
            constants: self.constants.clone(),
            globals: self.globals.clone(),
        };
        let result = (builtin.func)(&mut context, args)?;
        self.push(result)
    }

    fn push_closure(&mut self, index: usize, num_free: usize) -> VmResult<()> {
        let function = match self.constants.get(index) {
            Some(Value::CompiledFunction(function)) => function.clone(),
            Some(other) => {
                return Err(RuntimeError::new(format!(
                    "not a function: {}",
                    other.type_name()
                )))
            }
            None => return Err(RuntimeError::new("constant index out of range")),
        };
        let start = self.stack.len() - num_free;
        let free: Vec<Value> = self.stack.drain(start..).collect();
        self.push(Value::Closure(Rc::new(Closure { function, free })))
    }

    /// Drive the loop body over each element of the iterable: one frame per
    /// element, its result discarded, null pushed once exhausted.
    fn execute_for_each(&mut self, index: usize, arity: usize, num_free: usize) -> VmResult<()> {
        let function = match self.constants.get(index) {
            Some(Value::CompiledFunction(function)) => function.clone(),
            _ => return Err(RuntimeError::new("for-each body is not a function")),
        };
        let start = self.stack.len() - num_free;
        let free: Vec<Value> = self.stack.drain(start..).collect();
        let body = Rc::new(Closure { function, free });

        let iterable = self.pop()?;
        let entries: Vec<(Value, Value)> = match &iterable {
            Value::Array(arr) => arr
                .borrow()
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, value)| (value, Value::Int(i as i64)))
                .collect(),
            Value::Hash(hash) => hash
                .borrow()
                .iter()
                .map(|(key, value)| (value.clone(), key.to_value()))
                .collect(),
            Value::String(s) => s
                .chars()
                .enumerate()
                .map(|(i, c)| (Value::String(Rc::new(c.to_string())), Value::Int(i as i64)))
                .collect(),
            other => {
                return Err(RuntimeError::new(format!(
                    "cannot iterate over {}",
                    other.type_name()
                )))
            }
        };

        for (item, position) in entries {
            let height = self.stack.len();
            let depth = self.frames.len();
            self.push(Value::Closure(body.clone()))?;
            self.push(item)?;
            if arity == 2 {
                self.push(position)?;
            }
            self.call_closure(body.clone(), arity)?;
            self.run_until(depth)?;
            // Discard whatever the body left (an explicit return's value).
            self.stack.truncate(height);
        }

        self.push(Value::Null)
    }

    // --- Stack & frame helpers ---

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active frame");
        let byte = frame.closure.function.instructions[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let frame = self.frames.last_mut().expect("no active frame");
        let value = instruction::read_u16(&frame.closure.function.instructions[frame.ip..]);
        frame.ip += 2;
        value
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        let value = self.stack.pop().ok_or(RuntimeError::StackUnderflow)?;
        self.last_popped = value.clone();
        Ok(value)
    }
}

/// The VM-side builtin context: runs a user callable on a nested VM sharing
/// this VM's constant pool and globals.
struct VmContext {
    constants: Rc<Vec<Value>>,
    globals: Rc<RefCell<Vec<Value>>>,
}

impl CallContext for VmContext {
    fn call_function(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let mut vm = Vm::nested(self.constants.clone(), self.globals.clone());
        vm.push(callee.clone())?;
        let argc = args.len();
        for arg in args {
            vm.push(arg)?;
        }
        vm.execute_call(argc)?;
        vm.run()?;
        vm.pop()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::bytecode::compiler::Compiler;
    use crate::bytecode::symbol_table::SymbolTable;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn run(source: &str) -> Value {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let bytecode = Compiler::new().compile(&program).unwrap();
        let mut vm = Vm::new(bytecode);
        vm.run().unwrap();
        vm.last_popped().clone()
    }

    fn run_err(source: &str) -> RuntimeError {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let bytecode = Compiler::new().compile(&program).unwrap();
        let mut vm = Vm::new(bytecode);
        vm.run().unwrap_err()
    }

    fn int(value: i64) -> Value {
        Value::Int(value)
    }

    fn string(value: &str) -> Value {
        Value::String(Rc::new(value.to_string()))
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(run("1"), int(1));
        assert_eq!(run("1 + 2"), int(3));
        assert_eq!(run("1 - 2"), int(-1));
        assert_eq!(run("4 * 5"), int(20));
        assert_eq!(run("50 / 2 * 2 + 10 - 5"), int(55));
        assert_eq!(run("2 * (3 + 4)"), int(14));
        assert_eq!(run("-5"), int(-5));
        assert_eq!(run("-(2 + 3)"), int(-5));
    }

    #[test]
    fn test_last_popped_is_the_final_expression() {
        assert_eq!(run("1; 2; 3"), int(3));
    }

    #[test]
    fn test_boolean_expressions() {
        assert_eq!(run("true"), Value::Bool(true));
        assert_eq!(run("1 < 2"), Value::Bool(true));
        assert_eq!(run("2 <= 2"), Value::Bool(true));
        assert_eq!(run("1 > 2"), Value::Bool(false));
        assert_eq!(run("2 >= 3"), Value::Bool(false));
        assert_eq!(run("1 == 1"), Value::Bool(true));
        assert_eq!(run("1 != 1"), Value::Bool(false));
        assert_eq!(run("true == false"), Value::Bool(false));
        assert_eq!(run("(1 < 2) == true"), Value::Bool(true));
        assert_eq!(run("null == null"), Value::Bool(true));
    }

    #[test]
    fn test_bang_and_truthiness() {
        assert_eq!(run("!true"), Value::Bool(false));
        assert_eq!(run("!null"), Value::Bool(true));
        assert_eq!(run("!5"), Value::Bool(false));
        assert_eq!(run("!!5"), Value::Bool(true));
        assert_eq!(run("!0"), Value::Bool(false)); // zero is truthy
    }

    #[test]
    fn test_logical_operators() {
        assert_eq!(run("true && false"), Value::Bool(false));
        assert_eq!(run("1 && 2"), Value::Bool(true));
        assert_eq!(run("null || false"), Value::Bool(false));
        assert_eq!(run("0 || false"), Value::Bool(true));
    }

    #[test]
    fn test_conditionals() {
        assert_eq!(run("if (true) { 10 }"), int(10));
        assert_eq!(run("if (false) { 10 }"), Value::Null);
        assert_eq!(run("if (null) { 10 } else { 20 }"), int(20));
        assert_eq!(run("if (1 < 2) { 10 } else { 20 }"), int(10));
        assert_eq!(run("if (1 > 2) { 10 } else { 20 }"), int(20));
        assert_eq!(run("if (if (false) { true }) { 10 } else { 20 }"), int(20));
    }

    #[test]
    fn test_global_bindings() {
        assert_eq!(run("let one = 1; one"), int(1));
        assert_eq!(run("let one = 1; let two = 2; one + two"), int(3));
        assert_eq!(run("let one = 1; let two = one + one; one + two"), int(3));
    }

    #[test]
    fn test_global_assignment() {
        assert_eq!(run("let a = 1; a = a + 1; a"), int(2));
        assert_eq!(run("let a = 1; let b = 2; a = b; a"), int(2));
    }

    #[test]
    fn test_shadowing_gets_a_fresh_slot() {
        assert_eq!(run("let a = 1; let a = a + 1; a"), int(2));
    }

    #[test]
    fn test_strings() {
        assert_eq!(run("\"monkey\""), string("monkey"));
        assert_eq!(run("\"mon\" + \"key\""), string("monkey"));
        assert_eq!(run("\"a\" == \"a\""), Value::Bool(true));
        assert_eq!(run("\"a\" == \"b\""), Value::Bool(false));
    }

    #[test]
    fn test_arrays_and_indexing() {
        assert_eq!(run("[1, 2, 3][1]"), int(2));
        assert_eq!(run("[1, 2, 3][0 + 2]"), int(3));
        assert_eq!(run("[[1, 1, 1]][0][0]"), int(1));
        assert_eq!(run("[1, 2, 3][99]"), Value::Null);
        assert_eq!(run("[1][-1]"), Value::Null);
        assert_eq!(run("[][0]"), Value::Null);
    }

    #[test]
    fn test_hashes_and_indexing() {
        assert_eq!(run("{1: 1, 2: 2}[1]"), int(1));
        assert_eq!(run("{\"one\": 1}[\"one\"]"), int(1));
        assert_eq!(run("{true: 5}[true]"), int(5));
        assert_eq!(run("{1: 1}[2]"), Value::Null);
        assert_eq!(run("{}[0]"), Value::Null);
    }

    #[test]
    fn test_unusable_hash_key_is_fatal() {
        let err = run_err("{}[[]]");
        assert!(matches!(err, RuntimeError::UnusableHashKey(_)));
        let err = run_err("{[]: 1}");
        assert!(matches!(err, RuntimeError::UnusableHashKey(_)));
    }

    #[test]
    fn test_calling_functions() {
        assert_eq!(run("let f = fn() { 5 + 10 }; f()"), int(15));
        assert_eq!(run("let f = fn() { return 99; 100 }; f()"), int(99));
        assert_eq!(run("let f = fn() { }; f()"), Value::Null);
        assert_eq!(run("let f = fn() { 1 }; let g = fn() { f() + 1 }; g()"), int(2));
    }

    #[test]
    fn test_functions_with_arguments_and_locals() {
        assert_eq!(run("let identity = fn(a) { a }; identity(4)"), int(4));
        assert_eq!(run("let sum = fn(a, b) { a + b }; sum(1, 2)"), int(3));
        assert_eq!(
            run("let sum = fn(a, b) { let c = a + b; c }; sum(1, 2) + sum(3, 4)"),
            int(10)
        );
        assert_eq!(
            run("let global = 10; let f = fn() { let a = 1; global - a }; f()"),
            int(9)
        );
    }

    #[test]
    fn test_first_class_functions() {
        assert_eq!(
            run("let one = fn() { 1 }; let wrap = fn() { one }; wrap()()"),
            int(1)
        );
    }

    #[test]
    fn test_wrong_arity_is_fatal() {
        let err = run_err("fn(a) { a }(1, 2)");
        assert!(matches!(
            err,
            RuntimeError::WrongArity {
                expected: 1,
                got: 2
            }
        ));
        let err = run_err("fn(a, b) { a + b }(1)");
        assert!(matches!(
            err,
            RuntimeError::WrongArity {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_calling_a_non_function_is_fatal() {
        let err = run_err("let x = 1; x()");
        assert!(matches!(err, RuntimeError::NotCallable(_)));
    }

    #[test]
    fn test_closures() {
        assert_eq!(
            run("let adder = fn(a) { fn(b) { a + b } }; let add2 = adder(2); add2(3)"),
            int(5)
        );
        assert_eq!(
            run("let adder = fn(a, b) { fn(c) { a + b + c } }; adder(1, 2)(8)"),
            int(11)
        );
    }

    #[test]
    fn test_nested_closures_recapture() {
        assert_eq!(
            run("let f = fn(a) { fn(b) { fn(c) { a + b + c } } }; f(1)(2)(3)"),
            int(6)
        );
    }

    #[test]
    fn test_closures_capture_values_at_creation() {
        // The captured value is fixed when the closure is made; later
        // mutation of the enclosing binding is invisible to it.
        assert_eq!(
            run("let make = fn() { let x = 1; let get = fn() { x }; x = 2; get }; make()()"),
            int(1)
        );
    }

    #[test]
    fn test_recursion_via_assignment() {
        assert_eq!(
            run("let fib = fn(n) { 0 }; \
                 fib = fn(n) { if (n < 2) { n } else { fib(n - 1) + fib(n - 2) } }; \
                 fib(10)"),
            int(55)
        );
        assert_eq!(
            run("let count = fn(n) { 0 }; \
                 count = fn(n) { if (n == 0) { 0 } else { count(n - 1) + 1 } }; \
                 count(50)"),
            int(50)
        );
    }

    #[test]
    fn test_builtins() {
        assert_eq!(run("len(\"hello\")"), int(5));
        assert_eq!(run("len([1, 2, 3])"), int(3));
        assert_eq!(run("len({1: 2})"), int(1));
        assert_eq!(run("first([5, 6])"), int(5));
        assert_eq!(run("last([5, 6])"), int(6));
        assert_eq!(run("first([])"), Value::Null);
        assert_eq!(run("len(rest([1, 2, 3]))"), int(2));
        assert_eq!(run("let a = [1]; push(a, 2); len(a)"), int(2));
        assert_eq!(run("keys({1: 10, 2: 20})[1]"), int(2));
        assert_eq!(run("values({1: 10, 2: 20})[1]"), int(20));
        assert_eq!(run("puts(\"ok\")"), Value::Null);
    }

    #[test]
    fn test_builtin_misuse_yields_error_values() {
        match run("len(1)") {
            Value::Error(message) => {
                assert_eq!(&*message, "argument to `len` not supported, got int")
            }
            other => panic!("expected error value, got {:?}", other),
        }
        match run("len()") {
            Value::Error(message) => {
                assert_eq!(&*message, "wrong number of arguments. got=0, want=1")
            }
            other => panic!("expected error value, got {:?}", other),
        }
        // Error values flow as data, they do not abort the run.
        assert_eq!(run("len(1); 42"), int(42));
    }

    #[test]
    fn test_higher_order_builtins_run_closures() {
        assert_eq!(run("map([1, 2, 3], fn(x) { x * 2 })[1]"), int(4));
        assert_eq!(run("len(filter([1, 2, 3, 4], fn(x) { x > 2 }))"), int(2));
        assert_eq!(run("fold([1, 2, 3, 4], 0, fn(acc, x) { acc + x })"), int(10));
        // The callback can itself be a capturing closure; its free values
        // travel into the nested VM.
        assert_eq!(
            run("let scaled = fn(n) { fn(acc, x) { acc + x * n } }; \
                 fold([1, 2], 0, scaled(10))"),
            int(30)
        );
    }

    #[test]
    fn test_builtin_callbacks_share_globals() {
        // The nested VM shares the global array by reference, so mutations
        // inside the callback are visible afterwards.
        assert_eq!(
            run("let total = 0; map([1, 2, 3], fn(x) { total = total + x }); total"),
            int(6)
        );
    }

    #[test]
    fn test_for_each_over_array() {
        assert_eq!(
            run("let sum = 0; for (n in [1, 2, 3]) { sum = sum + n; } sum"),
            int(6)
        );
    }

    #[test]
    fn test_for_each_with_index() {
        assert_eq!(
            run("let sum = 0; for (v, i in [10, 20]) { sum = sum + v + i; } sum"),
            int(31)
        );
    }

    #[test]
    fn test_for_each_over_hash_and_string() {
        assert_eq!(
            run("let acc = 0; for (v in {1: 10, 2: 20}) { acc = acc + v; } acc"),
            int(30)
        );
        assert_eq!(
            run("let acc = 0; for (v, k in {1: 10, 2: 20}) { acc = acc + k; } acc"),
            int(3)
        );
        assert_eq!(
            run("let out = \"\"; for (c in \"ab\") { out = out + c; } out"),
            string("ab")
        );
    }

    #[test]
    fn test_for_each_captures_enclosing_scope() {
        assert_eq!(
            run("let f = fn(base) { let acc = [0]; for (n in [1, 2]) { push(acc, base + n); } \
                 acc[1] + acc[2] }; f(10)"),
            int(23)
        );
    }

    #[test]
    fn test_return_inside_for_body_ends_that_iteration() {
        assert_eq!(
            run("let acc = 0; for (n in [1, 2, 3]) { return; acc = acc + n; } acc"),
            int(0)
        );
        assert_eq!(
            run("let acc = 0; for (n in [1, 2]) { acc = acc + n; return; } acc"),
            int(3)
        );
    }

    #[test]
    fn test_iterating_a_non_iterable_is_fatal() {
        let err = run_err("for (x in 5) { x; }");
        assert!(err.to_string().contains("cannot iterate over int"));
    }

    #[test]
    fn test_division_by_zero_is_fatal() {
        let err = run_err("1 / 0");
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_type_mismatch_is_fatal() {
        let err = run_err("1 + true");
        assert_eq!(
            err.to_string(),
            "unsupported types for binary operation: int + bool"
        );
        let err = run_err("\"a\" > \"b\"");
        assert_eq!(
            err.to_string(),
            "unsupported types for binary operation: string > string"
        );
    }

    #[test]
    fn test_stack_overflow_at_the_boundary() {
        // STACK_MAX pushes are fine; one more is a deterministic fault.
        let ok = format!("[{}]; 1", vec!["0"; STACK_MAX].join(", "));
        assert_eq!(run(&ok), int(1));

        let over = format!("[{}]; 1", vec!["0"; STACK_MAX + 1].join(", "));
        let tokens = Scanner::new(&over).scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let bytecode = Compiler::new().compile(&program).unwrap();
        let mut vm = Vm::new(bytecode);
        assert!(matches!(vm.run().unwrap_err(), RuntimeError::StackOverflow));
    }

    #[test]
    fn test_frame_overflow_on_runaway_recursion() {
        let err = run_err("let f = fn() { 0 }; f = fn() { f() }; f()");
        assert!(matches!(err, RuntimeError::FrameOverflow));
    }

    #[test]
    fn test_repl_style_state_persists_across_units() {
        let symbol_table = Rc::new(RefCell::new(SymbolTable::with_builtins()));
        let globals = Rc::new(RefCell::new(Vec::new()));
        let mut constants = Vec::new();

        // A let's stored value is the most recently popped one, which is
        // what the REPL echoes after a binding line.
        for (source, expected) in [
            ("let a = 5;", int(5)),
            ("let b = a + 2;", int(7)),
            ("a + b", int(12)),
        ] {
            let tokens = Scanner::new(source).scan_tokens().unwrap();
            let program = Parser::new(tokens).parse().unwrap();
            let mut compiler = Compiler::new_with_state(symbol_table.clone(), constants);
            let bytecode = compiler.compile(&program).unwrap();
            constants = bytecode.constants.clone();

            let mut vm = Vm::with_globals(bytecode, globals.clone());
            vm.run().unwrap();
            assert_eq!(vm.last_popped(), &expected);
        }
    }
}
