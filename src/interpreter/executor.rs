//! Direct AST evaluation.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use crate::builtins::{self, CallContext};
use crate::error::RuntimeError;
use crate::interpreter::environment::Environment;
use crate::value::{Function, HashEntries, HashKey, Value};

/// Result type for evaluation.
pub type EvalResult<T> = Result<T, RuntimeError>;

/// Why evaluation stopped early: a `return` unwinding to its call boundary,
/// or a genuine fault. Returns are caught at function calls (and swallowed
/// by for-each bodies); faults propagate to the caller.
enum Interrupt {
    Return(Value),
    Fault(RuntimeError),
}

impl From<RuntimeError> for Interrupt {
    fn from(err: RuntimeError) -> Self {
        Interrupt::Fault(err)
    }
}

type Exec<T> = Result<T, Interrupt>;

/// The tree-walking interpreter.
pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            globals: Rc::new(RefCell::new(Environment::new())),
        }
    }

    /// Evaluate a program; the result is the value of its last statement.
    pub fn interpret(&mut self, program: &Program) -> EvalResult<Value> {
        let env = self.globals.clone();
        match self.exec_block(&program.statements, &env) {
            Ok(value) => Ok(value),
            Err(Interrupt::Return(value)) => Ok(value),
            Err(Interrupt::Fault(err)) => Err(err),
        }
    }

    /// Execute statements in order; the block's value is its final
    /// statement's value (bindings and loops have none).
    fn exec_block(&mut self, block: &[Stmt], env: &Rc<RefCell<Environment>>) -> Exec<Value> {
        let mut result = Value::Null;
        for stmt in block {
            result = self.exec_stmt(stmt, env)?;
        }
        Ok(result)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Rc<RefCell<Environment>>) -> Exec<Value> {
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                let value = self.eval_expr(value, env)?;
                env.borrow_mut().define(name.clone(), value);
                Ok(Value::Null)
            }
            StmtKind::Assign { name, value } => {
                let value = self.eval_expr(value, env)?;
                if !env.borrow_mut().assign(name, value) {
                    return Err(RuntimeError::UndefinedVariable(name.clone()).into());
                }
                Ok(Value::Null)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Null,
                };
                Err(Interrupt::Return(value))
            }
            StmtKind::Expression(expr) => self.eval_expr(expr, env),
            StmtKind::For {
                item,
                index,
                iterable,
                body,
            } => {
                let iterable = self.eval_expr(iterable, env)?;
                let entries = iteration_entries(&iterable)?;
                for (value, position) in entries {
                    let child = Rc::new(RefCell::new(Environment::with_enclosing(env.clone())));
                    child.borrow_mut().define(item.clone(), value);
                    if let Some(index_name) = index {
                        child.borrow_mut().define(index_name.clone(), position);
                    }
                    match self.exec_block(body, &child) {
                        Ok(_) => {}
                        // A `return` in the body only ends that iteration.
                        Err(Interrupt::Return(_)) => {}
                        Err(fault) => return Err(fault),
                    }
                }
                Ok(Value::Null)
            }
        }
    }

    fn eval_expr(&mut self, expr: &Expr, env: &Rc<RefCell<Environment>>) -> Exec<Value> {
        match &expr.kind {
            ExprKind::IntLiteral(value) => Ok(Value::Int(*value)),
            ExprKind::StringLiteral(value) => Ok(Value::String(Rc::new(value.clone()))),
            ExprKind::BoolLiteral(value) => Ok(Value::Bool(*value)),
            ExprKind::Null => Ok(Value::Null),

            ExprKind::Variable(name) => {
                if let Some(value) = env.borrow().get(name) {
                    return Ok(value);
                }
                if let Some(builtin) = builtins::lookup(name) {
                    return Ok(Value::Builtin(builtin));
                }
                Err(RuntimeError::UndefinedVariable(name.clone()).into())
            }

            ExprKind::Unary { operator, operand } => {
                let operand = self.eval_expr(operand, env)?;
                match operator {
                    UnaryOp::Negate => match operand {
                        Value::Int(value) => Ok(Value::Int(value.wrapping_neg())),
                        other => Err(RuntimeError::new(format!(
                            "unsupported type for negation: {}",
                            other.type_name()
                        ))
                        .into()),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
                }
            }

            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.eval_expr(left, env)?;
                let right = self.eval_expr(right, env)?;
                eval_binary(*operator, left, right).map_err(Interrupt::from)
            }

            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.eval_expr(condition, env)?;
                let branch = if condition.is_truthy() {
                    Some(then_branch)
                } else {
                    else_branch.as_ref()
                };
                match branch {
                    Some(branch) => {
                        let child =
                            Rc::new(RefCell::new(Environment::with_enclosing(env.clone())));
                        self.exec_block(branch, &child)
                    }
                    None => Ok(Value::Null),
                }
            }

            ExprKind::Function { params, body } => Ok(Value::Function(Rc::new(Function {
                params: params.clone(),
                body: body.clone(),
                env: env.clone(),
            }))),

            ExprKind::Call { callee, arguments } => {
                let callee = self.eval_expr(callee, env)?;
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.eval_expr(argument, env)?);
                }
                self.call_value(&callee, args)
            }

            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element, env)?);
                }
                Ok(Value::Array(Rc::new(RefCell::new(values))))
            }

            ExprKind::Hash(pairs) => {
                let mut entries = HashEntries::default();
                for (key, value) in pairs {
                    let key = self.eval_expr(key, env)?;
                    let key = HashKey::from_value(&key).ok_or_else(|| {
                        RuntimeError::UnusableHashKey(key.type_name().to_string())
                    })?;
                    let value = self.eval_expr(value, env)?;
                    entries.insert(key, value);
                }
                Ok(Value::Hash(Rc::new(RefCell::new(entries))))
            }

            ExprKind::Index { object, index } => {
                let object = self.eval_expr(object, env)?;
                let index = self.eval_expr(index, env)?;
                eval_index(object, index).map_err(Interrupt::from)
            }
        }
    }

    /// Apply a callable. `return` unwinds exactly to this boundary.
    fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Exec<Value> {
        match callee {
            Value::Function(function) => {
                if args.len() != function.params.len() {
                    return Err(
                        RuntimeError::wrong_arity(function.params.len(), args.len()).into()
                    );
                }
                let env = Rc::new(RefCell::new(Environment::with_enclosing(
                    function.env.clone(),
                )));
                for (param, arg) in function.params.iter().zip(args) {
                    env.borrow_mut().define(param.clone(), arg);
                }
                match self.exec_block(&function.body, &env) {
                    Ok(value) => Ok(value),
                    Err(Interrupt::Return(value)) => Ok(value),
                    Err(fault) => Err(fault),
                }
            }
            Value::Builtin(builtin) => (builtin.func)(self, args).map_err(Interrupt::from),
            other => Err(RuntimeError::NotCallable(other.type_name().to_string()).into()),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext for Interpreter {
    fn call_function(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        self.call_value(callee, args).map_err(|interrupt| match interrupt {
            Interrupt::Fault(err) => err,
            Interrupt::Return(_) => unreachable!("return is handled at the call boundary"),
        })
    }
}

fn eval_binary(operator: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
    match operator {
        BinaryOp::Equal => return Ok(Value::Bool(left == right)),
        BinaryOp::NotEqual => return Ok(Value::Bool(left != right)),
        BinaryOp::And => return Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => return Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        _ => {}
    }

    match (&left, &right) {
        (Value::Int(l), Value::Int(r)) => {
            let value = match operator {
                BinaryOp::Add => Value::Int(l.wrapping_add(*r)),
                BinaryOp::Subtract => Value::Int(l.wrapping_sub(*r)),
                BinaryOp::Multiply => Value::Int(l.wrapping_mul(*r)),
                BinaryOp::Divide => {
                    if *r == 0 {
                        return Err(RuntimeError::new("division by zero"));
                    }
                    Value::Int(l.wrapping_div(*r))
                }
                BinaryOp::Less => Value::Bool(l < r),
                BinaryOp::LessEqual => Value::Bool(l <= r),
                BinaryOp::Greater => Value::Bool(l > r),
                BinaryOp::GreaterEqual => Value::Bool(l >= r),
                _ => unreachable!("handled above"),
            };
            Ok(value)
        }
        (Value::String(l), Value::String(r)) if operator == BinaryOp::Add => {
            Ok(Value::String(Rc::new(format!("{}{}", l, r))))
        }
        _ => Err(RuntimeError::new(format!(
            "unsupported types for binary operation: {} {} {}",
            left.type_name(),
            operator,
            right.type_name()
        ))),
    }
}

fn eval_index(object: Value, index: Value) -> EvalResult<Value> {
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
            let arr = arr.borrow();
            if i >= 0 && (i as usize) < arr.len() {
                Ok(arr[i as usize].clone())
            } else {
                Ok(Value::Null)
            }
        }
        Value::Hash(hash) => {
            let key = HashKey::from_value(&index)
                .ok_or_else(|| RuntimeError::UnusableHashKey(index.type_name().to_string()))?;
            Ok(hash.borrow().get(&key).cloned().unwrap_or(Value::Null))
        }
        other => Err(RuntimeError::new(format!(
            "index operator not supported: {}",
            other.type_name()
        ))),
    }
}

/// The (item, position) pairs a for-each loop visits: array elements with
/// their indices, hash values with their keys, string chars with indices.
fn iteration_entries(iterable: &Value) -> EvalResult<Vec<(Value, Value)>> {
    match iterable {
        Value::Array(arr) => Ok(arr
            .borrow()
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, value)| (value, Value::Int(i as i64)))
            .collect()),
        Value::Hash(hash) => Ok(hash
            .borrow()
            .iter()
            .map(|(key, value)| (value.clone(), key.to_value()))
            .collect()),
        Value::String(s) => Ok(s
            .chars()
            .enumerate()
            .map(|(i, c)| (Value::String(Rc::new(c.to_string())), Value::Int(i as i64)))
            .collect()),
        other => Err(RuntimeError::new(format!(
            "cannot iterate over {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn run(source: &str) -> Value {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        Interpreter::new().interpret(&program).unwrap()
    }

    fn run_err(source: &str) -> RuntimeError {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        Interpreter::new().interpret(&program).unwrap_err()
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        assert_eq!(run("1 + 2 * 3"), Value::Int(7));
        assert_eq!(run("(1 + 2) * 3"), Value::Int(9));
        assert_eq!(run("1 < 2"), Value::Bool(true));
        assert_eq!(run("2 >= 3"), Value::Bool(false));
        assert_eq!(run("-5 + 10"), Value::Int(5));
    }

    #[test]
    fn test_bindings_and_assignment() {
        assert_eq!(run("let a = 1; let b = a + 1; a + b"), Value::Int(3));
        assert_eq!(run("let a = 1; a = a + 9; a"), Value::Int(10));
        assert!(matches!(
            run_err("missing = 1;"),
            RuntimeError::UndefinedVariable(_)
        ));
    }

    #[test]
    fn test_conditionals() {
        assert_eq!(run("if (true) { 10 }"), Value::Int(10));
        assert_eq!(run("if (false) { 10 }"), Value::Null);
        assert_eq!(run("if (null) { 10 } else { 20 }"), Value::Int(20));
        // A branch ending in a binding has no value, as in compiled code.
        assert_eq!(run("if (true) { let x = 1; }"), Value::Null);
    }

    #[test]
    fn test_functions_and_returns() {
        assert_eq!(run("let f = fn(a, b) { a + b }; f(2, 3)"), Value::Int(5));
        assert_eq!(run("let f = fn() { return 1; 2 }; f()"), Value::Int(1));
        assert_eq!(run("let f = fn() { }; f()"), Value::Null);
    }

    #[test]
    fn test_return_unwinds_through_an_if_branch() {
        assert_eq!(
            run("let f = fn(n) { if (n > 0) { return 1; } 2 }; f(5)"),
            Value::Int(1)
        );
        assert_eq!(
            run("let f = fn(n) { if (n > 0) { return 1; } 2 }; f(-5)"),
            Value::Int(2)
        );
    }

    #[test]
    fn test_closures_share_their_environment() {
        // Tree-walk closures capture the environment by reference; this is
        // the documented divergence from the VM's capture-by-value.
        assert_eq!(
            run("let make = fn() { let x = 1; let get = fn() { x }; x = 2; get }; make()()"),
            Value::Int(2)
        );
        assert_eq!(
            run("let adder = fn(a) { fn(b) { a + b } }; adder(2)(3)"),
            Value::Int(5)
        );
    }

    #[test]
    fn test_recursion() {
        assert_eq!(
            run("let fib = fn(n) { 0 }; \
                 fib = fn(n) { if (n < 2) { n } else { fib(n - 1) + fib(n - 2) } }; \
                 fib(10)"),
            Value::Int(55)
        );
    }

    #[test]
    fn test_collections() {
        assert_eq!(run("[1, 2, 3][1]"), Value::Int(2));
        assert_eq!(run("[1][99]"), Value::Null);
        assert_eq!(run("{\"a\": 5}[\"a\"]"), Value::Int(5));
        assert_eq!(run("{1: 2}[9]"), Value::Null);
        assert!(matches!(
            run_err("{}[[]]"),
            RuntimeError::UnusableHashKey(_)
        ));
    }

    #[test]
    fn test_builtins_through_the_tree_walk_context() {
        assert_eq!(run("len(\"abc\")"), Value::Int(3));
        assert_eq!(run("map([1, 2], fn(x) { x + 1 })[1]"), Value::Int(3));
        assert_eq!(
            run("fold([1, 2, 3], 0, fn(acc, x) { acc + x })"),
            Value::Int(6)
        );
        match run("first(1)") {
            Value::Error(_) => {}
            other => panic!("expected error value, got {:?}", other),
        }
    }

    #[test]
    fn test_for_each() {
        assert_eq!(
            run("let sum = 0; for (n in [1, 2, 3]) { sum = sum + n; } sum"),
            Value::Int(6)
        );
        assert_eq!(
            run("let sum = 0; for (v, i in [10, 20]) { sum = sum + v + i; } sum"),
            Value::Int(31)
        );
        assert_eq!(
            run("let acc = 0; for (v in {1: 10, 2: 20}) { acc = acc + v; } acc"),
            Value::Int(30)
        );
        assert_eq!(
            run("let out = \"\"; for (c in \"ab\") { out = out + c; } out"),
            Value::String(Rc::new("ab".to_string()))
        );
    }

    #[test]
    fn test_return_in_for_body_ends_the_iteration() {
        assert_eq!(
            run("let acc = 0; for (n in [1, 2]) { acc = acc + n; return; } acc"),
            Value::Int(3)
        );
    }

    #[test]
    fn test_wrong_arity() {
        assert!(matches!(
            run_err("fn(a) { a }(1, 2)"),
            RuntimeError::WrongArity {
                expected: 1,
                got: 2
            }
        ));
    }
}
