//! Runtime values shared by the tree-walking interpreter and the bytecode VM.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::RandomState;
use indexmap::IndexMap;

use crate::ast::Stmt;
use crate::builtins::Builtin;
use crate::bytecode::chunk::{Closure, CompiledFunction};
use crate::interpreter::Environment;

/// Hash entries: insertion order is preserved for inspection, lookup is O(1).
pub type HashEntries = IndexMap<HashKey, Value, RandomState>;

/// The hashable subset of values usable as hash keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Int(i64),
    Bool(bool),
    String(Rc<String>),
}

impl HashKey {
    /// Convert a Value to a HashKey if possible.
    pub fn from_value(value: &Value) -> Option<HashKey> {
        match value {
            Value::Int(n) => Some(HashKey::Int(*n)),
            Value::Bool(b) => Some(HashKey::Bool(*b)),
            Value::String(s) => Some(HashKey::String(s.clone())),
            _ => None,
        }
    }

    /// Convert back to the Value this key was made from.
    pub fn to_value(&self) -> Value {
        match self {
            HashKey::Int(n) => Value::Int(*n),
            HashKey::Bool(b) => Value::Bool(*b),
            HashKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKey::Int(n) => write!(f, "{}", n),
            HashKey::Bool(b) => write!(f, "{}", b),
            HashKey::String(s) => write!(f, "{}", s),
        }
    }
}

/// A runtime value in Monkey.
#[derive(Debug, Clone)]
pub enum Value {
    /// Integer value
    Int(i64),
    /// Boolean value
    Bool(bool),
    /// Null value
    Null,
    /// String value
    String(Rc<String>),
    /// Array value (reference-like: shared between bindings)
    Array(Rc<RefCell<Vec<Value>>>),
    /// Hash value (ordered, O(1) lookup)
    Hash(Rc<RefCell<HashEntries>>),
    /// Tree-walk function value (AST body + captured environment)
    Function(Rc<Function>),
    /// A compiled function body (lives in the constant pool)
    CompiledFunction(Rc<CompiledFunction>),
    /// A compiled function bundled with its captured free values
    Closure(Rc<Closure>),
    /// Native/builtin function
    Builtin(&'static Builtin),
    /// A recoverable error as plain data; never unwinds the stack
    Error(Rc<String>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Hash(_) => "hash",
            Value::Function(_) => "function",
            Value::CompiledFunction(_) => "function",
            Value::Closure(_) => "function",
            Value::Builtin(_) => "function",
            Value::Error(_) => "error",
        }
    }

    /// Only false and null are non-truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Null)
    }

    /// Convert this value to a HashKey if possible.
    pub fn to_hash_key(&self) -> Option<HashKey> {
        HashKey::from_value(self)
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Rc::new(message.into()))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

// Display is the user-visible rendering (`puts`, the REPL, error messages).
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(arr) => {
                write!(f, "[")?;
                let arr = arr.borrow();
                for (i, val) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", val)?;
                }
                write!(f, "]")
            }
            Value::Hash(hash) => {
                write!(f, "{{")?;
                let hash = hash.borrow();
                for (i, (key, val)) in hash.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, val)?;
                }
                write!(f, "}}")
            }
            Value::Function(_) => write!(f, "<fn>"),
            Value::CompiledFunction(_) => write!(f, "<fn>"),
            Value::Closure(_) => write!(f, "<fn>"),
            Value::Builtin(builtin) => write!(f, "<builtin fn {}>", builtin.name),
            Value::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// A tree-walk function: parameters, AST body, and the defining environment.
#[derive(Debug)]
pub struct Function {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub env: Rc<RefCell<Environment>>,
}
