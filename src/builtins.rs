//! Builtin functions shared by both execution engines.
//!
//! Builtins that take callbacks (`map`, `filter`, `fold`) run user functions
//! through a [`CallContext`]: the tree-walking interpreter applies the AST
//! directly, while the VM spawns a nested VM instance over the shared
//! constant pool and globals. Misuse (wrong arity, wrong argument types) is
//! reported as a `Value::Error` — ordinary data, not a fault.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::value::{HashEntries, Value};

/// The capability a builtin needs to run a user-supplied function.
pub trait CallContext {
    /// Call `callee` with `args` and return its result. Fatal engine faults
    /// (stack overflow in a callback, calling a non-function) propagate as
    /// `Err`; everything else is a `Value`.
    fn call_function(&mut self, callee: &Value, args: Vec<Value>)
        -> Result<Value, RuntimeError>;
}

pub type BuiltinFn = fn(&mut dyn CallContext, Vec<Value>) -> Result<Value, RuntimeError>;

/// A native function: a name plus an engine-agnostic entry point.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

/// The builtin registry. Order is load-bearing: `OpGetBuiltin` operands are
/// indices into this slice, and the compiler registers names in this order.
pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        func: builtin_len,
    },
    Builtin {
        name: "puts",
        func: builtin_puts,
    },
    Builtin {
        name: "first",
        func: builtin_first,
    },
    Builtin {
        name: "last",
        func: builtin_last,
    },
    Builtin {
        name: "rest",
        func: builtin_rest,
    },
    Builtin {
        name: "push",
        func: builtin_push,
    },
    Builtin {
        name: "keys",
        func: builtin_keys,
    },
    Builtin {
        name: "values",
        func: builtin_values,
    },
    Builtin {
        name: "map",
        func: builtin_map,
    },
    Builtin {
        name: "filter",
        func: builtin_filter,
    },
    Builtin {
        name: "fold",
        func: builtin_fold,
    },
];

/// Look up a builtin by name (used by the tree-walking interpreter).
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

fn wrong_arity(got: usize, want: usize) -> Result<Value, RuntimeError> {
    Ok(Value::error(format!(
        "wrong number of arguments. got={}, want={}",
        got, want
    )))
}

fn builtin_len(_ctx: &mut dyn CallContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::Array(arr) => Ok(Value::Int(arr.borrow().len() as i64)),
        Value::Hash(hash) => Ok(Value::Int(hash.borrow().len() as i64)),
        other => Ok(Value::error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_puts(_ctx: &mut dyn CallContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    for arg in &args {
        println!("{}", arg);
    }
    Ok(Value::Null)
}

fn builtin_first(_ctx: &mut dyn CallContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(arr) => Ok(arr.borrow().first().cloned().unwrap_or(Value::Null)),
        other => Ok(Value::error(format!(
            "argument to `first` must be array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_last(_ctx: &mut dyn CallContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(arr) => Ok(arr.borrow().last().cloned().unwrap_or(Value::Null)),
        other => Ok(Value::error(format!(
            "argument to `last` must be array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_rest(_ctx: &mut dyn CallContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(arr) => {
            let arr = arr.borrow();
            if arr.is_empty() {
                Ok(Value::Null)
            } else {
                let rest: Vec<Value> = arr[1..].to_vec();
                Ok(Value::Array(Rc::new(RefCell::new(rest))))
            }
        }
        other => Ok(Value::error(format!(
            "argument to `rest` must be array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_push(_ctx: &mut dyn CallContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    match &args[0] {
        Value::Array(arr) => {
            arr.borrow_mut().push(args[1].clone());
            Ok(args[0].clone())
        }
        other => Ok(Value::error(format!(
            "argument to `push` must be array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_keys(_ctx: &mut dyn CallContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Hash(hash) => {
            let keys: Vec<Value> = hash.borrow().keys().map(|k| k.to_value()).collect();
            Ok(Value::Array(Rc::new(RefCell::new(keys))))
        }
        other => Ok(Value::error(format!(
            "argument to `keys` must be hash, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_values(_ctx: &mut dyn CallContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Hash(hash) => {
            let values: Vec<Value> = hash.borrow().values().cloned().collect();
            Ok(Value::Array(Rc::new(RefCell::new(values))))
        }
        other => Ok(Value::error(format!(
            "argument to `values` must be hash, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_map(ctx: &mut dyn CallContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    let Value::Array(arr) = &args[0] else {
        return Ok(Value::error(format!(
            "argument to `map` must be array, got {}",
            args[0].type_name()
        )));
    };
    let elements: Vec<Value> = arr.borrow().clone();
    let mut mapped = Vec::with_capacity(elements.len());
    for element in elements {
        mapped.push(ctx.call_function(&args[1], vec![element])?);
    }
    Ok(Value::Array(Rc::new(RefCell::new(mapped))))
}

fn builtin_filter(ctx: &mut dyn CallContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    let Value::Array(arr) = &args[0] else {
        return Ok(Value::error(format!(
            "argument to `filter` must be array, got {}",
            args[0].type_name()
        )));
    };
    let elements: Vec<Value> = arr.borrow().clone();
    let mut kept = Vec::new();
    for element in elements {
        if ctx
            .call_function(&args[1], vec![element.clone()])?
            .is_truthy()
        {
            kept.push(element);
        }
    }
    Ok(Value::Array(Rc::new(RefCell::new(kept))))
}

fn builtin_fold(ctx: &mut dyn CallContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() != 3 {
        return wrong_arity(args.len(), 3);
    }
    let Value::Array(arr) = &args[0] else {
        return Ok(Value::error(format!(
            "argument to `fold` must be array, got {}",
            args[0].type_name()
        )));
    };
    let elements: Vec<Value> = arr.borrow().clone();
    let mut acc = args[1].clone();
    for element in elements {
        acc = ctx.call_function(&args[2], vec![acc, element])?;
    }
    Ok(acc)
}

/// Build an empty hash value.
pub fn empty_hash() -> Value {
    Value::Hash(Rc::new(RefCell::new(HashEntries::default())))
}
