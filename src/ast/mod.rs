//! Abstract Syntax Tree for Monkey.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, ExprKind, UnaryOp};
pub use stmt::{Program, Stmt, StmtKind};
