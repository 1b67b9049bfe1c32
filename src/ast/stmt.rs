//! Statement AST nodes.

use crate::ast::expr::Expr;
use crate::span::Span;

/// A complete program: a list of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Binding: let name = expr;
    Let { name: String, value: Expr },

    /// Assignment to an existing binding: name = expr;
    Assign { name: String, value: Expr },

    /// Return from a function: return expr; or return;
    Return(Option<Expr>),

    /// An expression used as a statement.
    Expression(Expr),

    /// For-each loop: for (item in iterable) { ... }
    /// or with a position binding: for (item, idx in iterable) { ... }
    For {
        item: String,
        index: Option<String>,
        iterable: Expr,
        body: Vec<Stmt>,
    },
}
