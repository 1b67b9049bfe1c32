//! Tree-walking interpreter for Monkey.
//!
//! The simpler of the two execution engines: direct AST evaluation over a
//! chain of environments. Kept alongside the bytecode VM for correctness
//! cross-checks and benchmark comparison.

pub mod environment;
pub mod executor;

pub use environment::Environment;
pub use executor::Interpreter;
