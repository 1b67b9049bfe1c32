//! Call frames: the runtime record of one in-progress invocation.

use std::rc::Rc;

use super::chunk::{Closure, Instructions};

/// A call frame: the closure being executed, the offset of the next byte to
/// fetch, and the operand-stack slot where this invocation's locals begin.
#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.function.instructions
    }
}
