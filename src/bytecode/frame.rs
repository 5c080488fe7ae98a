//! Call frames: the VM's per-invocation execution state.

use std::rc::Rc;

use crate::bytecode::instruction::Instructions;
use crate::value::Closure;

/// One function invocation: the closure being executed, the instruction
/// pointer within it, and where its stack slots begin.
#[derive(Debug)]
pub struct Frame {
    pub closure: Rc<Closure>,
    /// Instruction pointer. Starts at -1 so that the fetch cycle's
    /// increment lands on instruction 0.
    pub ip: i64,
    /// Stack index where this frame's arguments begin; locals occupy
    /// the slots from here through the lambda's locals count.
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.lambda.instructions
    }
}
