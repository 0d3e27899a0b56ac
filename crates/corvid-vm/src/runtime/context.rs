//! Per-invocation VM context.
//!
//! Every running evaluator owns one [`Thread`], registered on the heap for
//! as long as it runs so the collector can mark its stacks. Nested
//! invocations stack their contexts; only the top one executes.

use crate::config::VmConfig;
use crate::gc::object::{BytecodeRef, ClosureRef};
use crate::runtime::value::Value;

/// Free slots kept ahead of the stack tops before growing.
const STACK_HEADROOM: usize = 8;

/// Value and closure stacks of one VM invocation.
#[derive(Debug)]
pub struct Thread {
    pub(crate) values: Vec<Value>,
    pub(crate) closures: Vec<ClosureRef>,
    pub(crate) text: BytecodeRef,
}

impl Thread {
    pub(crate) fn new(closure: ClosureRef, text: BytecodeRef, config: &VmConfig) -> Self {
        let mut closures = Vec::with_capacity(config.closure_stack.max(1));
        closures.push(closure);
        Self {
            values: Vec::with_capacity(config.value_stack),
            closures,
            text,
        }
    }

    /// Doubles either stack when it is close to full.
    pub(crate) fn ensure_headroom(&mut self) {
        if self.values.capacity() - self.values.len() < STACK_HEADROOM {
            self.values.reserve(self.values.capacity().max(STACK_HEADROOM));
        }
        if self.closures.capacity() - self.closures.len() < STACK_HEADROOM {
            self.closures.reserve(self.closures.capacity().max(STACK_HEADROOM));
        }
    }

    /// Value-stack depth.
    pub fn sp(&self) -> usize {
        self.values.len()
    }

    /// Closure-stack depth.
    pub fn csp(&self) -> usize {
        self.closures.len()
    }

    /// The value stack, bottom first.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The closure stack, bottom first.
    pub fn closures(&self) -> &[ClosureRef] {
        &self.closures
    }

    /// Code currently executing.
    pub fn text(&self) -> BytecodeRef {
        self.text
    }
}
