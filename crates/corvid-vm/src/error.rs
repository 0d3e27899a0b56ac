//! Error types.

use thiserror::Error;

use crate::gc::slab::SlabClass;
use crate::runtime::value::Value;

/// Result type for heap and VM operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the heap and the VM.
///
/// Only [`Error::Thrown`] is catchable by a try frame. Every other variant
/// means the heap can no longer be trusted, or the host handed in bad input,
/// and aborts the running invocation.
#[derive(Debug, Error)]
pub enum Error {
    /// A slab is full even after a collection.
    #[error("out of memory: {0} slab exhausted")]
    OutOfMemory(SlabClass),

    /// An exception value that no try frame caught.
    #[error("uncaught exception")]
    Thrown(Value),

    /// A handle pointed at a free slot.
    #[error("dangling {class} reference #{index}")]
    Dangling {
        /// Class of the slab
        class: SlabClass,
        /// Slot index
        index: usize,
    },

    /// An internal invariant was violated.
    #[error("heap corrupted: {0}")]
    Corrupted(String),

    /// Bytecode could not be built or decoded.
    #[error("bytecode error: {0}")]
    Bytecode(String),

    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file is not valid TOML.
    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a try frame may intercept this error.
    pub fn is_catchable(&self) -> bool {
        matches!(self, Error::Thrown(_))
    }

    /// Whether this error leaves the heap in an untrusted state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::OutOfMemory(_) | Error::Dangling { .. } | Error::Corrupted(_)
        )
    }

    /// The thrown value, if this is a catchable exception.
    pub fn thrown(&self) -> Option<Value> {
        match self {
            Error::Thrown(value) => Some(*value),
            _ => None,
        }
    }

    /// Creates a bytecode error.
    pub fn bytecode(msg: impl Into<String>) -> Self {
        Error::Bytecode(msg.into())
    }

    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a corruption error.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Error::Corrupted(msg.into())
    }
}

/// Catchable conditions raised by the VM and the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// A symbol was read or set with no binding in scope
    UnboundVariable,
    /// An operand had the wrong type
    TypeError,
    /// Wrong number of arguments
    ArityError,
    /// Integer or float division by zero
    DivisionByZero,
    /// The VM popped an empty stack
    StackUnderflow,
    /// An undefined opcode byte was fetched
    UnknownOpcode,
    /// Nesting or frame depth exceeded its ceiling
    TooDeep,
    /// Execution ran off the end of its instruction stream
    NoReturn,
    /// The host raised the interrupt flag
    Interrupt,
}

impl ExceptionKind {
    /// Every kind, in a stable order.
    pub const ALL: [ExceptionKind; 9] = [
        ExceptionKind::UnboundVariable,
        ExceptionKind::TypeError,
        ExceptionKind::ArityError,
        ExceptionKind::DivisionByZero,
        ExceptionKind::StackUnderflow,
        ExceptionKind::UnknownOpcode,
        ExceptionKind::TooDeep,
        ExceptionKind::NoReturn,
        ExceptionKind::Interrupt,
    ];

    /// Symbol naming the kind inside exception values.
    pub fn name(self) -> &'static str {
        match self {
            ExceptionKind::UnboundVariable => "unbound-variable",
            ExceptionKind::TypeError => "type-error",
            ExceptionKind::ArityError => "arity-error",
            ExceptionKind::DivisionByZero => "division-by-zero",
            ExceptionKind::StackUnderflow => "stack-underflow",
            ExceptionKind::UnknownOpcode => "unknown-opcode",
            ExceptionKind::TooDeep => "too-deep",
            ExceptionKind::NoReturn => "no-return",
            ExceptionKind::Interrupt => "interrupt",
        }
    }
}
