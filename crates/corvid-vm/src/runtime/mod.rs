//! Runtime data: values, symbols, environments and procedures.

pub mod context;
pub mod environment;
pub mod exception;
pub mod function;
pub mod symbol;
pub mod tree;
pub mod value;

pub use context::Thread;
pub use symbol::SymbolTable;
pub use value::Value;
