//! Declarative macros shared across the Corvid workspace.
//!
//! # Macros Overview
//!
//! ## Bytecode
//! - [`opcodes!`] - Declare an opcode enum with mnemonics and encoded lengths
//!
//! ## Testing
//! - [`assert_matches!`] - Assert that a value matches a pattern
//!
//! # Examples
//!
//! ```
//! use corvid_macros::opcodes;
//!
//! opcodes! {
//!     /// A tiny instruction set.
//!     pub enum Op: u8 {
//!         /// Does nothing.
//!         Nop = 0x00 => ("nop", 1),
//!         /// Pushes the following byte.
//!         Push = 0x01 => ("push", 2),
//!     }
//! }
//!
//! assert_eq!(Op::try_from(0x01), Ok(Op::Push));
//! assert_eq!(Op::Push.mnemonic(), "push");
//! assert_eq!(Op::Push.encoded_len(), 2);
//! ```

mod bytecode;
mod testing;
