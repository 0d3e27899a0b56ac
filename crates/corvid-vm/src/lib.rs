// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # corvid-vm
//!
//! The execution core of the Corvid scripting language: a slab-allocated
//! heap, a precise mark-and-sweep collector and a stack-based bytecode
//! virtual machine.
//!
//! ## Overview
//!
//! - Fixed-capacity slabs per object class, addressed by typed handles
//! - Interned symbols and AVL-tree environments
//! - An explicit root stack instead of conservative stack scanning
//! - A bytecode interpreter with closures, try frames and nested invocation
//!
//! Source text is compiled elsewhere; this crate runs what
//! [`bytecode::BytecodeBuilder`] produces.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use corvid_vm::{Runtime, Value};
//! use corvid_vm::bytecode::{BytecodeBuilder, Opcode};
//!
//! let mut rt = Runtime::new()?;
//! let mut code = BytecodeBuilder::new();
//! code.push_int(1)?.push_int(2)?.op(Opcode::IntAdd).op(Opcode::Ret);
//! let code = code.finish(rt.heap_mut())?;
//! assert_eq!(rt.evaluate(code)?, Value::Int(3));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtins;
pub mod bytecode;
pub mod config;
pub mod error;
pub mod gc;
pub mod runtime;
pub mod vm;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub use config::HeapConfig;
pub use error::{Error, ExceptionKind, Result};
pub use gc::Heap;
pub use gc::object::{Arity, BytecodeRef, ClosureRef, NativeFn, SymbolRef};
pub use runtime::value::Value;

use gc::object::{Closure, ClosureKind};
use runtime::{environment, function};

/// A heap together with its root environment.
///
/// The root closure stays on the root stack for the life of the runtime
/// and has the core natives installed.
pub struct Runtime {
    heap: Heap,
    root: ClosureRef,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(HeapConfig::default())
    }

    /// Creates a runtime with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configuration is rejected.
    pub fn with_config(config: HeapConfig) -> Result<Self> {
        let mut heap = Heap::new(config)?;
        let root = heap.allocate(Closure::new(None, ClosureKind::Root))?;
        heap.roots_mut().push(root);
        builtins::install(&mut heap, root)?;
        Ok(Self { heap, root })
    }

    /// The heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The heap, mutably.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// The root closure.
    pub fn root(&self) -> ClosureRef {
        self.root
    }

    /// Runs `code` in the root closure.
    ///
    /// An uncaught exception comes back as [`Error::Thrown`] and leaves the
    /// runtime usable for the next form.
    pub fn evaluate(&mut self, code: BytecodeRef) -> Result<Value> {
        vm::evaluate(&mut self.heap, self.root, code, false)
    }

    /// Like [`Runtime::evaluate`], emitting every instruction on
    /// [`vm::TRACE_TARGET`].
    pub fn evaluate_traced(&mut self, code: BytecodeRef) -> Result<Value> {
        vm::evaluate(&mut self.heap, self.root, code, true)
    }

    /// Applies `fun` to the list `args`.
    pub fn apply(&mut self, fun: Value, args: Value) -> Result<Value> {
        vm::apply(&mut self.heap, self.root, fun, args)
    }

    /// Binds `name` in the root closure.
    pub fn define(&mut self, name: &str, value: Value) -> Result<()> {
        let mut scope = self.heap.root_scope();
        scope.push(value);
        let sym = scope.intern(name)?;
        environment::define(&mut scope, self.root, sym, value)
    }

    /// Value bound to `name`, raising `unbound-variable` if there is none.
    pub fn get(&mut self, name: &str) -> Result<Value> {
        let sym = self.heap.intern(name)?;
        environment::get(&mut self.heap, self.root, sym)
    }

    /// Binds a host function under `name` in the root closure.
    pub fn define_native(&mut self, name: &str, arity: Arity, fp: NativeFn) -> Result<Value> {
        function::define_native(&mut self.heap, self.root, name, arity, fp)
    }

    /// Interns `name`.
    pub fn intern(&mut self, name: &str) -> Result<SymbolRef> {
        self.heap.intern(name)
    }

    /// A flag that, once raised, throws `interrupt` at the next check.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.heap.interrupt_handle()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("root", &self.root)
            .field("stats", self.heap.stats())
            .finish_non_exhaustive()
    }
}
