// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Assembler for textual bytecode listings.
//!
//! One instruction per line, written with the mnemonics the disassembler
//! prints. `name:` binds a label, `;` starts a comment. Procedures are
//! declared before the `fn` or `macro` that closes over them:
//!
//! ```text
//! .proc add (a b)
//! .doc "Adds two numbers."
//!     get a
//!     get b
//!     +
//!     ret
//! .end
//!
//!     fn add
//!     push/int/byte 2
//!     push/int/byte 3
//!     apply 2
//!     ret
//! ```
//!
//! Literal operands are integers, floats, `"strings"`, `'symbols`, `#t`,
//! `#f` and `nil`. `get`, `def` and `set` also take a bare symbol name.

use corvid_vm::bytecode::opcode::OperandKind;
use corvid_vm::bytecode::{BytecodeBuilder, Label, Opcode};
use corvid_vm::{BytecodeRef, Heap, Value};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Assembly errors.
#[derive(Debug, Error)]
pub enum AsmError {
    /// The listing is malformed.
    #[error("line {line}: {message}")]
    Syntax {
        /// 1-based source line
        line: usize,
        /// What went wrong
        message: String,
    },

    /// The heap refused an allocation.
    #[error(transparent)]
    Vm(#[from] corvid_vm::Error),
}

type Result<T> = std::result::Result<T, AsmError>;

fn syntax(line: usize, message: impl Into<String>) -> AsmError {
    AsmError::Syntax {
        line,
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Open,
    Close,
}

fn tokenize(line: usize, text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ';' => break,
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => return Err(syntax(line, "unterminated string")),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(c @ ('"' | '\\')) => s.push(c),
                            Some(c) => return Err(syntax(line, format!("unknown escape \\{}", c))),
                            None => return Err(syntax(line, "unterminated string")),
                        },
                        Some(c) => s.push(c),
                    }
                }
                tokens.push(Token::Str(s));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug)]
struct LabelState {
    label: Label,
    bound: bool,
    first_use: usize,
}

/// One instruction stream under construction, with its named labels.
#[derive(Debug, Default)]
struct Block {
    builder: BytecodeBuilder,
    labels: FxHashMap<String, LabelState>,
}

impl Block {
    fn label(&mut self, name: &str, line: usize) -> Label {
        let builder = &mut self.builder;
        self.labels
            .entry(name.to_owned())
            .or_insert_with(|| LabelState {
                label: builder.label(),
                bound: false,
                first_use: line,
            })
            .label
    }

    fn bind(&mut self, name: &str, line: usize) -> Result<()> {
        let label = self.label(name, line);
        if let Some(state) = self.labels.get_mut(name) {
            if state.bound {
                return Err(syntax(line, format!("label `{}` defined twice", name)));
            }
            state.bound = true;
        }
        self.builder
            .bind(label)
            .map_err(|e| syntax(line, e.to_string()))?;
        Ok(())
    }

    fn finish(self, heap: &mut Heap, line: usize) -> Result<BytecodeRef> {
        let unbound = self
            .labels
            .iter()
            .filter(|(_, state)| !state.bound)
            .min_by_key(|(_, state)| state.first_use);
        if let Some((name, state)) = unbound {
            return Err(syntax(
                state.first_use,
                format!("label `{}` is never defined", name),
            ));
        }
        match self.builder.finish(heap) {
            Ok(code) => Ok(code),
            Err(corvid_vm::Error::Bytecode(message)) => Err(syntax(line, message)),
            Err(err) => Err(err.into()),
        }
    }
}

/// A declared procedure: the four operands of `fn`.
#[derive(Debug, Clone, Copy)]
struct Proc {
    name: Value,
    params: Value,
    docs: Value,
    body: Value,
}

impl Proc {
    fn pin(&self, heap: &mut Heap) {
        for value in [self.name, self.params, self.docs, self.body] {
            heap.roots_mut().push(value);
        }
    }
}

#[derive(Debug)]
struct OpenProc {
    line: usize,
    name: String,
    params: Value,
    docs: Value,
    block: Block,
}

/// Assembles listings against a growing set of procedures.
///
/// Procedures stay declared, and rooted, across calls, so an interactive
/// session can declare one and use it later.
#[derive(Debug, Default)]
pub struct Assembler {
    procs: FxHashMap<String, Proc>,
}

impl Assembler {
    /// Creates an assembler with no procedures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every declared procedure.
    pub fn procedures(&self) -> impl Iterator<Item = &str> {
        self.procs.keys().map(String::as_str)
    }

    /// Body of the procedure called `name`.
    pub fn procedure_code(&self, name: &str) -> Option<BytecodeRef> {
        match self.procs.get(name)?.body {
            Value::Bytecode(code) => Some(code),
            _ => None,
        }
    }

    /// Assembles `source` into a bytecode array.
    ///
    /// Procedures it declares are pinned on the heap's root stack. The
    /// returned code is not; callers root it before allocating again.
    pub fn assemble(&mut self, heap: &mut Heap, source: &str) -> Result<BytecodeRef> {
        let mark = heap.roots().mark();
        let result = Pass {
            heap: &mut *heap,
            known: &self.procs,
            defined: FxHashMap::default(),
        }
        .run(source);
        heap.roots_mut().pop(mark);

        let (code, defined) = result?;
        for (name, proc) in defined {
            proc.pin(heap);
            self.procs.insert(name, proc);
        }
        tracing::debug!(procedures = self.procs.len(), "listing assembled");
        Ok(code)
    }
}

/// A single run over one listing. Everything it allocates is rooted until
/// the caller rewinds the root stack.
struct Pass<'a> {
    heap: &'a mut Heap,
    known: &'a FxHashMap<String, Proc>,
    defined: FxHashMap<String, Proc>,
}

impl Pass<'_> {
    fn run(mut self, source: &str) -> Result<(BytecodeRef, FxHashMap<String, Proc>)> {
        let mut top = Block::default();
        let mut open: Option<OpenProc> = None;
        let mut last = 0;

        for (index, text) in source.lines().enumerate() {
            let line = index + 1;
            last = line;
            let tokens = tokenize(line, text)?;
            let mut rest = tokens.as_slice();

            if let [Token::Word(word), tail @ ..] = rest {
                if let Some(name) = word.strip_suffix(':') {
                    let block = match open.as_mut() {
                        Some(proc) => &mut proc.block,
                        None => &mut top,
                    };
                    block.bind(name, line)?;
                    rest = tail;
                }
            }

            match rest {
                [] => {}
                [Token::Word(directive), args @ ..] if directive == ".proc" => {
                    if let Some(proc) = &open {
                        return Err(syntax(
                            line,
                            format!("procedure `{}` is still open", proc.name),
                        ));
                    }
                    let [Token::Word(name), params @ ..] = args else {
                        return Err(syntax(line, ".proc needs a name"));
                    };
                    let params = self.params(line, params)?;
                    open = Some(OpenProc {
                        line,
                        name: name.clone(),
                        params,
                        docs: Value::Nil,
                        block: Block::default(),
                    });
                }
                [Token::Word(directive), Token::Str(doc)] if directive == ".doc" => {
                    let Some(proc) = open.as_mut() else {
                        return Err(syntax(line, ".doc outside a procedure"));
                    };
                    proc.docs = self.root(|heap| heap.string(doc))?;
                }
                [Token::Word(directive)] if directive == ".end" => {
                    let Some(proc) = open.take() else {
                        return Err(syntax(line, ".end without .proc"));
                    };
                    self.close(proc, line)?;
                }
                [Token::Word(mnemonic), operands @ ..] => {
                    let block = match open.as_mut() {
                        Some(proc) => &mut proc.block,
                        None => &mut top,
                    };
                    self.instruction(block, line, mnemonic, operands)?;
                }
                _ => return Err(syntax(line, "expected an instruction")),
            }
        }

        if let Some(proc) = open {
            return Err(syntax(
                proc.line,
                format!("procedure `{}` is missing .end", proc.name),
            ));
        }
        let code = top.finish(self.heap, last)?;
        Ok((code, self.defined))
    }

    fn root(&mut self, alloc: impl FnOnce(&mut Heap) -> corvid_vm::Result<Value>) -> Result<Value> {
        let value = alloc(self.heap)?;
        self.heap.roots_mut().push(value);
        Ok(value)
    }

    fn close(&mut self, proc: OpenProc, line: usize) -> Result<()> {
        let code = proc.block.finish(self.heap, line)?;
        let body = Value::Bytecode(code);
        self.heap.roots_mut().push(body);
        let name = self.heap.symbol(&proc.name)?;
        self.defined.insert(
            proc.name,
            Proc {
                name,
                params: proc.params,
                docs: proc.docs,
                body,
            },
        );
        Ok(())
    }

    /// `()`, `rest`, `(a b)` or `(a b . rest)`.
    fn params(&mut self, line: usize, tokens: &[Token]) -> Result<Value> {
        let names = match tokens {
            [] => return Ok(Value::Nil),
            [Token::Word(rest)] => return Ok(self.heap.symbol(rest)?),
            [Token::Open, inner @ .., Token::Close] => inner,
            _ => return Err(syntax(line, "malformed parameter list")),
        };
        let (fixed, rest) = match names {
            [fixed @ .., Token::Word(dot), Token::Word(rest)] if dot == "." => (fixed, Some(rest)),
            _ => (names, None),
        };
        let mut tail = match rest {
            Some(rest) => self.heap.symbol(rest)?,
            None => Value::Nil,
        };
        for token in fixed.iter().rev() {
            let Token::Word(name) = token else {
                return Err(syntax(line, "parameters must be symbols"));
            };
            if name == "." {
                return Err(syntax(line, "misplaced `.` in parameter list"));
            }
            let sym = self.heap.symbol(name)?;
            tail = self.root(|heap| heap.cons(sym, tail))?;
        }
        self.heap.roots_mut().push(tail);
        Ok(tail)
    }

    fn instruction(
        &mut self,
        block: &mut Block,
        line: usize,
        mnemonic: &str,
        operands: &[Token],
    ) -> Result<()> {
        let op = Opcode::from_mnemonic(mnemonic)
            .ok_or_else(|| syntax(line, format!("unknown instruction `{}`", mnemonic)))?;
        let vm_error = |e: corvid_vm::Error| syntax(line, e.to_string());

        match (op.operands(), operands) {
            (OperandKind::None, []) => {
                block.builder.op(op);
            }
            (OperandKind::Byte, [Token::Word(word)]) => {
                let n = word
                    .parse::<u8>()
                    .map_err(|_| syntax(line, format!("`{}` is not a count", word)))?;
                block.builder.op_byte(op, n);
            }
            (OperandKind::SignedByte, [Token::Word(word)]) => {
                let n = word
                    .parse::<i8>()
                    .map_err(|_| syntax(line, format!("`{}` does not fit in a byte", word)))?;
                block.builder.op_byte(op, n as u8);
            }
            (OperandKind::Literal, [token]) => {
                let value = match op {
                    Opcode::Get | Opcode::Def | Opcode::Set => self.symbol(line, token)?,
                    _ => self.literal(line, token)?,
                };
                block.builder.op_literal(op, value).map_err(vm_error)?;
            }
            (OperandKind::Offset, [Token::Word(target)]) => {
                let label = block.label(target, line);
                block.builder.jump(op, label).map_err(vm_error)?;
            }
            (OperandKind::Lambda, [Token::Word(name)]) => {
                let proc = self
                    .defined
                    .get(name)
                    .or_else(|| self.known.get(name))
                    .copied()
                    .ok_or_else(|| syntax(line, format!("unknown procedure `{}`", name)))?;
                block
                    .builder
                    .lambda(op, proc.name, proc.params, proc.docs, proc.body)
                    .map_err(vm_error)?;
            }
            (kind, _) => {
                let expected = match kind {
                    OperandKind::None => "no operands",
                    OperandKind::Byte => "a count",
                    OperandKind::SignedByte => "a small integer",
                    OperandKind::Literal => "one literal",
                    OperandKind::Offset => "a label",
                    OperandKind::Lambda => "a procedure name",
                };
                return Err(syntax(line, format!("{} expects {}", mnemonic, expected)));
            }
        }
        Ok(())
    }

    fn symbol(&mut self, line: usize, token: &Token) -> Result<Value> {
        match token {
            Token::Word(word) => {
                let name = word.strip_prefix('\'').unwrap_or(word);
                Ok(self.heap.symbol(name)?)
            }
            _ => Err(syntax(line, "expected a symbol")),
        }
    }

    fn literal(&mut self, line: usize, token: &Token) -> Result<Value> {
        let word = match token {
            Token::Str(text) => return self.root(|heap| heap.string(text)),
            Token::Word(word) => word.as_str(),
            Token::Open | Token::Close => return Err(syntax(line, "unexpected parenthesis")),
        };
        match word {
            "nil" => return Ok(Value::Nil),
            "#t" => return Ok(Value::Bool(true)),
            "#f" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if let Some(name) = word.strip_prefix('\'') {
            return Ok(self.heap.symbol(name)?);
        }
        if let Ok(n) = word.parse::<i64>() {
            return Ok(Value::Int(n));
        }
        let numeric = word.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
        if numeric {
            if let Ok(x) = word.parse::<f64>() {
                return Ok(Value::Float(x));
            }
        }
        Err(syntax(line, format!("unknown literal `{}`", word)))
    }
}
