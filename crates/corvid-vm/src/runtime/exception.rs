//! Exception values.
//!
//! An exception is a list `(kind message irritant [stack-trace])` tagged as
//! [`Value::Exception`]. The kind is a symbol; for conditions raised by the
//! runtime it is one of the [`ExceptionKind`] names.

use crate::error::{Error, ExceptionKind, Result};
use crate::gc::heap::Heap;
use crate::gc::object::PairRef;
use crate::runtime::value::Value;

impl Heap {
    /// Builds a catchable error of the given kind.
    ///
    /// If building the exception itself fails, that failure is returned
    /// instead, so an exhausted heap surfaces as `OutOfMemory`.
    pub fn exception(&mut self, kind: ExceptionKind, message: &str, irritant: Value) -> Error {
        match self.exception_value(kind, message, irritant) {
            Ok(value) => Error::Thrown(value),
            Err(err) => err,
        }
    }

    /// Builds an exception value without raising it.
    pub fn exception_value(
        &mut self,
        kind: ExceptionKind,
        message: &str,
        irritant: Value,
    ) -> Result<Value> {
        let kind = Value::Symbol(self.well_known.kind(kind));
        let mut scope = self.root_scope();
        scope.push(irritant);
        let message = scope.string(message)?;
        scope.push(message);
        match scope.list(&[kind, message, irritant])? {
            Value::Pair(p) => Ok(Value::Exception(p)),
            _ => Err(Error::corrupted("exception list is empty")),
        }
    }

    /// Wraps an arbitrary thrown value as an exception.
    ///
    /// Lists are tagged in place; anything else becomes a one-element list.
    pub fn as_exception(&mut self, value: Value) -> Result<Value> {
        match value {
            Value::Exception(_) => Ok(value),
            Value::Pair(p) => Ok(Value::Exception(p)),
            other => match self.cons(other, Value::Nil)? {
                Value::Pair(p) => Ok(Value::Exception(p)),
                _ => Err(Error::corrupted("cons returned a non-pair")),
            },
        }
    }

    /// The runtime condition an exception stands for, if it is one.
    pub fn exception_kind(&self, exception: Value) -> Option<ExceptionKind> {
        let Value::Symbol(sym) = self.car(exception).ok()? else {
            return None;
        };
        ExceptionKind::ALL
            .into_iter()
            .find(|kind| self.well_known.kind(*kind) == sym)
    }

    /// The message string of an exception.
    pub fn exception_message(&self, exception: Value) -> Option<&str> {
        let message = self.cdr(exception).and_then(|rest| self.car(rest)).ok()?;
        self.string_text(message)
    }

    /// The value the exception complains about.
    pub fn exception_irritant(&self, exception: Value) -> Result<Value> {
        self.nth(exception, 2)
    }

    /// The stack trace recorded when the exception was raised, nil if none.
    pub fn exception_trace(&self, exception: Value) -> Result<Value> {
        self.nth(exception, 3)
    }

    fn nth(&self, list: Value, n: usize) -> Result<Value> {
        let mut cursor = list;
        for _ in 0..n {
            cursor = self.cdr(cursor)?;
        }
        self.car(cursor)
    }

    /// Appends `trace` as the fourth element of a runtime exception.
    ///
    /// Exceptions that already carry a trace, or that are not shaped like a
    /// runtime exception, are left alone so a rethrow keeps the original
    /// raise point.
    pub(crate) fn attach_trace(&mut self, exception: Value, trace: Value) -> Result<()> {
        let Value::Exception(head) = exception else {
            return Ok(());
        };
        let Some(last) = self.third_pair(head)? else {
            return Ok(());
        };
        if !self.get(last)?.cdr.is_nil() {
            return Ok(());
        }
        let mut scope = self.root_scope();
        scope.push(exception);
        let tail = scope.cons(trace, Value::Nil)?;
        scope.get_mut(last)?.cdr = tail;
        Ok(())
    }

    fn third_pair(&self, head: PairRef) -> Result<Option<PairRef>> {
        let mut pair = head;
        for _ in 0..2 {
            match self.get(pair)?.cdr {
                Value::Pair(next) => pair = next,
                _ => return Ok(None),
            }
        }
        Ok(Some(pair))
    }
}
