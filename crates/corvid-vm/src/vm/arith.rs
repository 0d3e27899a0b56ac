//! Arithmetic, comparison and bit operations on values.
//!
//! Integers wrap on overflow. Mixing an integer with a float promotes to
//! float. Nil operands follow the variadic conventions of the language: nil
//! is the identity of `+` and `*`, and `-` with a single operand negates.

use std::cmp::Ordering;

use crate::error::{Error, ExceptionKind, Result};
use crate::gc::heap::Heap;
use crate::runtime::value::Value;

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: Value) -> Option<Num> {
        match value {
            Value::Int(i) => Some(Num::Int(i)),
            Value::Float(x) => Some(Num::Float(x)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(x) => x,
        }
    }
}

fn operands(heap: &mut Heap, op: &str, a: Value, b: Value) -> Result<(Num, Num)> {
    match (Num::of(a), Num::of(b)) {
        (Some(x), Some(y)) => Ok((x, y)),
        (None, _) => Err(type_error(heap, op, a)),
        (_, None) => Err(type_error(heap, op, b)),
    }
}

fn type_error(heap: &mut Heap, op: &str, irritant: Value) -> Error {
    heap.exception(
        ExceptionKind::TypeError,
        &format!("{} expects numbers, got {}", op, irritant.type_name()),
        irritant,
    )
}

fn arity_error(heap: &mut Heap, op: &str) -> Error {
    heap.exception(
        ExceptionKind::ArityError,
        &format!("{} needs two operands", op),
        Value::Nil,
    )
}

fn combine(
    x: Num,
    y: Num,
    int: impl FnOnce(i64, i64) -> i64,
    float: impl FnOnce(f64, f64) -> f64,
) -> Value {
    match (x, y) {
        (Num::Int(a), Num::Int(b)) => Value::Int(int(a, b)),
        _ => Value::Float(float(x.as_f64(), y.as_f64())),
    }
}

/// `+`
pub fn add(heap: &mut Heap, a: Value, b: Value) -> Result<Value> {
    match (a, b) {
        (Value::Nil, Value::Nil) => Ok(Value::Int(0)),
        (Value::Nil, v) | (v, Value::Nil) => match Num::of(v) {
            Some(_) => Ok(v),
            None => Err(type_error(heap, "+", v)),
        },
        _ => {
            let (x, y) = operands(heap, "+", a, b)?;
            Ok(combine(x, y, i64::wrapping_add, |a, b| a + b))
        }
    }
}

/// `-`
pub fn sub(heap: &mut Heap, a: Value, b: Value) -> Result<Value> {
    match (a, b) {
        (Value::Nil, _) => Err(arity_error(heap, "-")),
        (v, Value::Nil) => match Num::of(v) {
            Some(Num::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
            Some(Num::Float(x)) => Ok(Value::Float(-x)),
            None => Err(type_error(heap, "-", v)),
        },
        _ => {
            let (x, y) = operands(heap, "-", a, b)?;
            Ok(combine(x, y, i64::wrapping_sub, |a, b| a - b))
        }
    }
}

/// `*`
pub fn mul(heap: &mut Heap, a: Value, b: Value) -> Result<Value> {
    match (a, b) {
        (Value::Nil, Value::Nil) => Ok(Value::Int(1)),
        (Value::Nil, v) | (v, Value::Nil) => match Num::of(v) {
            Some(_) => Ok(v),
            None => Err(type_error(heap, "*", v)),
        },
        _ => {
            let (x, y) = operands(heap, "*", a, b)?;
            Ok(combine(x, y, i64::wrapping_mul, |a, b| a * b))
        }
    }
}

/// `/`. Always produces a float.
pub fn div(heap: &mut Heap, a: Value, b: Value) -> Result<Value> {
    if a.is_nil() || b.is_nil() {
        return Err(arity_error(heap, "/"));
    }
    let (x, y) = operands(heap, "/", a, b)?;
    let divisor = y.as_f64();
    if divisor == 0.0 {
        return Err(heap.exception(ExceptionKind::DivisionByZero, "division by zero", a));
    }
    Ok(Value::Float(x.as_f64() / divisor))
}

/// `rem`
pub fn rem(heap: &mut Heap, a: Value, b: Value) -> Result<Value> {
    if a.is_nil() || b.is_nil() {
        return Err(arity_error(heap, "rem"));
    }
    let (x, y) = operands(heap, "rem", a, b)?;
    let result = match (x, y) {
        (Num::Int(_), Num::Int(0)) => None,
        (Num::Int(a), Num::Int(b)) => Some(Value::Int(a.wrapping_rem(b))),
        _ => {
            let r = x.as_f64() % y.as_f64();
            (!r.is_nan()).then_some(Value::Float(r))
        }
    };
    result.ok_or_else(|| heap.exception(ExceptionKind::DivisionByZero, "division by zero", a))
}

/// `add/int`: both operands must be integers.
pub fn int_add(heap: &mut Heap, a: Value, b: Value) -> Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_add(y))),
        (Value::Int(_), other) | (other, _) => Err(heap.exception(
            ExceptionKind::TypeError,
            "add/int expects integers",
            other,
        )),
    }
}

/// `inc/int`
pub fn inc_int(heap: &mut Heap, a: Value) -> Result<Value> {
    match a {
        Value::Int(x) => Ok(Value::Int(x.wrapping_add(1))),
        other => Err(heap.exception(
            ExceptionKind::TypeError,
            "inc/int expects an integer",
            other,
        )),
    }
}

/// `zero?`: false for anything that is not a number.
pub fn is_zero(a: Value) -> bool {
    match a {
        Value::Int(i) => i == 0,
        Value::Float(x) => x == 0.0,
        _ => false,
    }
}

/// `==`: numbers compare by value across int and float, strings by
/// contents, everything else by identity.
pub fn equal(heap: &Heap, a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => x as f64 == y,
        (Value::String(_), Value::String(_)) => {
            heap.string_text(a).is_some() && heap.string_text(a) == heap.string_text(b)
        }
        _ => a == b,
    }
}

/// Orders two values for `<`, `<=`, `>=` and `>`.
///
/// Numbers, strings and symbols (by name) are comparable among themselves.
/// `Ok(None)` means the operands are comparable but unordered, which only
/// happens with NaN.
pub fn compare(heap: &mut Heap, a: Value, b: Value) -> Result<Option<Ordering>> {
    if let (Some(x), Some(y)) = (Num::of(a), Num::of(b)) {
        return Ok(match (x, y) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
            _ => x.as_f64().partial_cmp(&y.as_f64()),
        });
    }
    let ordering = match (a, b) {
        (Value::String(_), Value::String(_)) => heap
            .string_text(a)
            .zip(heap.string_text(b))
            .map(|(x, y)| x.cmp(y)),
        (Value::Symbol(x), Value::Symbol(y)) => heap
            .symbol_name(x)
            .ok()
            .zip(heap.symbol_name(y).ok())
            .map(|(x, y)| x.cmp(y)),
        _ => None,
    };
    match ordering {
        Some(ordering) => Ok(Some(ordering)),
        None => Err(heap.exception(
            ExceptionKind::TypeError,
            &format!("can't compare {} with {}", a.type_name(), b.type_name()),
            b,
        )),
    }
}

/// Bitwise operators on integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    /// Shift left
    Shl,
    /// Arithmetic shift right
    Shr,
    /// And
    And,
    /// Or
    Or,
    /// Exclusive or
    Xor,
}

/// Applies a binary bit operation. Shift counts outside `0..64` saturate.
pub fn bits(heap: &mut Heap, op: BitOp, a: Value, b: Value) -> Result<Value> {
    let (Value::Int(x), Value::Int(y)) = (a, b) else {
        let irritant = if matches!(a, Value::Int(_)) { b } else { a };
        return Err(heap.exception(
            ExceptionKind::TypeError,
            "bit operations expect integers",
            irritant,
        ));
    };
    let shift = y.clamp(0, 63) as u32;
    Ok(Value::Int(match op {
        BitOp::Shl if y >= 64 => 0,
        BitOp::Shl => x << shift,
        BitOp::Shr => x >> shift,
        BitOp::And => x & y,
        BitOp::Or => x | y,
        BitOp::Xor => x ^ y,
    }))
}

/// `bit/not`
pub fn bit_not(heap: &mut Heap, a: Value) -> Result<Value> {
    match a {
        Value::Int(x) => Ok(Value::Int(!x)),
        other => Err(heap.exception(
            ExceptionKind::TypeError,
            "bit operations expect integers",
            other,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapConfig;

    fn heap() -> Heap {
        Heap::new(HeapConfig::small()).unwrap()
    }

    fn kind(heap: &Heap, result: Result<Value>) -> Option<ExceptionKind> {
        heap.exception_kind(result.unwrap_err().thrown()?)
    }

    #[test]
    fn test_promotion_and_wrapping() {
        let mut h = heap();
        assert_eq!(add(&mut h, Value::Int(2), Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(
            add(&mut h, Value::Int(2), Value::Float(0.5)).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            add(&mut h, Value::Int(i64::MAX), Value::Int(1)).unwrap(),
            Value::Int(i64::MIN)
        );
        assert_eq!(mul(&mut h, Value::Int(4), Value::Int(5)).unwrap(), Value::Int(20));
    }

    #[test]
    fn test_nil_operands() {
        let mut h = heap();
        assert_eq!(add(&mut h, Value::Nil, Value::Nil).unwrap(), Value::Int(0));
        assert_eq!(add(&mut h, Value::Int(7), Value::Nil).unwrap(), Value::Int(7));
        assert_eq!(mul(&mut h, Value::Nil, Value::Nil).unwrap(), Value::Int(1));
        assert_eq!(sub(&mut h, Value::Int(7), Value::Nil).unwrap(), Value::Int(-7));
        let r = sub(&mut h, Value::Nil, Value::Int(1));
        assert_eq!(kind(&h, r), Some(ExceptionKind::ArityError));
        let r = div(&mut h, Value::Int(1), Value::Nil);
        assert_eq!(kind(&h, r), Some(ExceptionKind::ArityError));
    }

    #[test]
    fn test_division() {
        let mut h = heap();
        assert_eq!(div(&mut h, Value::Int(7), Value::Int(2)).unwrap(), Value::Float(3.5));
        let r = div(&mut h, Value::Int(1), Value::Int(0));
        assert_eq!(kind(&h, r), Some(ExceptionKind::DivisionByZero));
        let r = div(&mut h, Value::Float(1.0), Value::Float(0.0));
        assert_eq!(kind(&h, r), Some(ExceptionKind::DivisionByZero));
    }

    #[test]
    fn test_remainder() {
        let mut h = heap();
        assert_eq!(rem(&mut h, Value::Int(7), Value::Int(3)).unwrap(), Value::Int(1));
        assert_eq!(rem(&mut h, Value::Int(-7), Value::Int(3)).unwrap(), Value::Int(-1));
        assert_eq!(
            rem(&mut h, Value::Float(7.5), Value::Int(2)).unwrap(),
            Value::Float(1.5)
        );
        let r = rem(&mut h, Value::Int(7), Value::Int(0));
        assert_eq!(kind(&h, r), Some(ExceptionKind::DivisionByZero));
        let r = rem(&mut h, Value::Float(7.0), Value::Float(0.0));
        assert_eq!(kind(&h, r), Some(ExceptionKind::DivisionByZero));
    }

    #[test]
    fn test_non_numbers_are_type_errors() {
        let mut h = heap();
        let r = add(&mut h, Value::Int(1), Value::Bool(true));
        assert_eq!(kind(&h, r), Some(ExceptionKind::TypeError));
        let r = inc_int(&mut h, Value::Float(1.0));
        assert_eq!(kind(&h, r), Some(ExceptionKind::TypeError));
        let r = int_add(&mut h, Value::Int(1), Value::Float(1.0));
        assert_eq!(kind(&h, r), Some(ExceptionKind::TypeError));
    }

    #[test]
    fn test_equality() {
        let mut h = heap();
        let a = h.string("abc").unwrap();
        h.roots_mut().push(a);
        let b = h.string("abc").unwrap();
        assert!(equal(&h, a, b));
        assert!(equal(&h, Value::Int(2), Value::Float(2.0)));
        assert!(!equal(&h, Value::Int(2), Value::Bool(true)));
        assert!(equal(&h, Value::Nil, Value::Nil));
    }

    #[test]
    fn test_ordering() {
        let mut h = heap();
        assert_eq!(
            compare(&mut h, Value::Int(1), Value::Float(1.5)).unwrap(),
            Some(Ordering::Less)
        );
        let apple = h.symbol("apple").unwrap();
        let pear = h.symbol("pear").unwrap();
        assert_eq!(compare(&mut h, pear, apple).unwrap(), Some(Ordering::Greater));
        assert_eq!(
            compare(&mut h, Value::Float(f64::NAN), Value::Int(1)).unwrap(),
            None
        );
        let r = compare(&mut h, Value::Int(1), apple).map(|_| Value::Nil);
        assert_eq!(kind(&h, r), Some(ExceptionKind::TypeError));
    }

    #[test]
    fn test_bits() {
        let mut h = heap();
        assert_eq!(
            bits(&mut h, BitOp::Shl, Value::Int(1), Value::Int(4)).unwrap(),
            Value::Int(16)
        );
        assert_eq!(
            bits(&mut h, BitOp::Shr, Value::Int(-16), Value::Int(2)).unwrap(),
            Value::Int(-4)
        );
        assert_eq!(
            bits(&mut h, BitOp::Shl, Value::Int(1), Value::Int(99)).unwrap(),
            Value::Int(0)
        );
        assert_eq!(bit_not(&mut h, Value::Int(0)).unwrap(), Value::Int(-1));
        assert_eq!(
            bits(&mut h, BitOp::Xor, Value::Int(6), Value::Int(3)).unwrap(),
            Value::Int(5)
        );
    }
}
