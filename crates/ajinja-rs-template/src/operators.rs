//! Operator semantics for evaluated operands.
//!
//! `and` and `or` are not here: they short-circuit, so the evaluator handles
//! them before the right operand exists.

use std::cmp::Ordering;

use ajinja_rs_core::error::{JinjaError, JinjaResult};

use crate::lexer::Operator;
use crate::parser::UnaryOp;
use crate::value::Value;

/// Numeric view of an arithmetic operand. Only `Int` and `Float` qualify.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    const fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(Self::Int(*i)),
            Value::Float(f) => Some(Self::Float(*f)),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Self::Int(i) => i == 0,
            Self::Float(f) => f == 0.0,
        }
    }
}

/// Applies a binary operator to two evaluated operands.
///
/// # Errors
///
/// Returns [`JinjaError::TypeError`] for unsupported operand types and
/// [`JinjaError::DivisionByZero`] for `/`, `//`, or `%` by zero.
pub fn binary(op: Operator, left: &Value, right: &Value) -> JinjaResult<Value> {
    match op {
        Operator::Eq | Operator::Is => Ok(Value::Bool(left == right)),
        Operator::Ne | Operator::IsNot => Ok(Value::Bool(left != right)),
        Operator::Lt => compare(op, left, right).map(|o| Value::Bool(o == Ordering::Less)),
        Operator::Le => compare(op, left, right).map(|o| Value::Bool(o != Ordering::Greater)),
        Operator::Gt => compare(op, left, right).map(|o| Value::Bool(o == Ordering::Greater)),
        Operator::Ge => compare(op, left, right).map(|o| Value::Bool(o != Ordering::Less)),
        Operator::In => contains(right, left).map(Value::Bool),
        Operator::NotIn => contains(right, left).map(|found| Value::Bool(!found)),
        Operator::Add => add(left, right),
        Operator::Sub => arithmetic(op, left, right, i64::checked_sub, |a, b| a - b),
        Operator::Mul => multiply(left, right),
        Operator::Div => divide(left, right),
        Operator::FloorDiv => floor_divide(left, right),
        Operator::Mod => modulo(left, right),
        Operator::Pow => power(left, right),
        Operator::And | Operator::Or | Operator::Not => Err(JinjaError::SyntaxError(format!(
            "'{}' is not a binary value operator",
            op.symbol()
        ))),
    }
}

/// Applies a prefix operator.
pub fn unary(op: UnaryOp, operand: &Value) -> JinjaResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => Ok(i
            .checked_neg()
            .map_or_else(|| Value::Float(-Num::Int(*i).as_f64()), Value::Int)),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Int(_) | Value::Float(_)) => Ok(operand.clone()),
        (UnaryOp::Neg | UnaryOp::Pos, v) => Err(JinjaError::TypeError(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

fn type_mismatch(op: Operator, left: &Value, right: &Value) -> JinjaError {
    JinjaError::TypeError(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

/// Ordering comparisons coerce both sides to floats.
fn compare(op: Operator, left: &Value, right: &Value) -> JinjaResult<Ordering> {
    let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
        return Err(JinjaError::TypeError(format!(
            "'{}' not supported between '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        )));
    };
    a.partial_cmp(&b).ok_or_else(|| {
        JinjaError::TypeError(format!("'{}' not supported for NaN", op.symbol()))
    })
}

/// Membership test: `item in container`.
fn contains(container: &Value, item: &Value) -> JinjaResult<bool> {
    match container {
        Value::String(haystack) => match item {
            Value::String(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(JinjaError::TypeError(format!(
                "'in <string>' requires string as left operand, not '{}'",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.contains(item)),
        Value::Map(map) => Ok(map.contains_key(&item.to_key_string())),
        Value::Object(obj) => Ok(obj.get_item(item).is_some()),
        other => Err(JinjaError::TypeError(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Int op Int stays Int unless it overflows; any Float operand makes a Float.
fn arithmetic(
    op: Operator,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> JinjaResult<Value> {
    match (Num::of(left), Num::of(right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(int_op(a, b).map_or_else(
            || Value::Float(float_op(Num::Int(a).as_f64(), Num::Int(b).as_f64())),
            Value::Int,
        )),
        (Some(a), Some(b)) => Ok(Value::Float(float_op(a.as_f64(), b.as_f64()))),
        _ => Err(type_mismatch(op, left, right)),
    }
}

fn add(left: &Value, right: &Value) -> JinjaResult<Value> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            let mut joined = a.clone();
            joined.extend_from_slice(b);
            Ok(Value::List(joined))
        }
        _ => arithmetic(Operator::Add, left, right, i64::checked_add, |a, b| a + b),
    }
}

/// Longest string (in bytes) or list that `*` repetition may produce.
pub const MAX_REPEAT_LEN: usize = 16 * 1024 * 1024;

/// Number of copies for `sequence * count`. A count of zero or less, or an
/// empty sequence, yields zero copies.
fn repeat_count(kind: &str, len: usize, count: i64) -> JinjaResult<usize> {
    let times = usize::try_from(count).unwrap_or(0);
    if len == 0 || times == 0 {
        return Ok(0);
    }
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => Err(JinjaError::TypeError(format!(
            "repeating a {kind} of length {len} {count} times exceeds the limit of {MAX_REPEAT_LEN}"
        ))),
    }
}

fn multiply(left: &Value, right: &Value) -> JinjaResult<Value> {
    match (left, right) {
        (Value::String(s), Value::Int(n)) | (Value::Int(n), Value::String(s)) => {
            let times = repeat_count("string", s.len(), *n)?;
            Ok(Value::String(s.repeat(times)))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
            let times = repeat_count("list", items.len(), *n)?;
            let mut out = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                out.extend_from_slice(items);
            }
            Ok(Value::List(out))
        }
        _ => arithmetic(Operator::Mul, left, right, i64::checked_mul, |a, b| a * b),
    }
}

/// Both operands as numbers, failing on a zero divisor.
fn divisor_pair(op: Operator, left: &Value, right: &Value) -> JinjaResult<(Num, Num)> {
    let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) else {
        return Err(type_mismatch(op, left, right));
    };
    if b.is_zero() {
        let what = if op == Operator::Mod { "modulo" } else { "division" };
        return Err(JinjaError::DivisionByZero(format!(
            "{} {what} by zero",
            left.to_display_string()
        )));
    }
    Ok((a, b))
}

fn divide(left: &Value, right: &Value) -> JinjaResult<Value> {
    let (a, b) = divisor_pair(Operator::Div, left, right)?;
    Ok(Value::Float(a.as_f64() / b.as_f64()))
}

fn floor_divide(left: &Value, right: &Value) -> JinjaResult<Value> {
    match divisor_pair(Operator::FloorDiv, left, right)? {
        (Num::Int(a), Num::Int(b)) => {
            let Some(q) = a.checked_div(b) else {
                return Ok(Value::Float((Num::Int(a).as_f64() / Num::Int(b).as_f64()).floor()));
            };
            let adjust = i64::from(a % b != 0 && ((a < 0) != (b < 0)));
            Ok(Value::Int(q - adjust))
        }
        (a, b) => Ok(Value::Float((a.as_f64() / b.as_f64()).floor())),
    }
}

/// Int modulo takes the sign of the divisor; Float modulo is `fmod`.
fn modulo(left: &Value, right: &Value) -> JinjaResult<Value> {
    match divisor_pair(Operator::Mod, left, right)? {
        (Num::Int(a), Num::Int(b)) => {
            let r = a.checked_rem(b).unwrap_or(0);
            Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
        }
        (a, b) => Ok(Value::Float(a.as_f64() % b.as_f64())),
    }
}

fn power(left: &Value, right: &Value) -> JinjaResult<Value> {
    match (Num::of(left), Num::of(right)) {
        (Some(Num::Int(base)), Some(Num::Int(exp))) if exp >= 0 => Ok(u32::try_from(exp)
            .ok()
            .and_then(|e| base.checked_pow(e))
            .map_or_else(
                || Value::Float(Num::Int(base).as_f64().powf(Num::Int(exp).as_f64())),
                Value::Int,
            )),
        (Some(a), Some(b)) => Ok(Value::Float(a.as_f64().powf(b.as_f64()))),
        _ => Err(type_mismatch(Operator::Pow, left, right)),
    }
}
