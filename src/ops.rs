//! Operator dispatch.
//!
//! Every operator first asks the left operand whether it implements the operation for the right
//! one. When it does not and the operands are of different classes, the reversed form is probed on
//! the right operand. User classes take part through `operator` members stored on the class under
//! [`binary_key`], [`unary_key`] and [`Conversion::key`]; a user operator returning `nil` is
//! treated as "not implemented".

use std::cmp::Ordering;
use std::rc::Rc;

use crate::ast::{BinaryOp, UnaryOp};
use crate::class::Instance;
use crate::error::{index_error, type_error, value_error, zero_division, RuntimeError};
use crate::interpreter::Interpreter;
use crate::object::Value;

/// `Ok(None)`: the operand does not implement the operation for these arguments.
type Probe = Result<Option<Value>, RuntimeError>;

pub fn binary_key(op: BinaryOp) -> String {
    format!("operator {}", op.symbol())
}

pub fn unary_key(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "operator neg",
        UnaryOp::Pos => "operator pos",
        UnaryOp::Invert => "operator ~",
    }
}

pub const INDEX_KEY: &str = "operator []";
pub const SET_INDEX_KEY: &str = "operator []=";

/// Single-operand operators with a fixed result class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Len,
    Int,
    Bool,
    Str,
    Repr,
}

impl Conversion {
    pub const ALL: [Conversion; 5] =
        [Conversion::Len, Conversion::Int, Conversion::Bool, Conversion::Str, Conversion::Repr];

    pub fn symbol(self) -> &'static str {
        match self {
            Conversion::Len => "len",
            Conversion::Int => "int",
            Conversion::Bool => "bool",
            Conversion::Str => "str",
            Conversion::Repr => "repr",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.symbol() == symbol)
    }

    pub fn key(self) -> &'static str {
        match self {
            Conversion::Len => "operator len",
            Conversion::Int => "operator int",
            Conversion::Bool => "operator bool",
            Conversion::Str => "operator str",
            Conversion::Repr => "operator repr",
        }
    }

    /// Name of the class the operator must return.
    pub fn result_class(self) -> &'static str {
        match self {
            Conversion::Len | Conversion::Int => "int",
            Conversion::Bool => "bool",
            Conversion::Str | Conversion::Repr => "str",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Conversion::Len | Conversion::Int => matches!(value, Value::Int(_)),
            Conversion::Bool => matches!(value, Value::Bool(_)),
            Conversion::Str | Conversion::Repr => matches!(value, Value::Str(_)),
        }
    }
}

pub fn binary(
    interpreter: &mut Interpreter,
    op: BinaryOp,
    left: &Value,
    right: &Value,
) -> Result<Value, RuntimeError> {
    if let Some(value) = probe(interpreter, op, left, right)? {
        return Ok(value);
    }
    if !left.same_class(right) {
        if let Some(value) = probe_reversed(interpreter, op, left, right)? {
            return Ok(value);
        }
    }
    if let Some(same) = identity(left, right) {
        match op {
            BinaryOp::Eq => return Ok(Value::Bool(same)),
            BinaryOp::Ne => return Ok(Value::Bool(!same)),
            _ => {}
        }
    }

    Err(type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    )))
}

/// Language level `==`, as a Rust bool.
pub fn equals(interpreter: &mut Interpreter, left: &Value, right: &Value) -> Result<bool, RuntimeError> {
    let result = binary(interpreter, BinaryOp::Eq, left, right)?;
    truthy(interpreter, &result)
}

fn probe(interpreter: &mut Interpreter, op: BinaryOp, left: &Value, right: &Value) -> Probe {
    match left {
        Value::Instance(instance) => user_binary(interpreter, op, instance, left, right),
        _ => builtin(interpreter, op, left, right),
    }
}

fn probe_reversed(interpreter: &mut Interpreter, op: BinaryOp, left: &Value, right: &Value) -> Probe {
    match right {
        // `a + b` becomes `b + a`, `a < b` becomes `b > a`.
        Value::Instance(instance) => match op.mirrored() {
            Some(mirrored) => user_binary(interpreter, mirrored, instance, right, left),
            None => Ok(None),
        },
        _ => builtin_reversed(op, left, right),
    }
}

fn user_binary(
    interpreter: &mut Interpreter,
    op: BinaryOp,
    instance: &Instance,
    receiver: &Value,
    other: &Value,
) -> Probe {
    if let Some(method) = instance.class.find_attribute(&binary_key(op)) {
        let result = interpreter.call_method(&method, receiver.clone(), vec![other.clone()])?;
        return Ok((!result.is_nil()).then_some(result));
    }

    if op == BinaryOp::Ne {
        if let Some(equal) = user_binary(interpreter, BinaryOp::Eq, instance, receiver, other)? {
            return Ok(Some(Value::Bool(!truthy(interpreter, &equal)?)));
        }
    }
    Ok(None)
}

fn builtin(interpreter: &mut Interpreter, op: BinaryOp, left: &Value, right: &Value) -> Probe {
    match (left, right) {
        (Value::Nil, _) => Ok(nil_equality(op, right)),
        (_, _) if owns_numeric(left, right) => numeric(op, left, right),
        (Value::Str(l), Value::Str(r)) => Ok(match op {
            BinaryOp::Add => Some(Value::str(&format!("{l}{r}"))),
            _ => compare(op, l.cmp(r)),
        }),
        (Value::Str(s), Value::Int(n)) if op == BinaryOp::Mul => repeat_str(s, *n).map(Some),
        (Value::List(l), Value::List(r)) => {
            let (l, r) = (l.borrow().clone(), r.borrow().clone());
            sequence(interpreter, op, &l, &r, Value::list)
        }
        (Value::List(l), Value::Int(n)) if op == BinaryOp::Mul => {
            repeat(l.borrow().as_slice(), *n).map(|v| Some(Value::list(v)))
        }
        (Value::Tuple(l), Value::Tuple(r)) => sequence(interpreter, op, l, r, Value::tuple),
        (Value::Tuple(l), Value::Int(n)) if op == BinaryOp::Mul => repeat(&l[..], *n).map(|v| Some(Value::tuple(v))),
        _ => Ok(None),
    }
}

/// Reversed forms of the built-in kinds. The operand order is preserved.
fn builtin_reversed(op: BinaryOp, left: &Value, right: &Value) -> Probe {
    match (left, right) {
        (_, Value::Nil) => Ok(nil_equality(op, left)),
        (_, _) if owns_numeric(right, left) => numeric(op, left, right),
        (Value::Int(n), Value::Str(s)) if op == BinaryOp::Mul => repeat_str(s, *n).map(Some),
        (Value::Int(n), Value::List(l)) if op == BinaryOp::Mul => {
            repeat(l.borrow().as_slice(), *n).map(|v| Some(Value::list(v)))
        }
        (Value::Int(n), Value::Tuple(t)) if op == BinaryOp::Mul => repeat(&t[..], *n).map(|v| Some(Value::tuple(v))),
        _ => Ok(None),
    }
}

/// `nil` compares equal only to itself, and can be compared to anything.
fn nil_equality(op: BinaryOp, other: &Value) -> Option<Value> {
    match op {
        BinaryOp::Eq => Some(Value::Bool(other.is_nil())),
        BinaryOp::Ne => Some(Value::Bool(!other.is_nil())),
        _ => None,
    }
}

fn numeric_rank(value: &Value) -> Option<u8> {
    match value {
        Value::Bool(_) => Some(0),
        Value::Int(_) => Some(1),
        Value::Real(_) => Some(2),
        _ => None,
    }
}

/// Whether `owner` handles arithmetic against `other`: a numeric kind handles every numeric
/// kind at or below its own rank (`bool` < `int` < `real`).
fn owns_numeric(owner: &Value, other: &Value) -> bool {
    matches!((numeric_rank(owner), numeric_rank(other)), (Some(a), Some(b)) if a >= b)
}

fn numeric(op: BinaryOp, left: &Value, right: &Value) -> Probe {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(match op {
            BinaryOp::BitAnd => Some(Value::Bool(a & b)),
            BinaryOp::BitOr => Some(Value::Bool(a | b)),
            BinaryOp::BitXor => Some(Value::Bool(a ^ b)),
            _ => return int_op(op, *a as i64, *b as i64),
        }),
        (Value::Real(_), _) | (_, Value::Real(_)) => real_op(op, as_real(left), as_real(right)),
        _ => int_op(op, as_int(left), as_int(right)),
    }
}

fn as_int(value: &Value) -> i64 {
    match value {
        Value::Bool(b) => *b as i64,
        Value::Int(n) => *n,
        _ => 0,
    }
}

fn as_real(value: &Value) -> f64 {
    match value {
        Value::Real(n) => *n,
        _ => as_int(value) as f64,
    }
}

fn overflow() -> RuntimeError {
    value_error("integer overflow")
}

fn shift_amount(n: i64) -> Result<u32, RuntimeError> {
    match u32::try_from(n) {
        Ok(n) if n < 64 => Ok(n),
        _ => Err(value_error(format!("shift count out of range: {n}"))),
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> Probe {
    let value = match op {
        BinaryOp::Add => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
        BinaryOp::Sub => Value::Int(a.checked_sub(b).ok_or_else(overflow)?),
        BinaryOp::Mul => Value::Int(a.checked_mul(b).ok_or_else(overflow)?),
        BinaryOp::Div => {
            if b == 0 {
                return Err(zero_division());
            }
            Value::Int(a.checked_div(b).ok_or_else(overflow)?)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(zero_division());
            }
            // Only `i64::MIN % -1` fails here, and its remainder is 0.
            Value::Int(a.checked_rem(b).unwrap_or(0))
        }
        BinaryOp::Pow => int_pow(a, b)?,
        BinaryOp::Shl => {
            let shift = shift_amount(b)?;
            let shifted = a.wrapping_shl(shift);
            if shifted >> shift != a {
                return Err(overflow());
            }
            Value::Int(shifted)
        }
        BinaryOp::Shr => Value::Int(a >> shift_amount(b)?),
        BinaryOp::BitAnd => Value::Int(a & b),
        BinaryOp::BitOr => Value::Int(a | b),
        BinaryOp::BitXor => Value::Int(a ^ b),
        _ => return Ok(compare(op, a.cmp(&b))),
    };
    Ok(Some(value))
}

fn int_pow(base: i64, exponent: i64) -> Result<Value, RuntimeError> {
    if exponent >= 0 {
        let exponent = u32::try_from(exponent).map_err(|_| overflow())?;
        return base.checked_pow(exponent).map(Value::Int).ok_or_else(overflow);
    }
    if base == 0 {
        return Err(zero_division());
    }
    Ok(Value::Real((base as f64).powf(exponent as f64)))
}

fn real_op(op: BinaryOp, a: f64, b: f64) -> Probe {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => return Err(zero_division()),
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division());
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(value_error("negative number cannot be raised to a fractional power"));
            }
            a.powf(b)
        }
        BinaryOp::Eq => return Ok(Some(Value::Bool(a == b))),
        BinaryOp::Ne => return Ok(Some(Value::Bool(a != b))),
        BinaryOp::Lt => return Ok(Some(Value::Bool(a < b))),
        BinaryOp::Le => return Ok(Some(Value::Bool(a <= b))),
        BinaryOp::Gt => return Ok(Some(Value::Bool(a > b))),
        BinaryOp::Ge => return Ok(Some(Value::Bool(a >= b))),
        _ => return Ok(None),
    };
    Ok(Some(Value::Real(value)))
}

fn compare(op: BinaryOp, ordering: Ordering) -> Option<Value> {
    let result = match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => return None,
    };
    Some(Value::Bool(result))
}

/// Upper bound on the length of a sequence built by `*`.
const MAX_REPEAT_LEN: usize = 1 << 28;

fn repeated_len(len: usize, times: i64) -> Result<usize, RuntimeError> {
    let times = usize::try_from(times).unwrap_or(0);
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => Err(value_error("repeated sequence is too long")),
    }
}

fn repeat<T: Clone>(items: &[T], times: i64) -> Result<Vec<T>, RuntimeError> {
    let times = repeated_len(items.len(), times)?;
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn repeat_str(s: &str, times: i64) -> Result<Value, RuntimeError> {
    let times = repeated_len(s.len(), times)?;
    Ok(Value::str(&s.repeat(times)))
}

fn sequence(
    interpreter: &mut Interpreter,
    op: BinaryOp,
    left: &[Value],
    right: &[Value],
    make: fn(Vec<Value>) -> Value,
) -> Probe {
    match op {
        BinaryOp::Add => Ok(Some(make(left.iter().chain(right).cloned().collect()))),
        BinaryOp::Eq | BinaryOp::Ne => {
            let mut same = left.len() == right.len();
            if same {
                for (a, b) in left.iter().zip(right) {
                    if !equals(interpreter, a, b)? {
                        same = false;
                        break;
                    }
                }
            }
            Ok(Some(Value::Bool(same == (op == BinaryOp::Eq))))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            for (a, b) in left.iter().zip(right) {
                if !equals(interpreter, a, b)? {
                    return binary(interpreter, op, a, b).map(Some);
                }
            }
            Ok(compare(op, left.len().cmp(&right.len())))
        }
        _ => Ok(None),
    }
}

/// Identity of reference values of the same kind, `None` for anything else.
fn identity(left: &Value, right: &Value) -> Option<bool> {
    let same = match (left, right) {
        (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
        (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
        (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
        (Value::BoundMethod(a), Value::BoundMethod(b)) => Rc::ptr_eq(a, b),
        (
            Value::Function(_) | Value::Native(_) | Value::BoundMethod(_),
            Value::Function(_) | Value::Native(_) | Value::BoundMethod(_),
        ) => false,
        _ => return None,
    };
    Some(same)
}

pub fn unary(interpreter: &mut Interpreter, op: UnaryOp, value: &Value) -> Result<Value, RuntimeError> {
    let result = match (op, value) {
        (_, Value::Instance(instance)) => match instance.class.find_attribute(unary_key(op)) {
            Some(method) => {
                let result = interpreter.call_method(&method, value.clone(), vec![])?;
                (!result.is_nil()).then_some(result)
            }
            None => None,
        },
        (UnaryOp::Neg, Value::Int(n)) => Some(Value::Int(n.checked_neg().ok_or_else(overflow)?)),
        (UnaryOp::Neg, Value::Real(n)) => Some(Value::Real(-n)),
        (UnaryOp::Neg, Value::Bool(b)) => Some(Value::Int(-(*b as i64))),
        (UnaryOp::Pos, Value::Int(_) | Value::Real(_)) => Some(value.clone()),
        (UnaryOp::Pos, Value::Bool(b)) => Some(Value::Int(*b as i64)),
        (UnaryOp::Invert, Value::Int(n)) => Some(Value::Int(!n)),
        (UnaryOp::Invert, Value::Bool(b)) => Some(Value::Int(!(*b as i64))),
        _ => None,
    };

    result.ok_or_else(|| {
        type_error(format!("bad operand type for unary {}: '{}'", op.symbol(), value.type_name()))
    })
}

/// Run a user conversion operator if the value defines one, checking its result class.
fn user_conversion(
    interpreter: &mut Interpreter,
    value: &Value,
    conversion: Conversion,
) -> Result<Option<Value>, RuntimeError> {
    let Value::Instance(instance) = value else {
        return Ok(None);
    };
    let Some(method) = instance.class.find_attribute(conversion.key()) else {
        return Ok(None);
    };

    let result = interpreter.call_method(&method, value.clone(), vec![])?;
    if !conversion.accepts(&result) {
        return Err(type_error(format!(
            "operator {} of '{}' returned '{}', expected '{}'",
            conversion.symbol(),
            instance.class.name,
            result.type_name(),
            conversion.result_class()
        )));
    }
    Ok(Some(result))
}

/// Apply a conversion operator that the value must define.
pub fn convert(
    interpreter: &mut Interpreter,
    value: &Value,
    conversion: Conversion,
) -> Result<Value, RuntimeError> {
    user_conversion(interpreter, value, conversion)?.ok_or_else(|| {
        type_error(format!("'{}' does not define operator {}", value.type_name(), conversion.symbol()))
    })
}

pub fn truthy(interpreter: &mut Interpreter, value: &Value) -> Result<bool, RuntimeError> {
    let truth = match value {
        Value::Nil => false,
        Value::Bool(b) => *b,
        Value::Int(n) => *n != 0,
        Value::Real(n) => *n != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::List(values) => !values.borrow().is_empty(),
        Value::Tuple(values) => !values.is_empty(),
        Value::Instance(_) => match user_conversion(interpreter, value, Conversion::Bool)? {
            Some(Value::Bool(b)) => b,
            _ => true,
        },
        _ => true,
    };
    Ok(truth)
}

pub fn length(interpreter: &mut Interpreter, value: &Value) -> Result<i64, RuntimeError> {
    let length = match value {
        Value::Str(s) => s.chars().count(),
        Value::List(values) => values.borrow().len(),
        Value::Tuple(values) => values.len(),
        _ => match user_conversion(interpreter, value, Conversion::Len)? {
            Some(Value::Int(n)) => return Ok(n),
            _ => {
                return Err(type_error(format!("object of type '{}' has no len()", value.type_name())))
            }
        },
    };
    Ok(length as i64)
}

fn normalize_index(index: &Value, len: usize, kind: &str) -> Result<usize, RuntimeError> {
    let Value::Int(i) = index else {
        return Err(type_error(format!("{kind} indices must be int, not {}", index.type_name())));
    };

    let len = len as i64;
    let position = if *i < 0 { i + len } else { *i };
    if position < 0 || position >= len {
        return Err(index_error(format!("{kind} index out of range")));
    }
    Ok(position as usize)
}

pub fn index(interpreter: &mut Interpreter, object: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match object {
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(index, chars.len(), "str")?;
            Ok(Value::str(&chars[i].to_string()))
        }
        Value::List(values) => {
            let values = values.borrow();
            let i = normalize_index(index, values.len(), "list")?;
            Ok(values[i].clone())
        }
        Value::Tuple(values) => {
            let i = normalize_index(index, values.len(), "tuple")?;
            Ok(values[i].clone())
        }
        Value::Instance(instance) => match instance.class.find_attribute(INDEX_KEY) {
            Some(method) => interpreter.call_method(&method, object.clone(), vec![index.clone()]),
            None => Err(type_error(format!("'{}' object is not subscriptable", object.type_name()))),
        },
        _ => Err(type_error(format!("'{}' object is not subscriptable", object.type_name()))),
    }
}

/// Clamp slice bounds into `0..=len`. `nil` stands for an omitted bound.
fn slice_bounds(start: &Value, end: &Value, len: usize) -> Result<(usize, usize), RuntimeError> {
    let len = len as i64;
    let bound = |value: &Value, default: i64| match value {
        Value::Nil => Ok(default),
        Value::Int(i) if *i < 0 => Ok((i + len).max(0)),
        Value::Int(i) => Ok((*i).min(len)),
        other => {
            Err(type_error(format!("slice indices must be int or nil, not {}", other.type_name())))
        }
    };

    let start = bound(start, 0)?;
    let end = bound(end, len)?.max(start);
    Ok((start as usize, end as usize))
}

pub fn slice(object: &Value, start: &Value, end: &Value) -> Result<Value, RuntimeError> {
    match object {
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(start, end, chars.len())?;
            Ok(Value::str(&chars[start..end].iter().collect::<String>()))
        }
        Value::List(values) => {
            let values = values.borrow();
            let (start, end) = slice_bounds(start, end, values.len())?;
            Ok(Value::list(values[start..end].to_vec()))
        }
        Value::Tuple(values) => {
            let (start, end) = slice_bounds(start, end, values.len())?;
            Ok(Value::tuple(values[start..end].to_vec()))
        }
        _ => Err(type_error(format!("'{}' object is not sliceable", object.type_name()))),
    }
}

/// Store `value` at `index`, in place.
pub fn set_index(
    interpreter: &mut Interpreter,
    object: &Value,
    index: &Value,
    value: Value,
) -> Result<(), RuntimeError> {
    match object {
        Value::List(values) => {
            let len = values.borrow().len();
            let i = normalize_index(index, len, "list")?;
            values.borrow_mut()[i] = value.copy_for_binding();
            Ok(())
        }
        Value::Instance(instance) => match instance.class.find_attribute(SET_INDEX_KEY) {
            Some(method) => {
                interpreter.call_method(&method, object.clone(), vec![index.clone(), value])?;
                Ok(())
            }
            None => Err(no_item_assignment(object)),
        },
        _ => Err(no_item_assignment(object)),
    }
}

fn no_item_assignment(object: &Value) -> RuntimeError {
    type_error(format!("'{}' object does not support item assignment", object.type_name()))
}

/// The elements of a sequence, for unpacking and the `list`/`tuple` converters.
pub fn elements(interpreter: &mut Interpreter, value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(&c.to_string())).collect()),
        Value::List(values) => Ok(values.borrow().clone()),
        Value::Tuple(values) => Ok(values.to_vec()),
        Value::Instance(instance) if instance.class.find_attribute(INDEX_KEY).is_some() => {
            let len = length(interpreter, value)?;
            let mut out = Vec::with_capacity(len.max(0) as usize);
            for i in 0..len {
                out.push(self::index(interpreter, value, &Value::Int(i))?);
            }
            Ok(out)
        }
        _ => Err(type_error(format!("'{}' object is not iterable", value.type_name()))),
    }
}

fn join_repr(interpreter: &mut Interpreter, values: &[Value]) -> Result<String, RuntimeError> {
    let mut parts = Vec::with_capacity(values.len());
    for value in values {
        parts.push(repr(interpreter, value)?);
    }
    Ok(parts.join(", "))
}

/// Text produced by `print` and `str(x)`.
pub fn to_str(interpreter: &mut Interpreter, value: &Value) -> Result<String, RuntimeError> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        Value::Instance(_) => {
            if let Some(Value::Str(s)) = user_conversion(interpreter, value, Conversion::Str)? {
                return Ok(s.to_string());
            }
            repr(interpreter, value)
        }
        Value::List(values) => {
            let values = values.borrow().clone();
            Ok(format!("[{}]", join_repr(interpreter, &values)?))
        }
        Value::Tuple(values) if values.len() == 1 => Ok(format!("({},)", repr(interpreter, &values[0])?)),
        Value::Tuple(values) => Ok(format!("({})", join_repr(interpreter, values)?)),
        _ => Ok(value.to_string()),
    }
}

/// Text produced by `repr(x)`; strings are quoted.
pub fn repr(interpreter: &mut Interpreter, value: &Value) -> Result<String, RuntimeError> {
    match value {
        Value::Str(s) => Ok(format!("{s:?}")),
        Value::Instance(_) => match user_conversion(interpreter, value, Conversion::Repr)? {
            Some(Value::Str(s)) => Ok(s.to_string()),
            _ => Ok(value.to_string()),
        },
        Value::List(_) | Value::Tuple(_) => to_str(interpreter, value),
        _ => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn eval(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
        let mut interpreter = Interpreter::new();
        binary(&mut interpreter, op, &left, &right)
    }

    fn kind_of(result: Result<Value, RuntimeError>) -> Option<ErrorKind> {
        result.expect_err("operation should fail").kind()
    }

    #[test]
    fn equals_and_not_equals_are_complementary() {
        let pairs = [
            (Value::Int(3), Value::Int(3)),
            (Value::Int(3), Value::Int(4)),
            (Value::Real(0.5), Value::Real(0.5)),
            (Value::Real(0.5), Value::Real(1.5)),
            (Value::Bool(true), Value::Bool(false)),
        ];
        for (l, r) in pairs {
            let eq = eval(BinaryOp::Eq, l.clone(), r.clone()).unwrap();
            let ne = eval(BinaryOp::Ne, l, r).unwrap();
            assert_ne!(eq, ne);
        }
    }

    #[test]
    fn add_and_sub_are_inverse() {
        for (a, b) in [(7, 3), (-2, 10), (0, 0)] {
            let sum = eval(BinaryOp::Add, Value::Int(a), Value::Int(b)).unwrap();
            assert_eq!(eval(BinaryOp::Sub, sum, Value::Int(b)).unwrap(), Value::Int(a));
        }
        let sum = eval(BinaryOp::Add, Value::Real(1.25), Value::Real(2.5)).unwrap();
        assert_eq!(eval(BinaryOp::Sub, sum, Value::Real(2.5)).unwrap(), Value::Real(1.25));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        for op in [BinaryOp::Div, BinaryOp::Mod] {
            assert_eq!(kind_of(eval(op, Value::Int(1), Value::Int(0))), Some(ErrorKind::ZeroDivision));
            assert_eq!(kind_of(eval(op, Value::Real(1.0), Value::Real(0.0))), Some(ErrorKind::ZeroDivision));
            assert_eq!(kind_of(eval(op, Value::Int(1), Value::Bool(false))), Some(ErrorKind::ZeroDivision));
            assert_eq!(kind_of(eval(op, Value::Real(1.0), Value::Int(0))), Some(ErrorKind::ZeroDivision));
        }
    }

    #[test]
    fn integer_division_truncates() {
        assert_eq!(eval(BinaryOp::Div, Value::Int(7), Value::Int(2)).unwrap(), Value::Int(3));
        assert_eq!(eval(BinaryOp::Div, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(-3));
        assert_eq!(eval(BinaryOp::Mod, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(-1));
    }

    #[test]
    fn numeric_promotion() {
        assert_eq!(eval(BinaryOp::Add, Value::Int(1), Value::Real(0.5)).unwrap(), Value::Real(1.5));
        assert_eq!(eval(BinaryOp::Add, Value::Real(0.5), Value::Int(1)).unwrap(), Value::Real(1.5));
        assert_eq!(eval(BinaryOp::Add, Value::Bool(true), Value::Int(1)).unwrap(), Value::Int(2));
        assert_eq!(eval(BinaryOp::Add, Value::Bool(true), Value::Bool(true)).unwrap(), Value::Int(2));
        assert_eq!(eval(BinaryOp::Sub, Value::Int(1), Value::Bool(true)).unwrap(), Value::Int(0));
        assert_eq!(eval(BinaryOp::Eq, Value::Int(1), Value::Real(1.0)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn overflow_and_powers() {
        assert_eq!(kind_of(eval(BinaryOp::Add, Value::Int(i64::MAX), Value::Int(1))), Some(ErrorKind::Value));
        assert_eq!(kind_of(eval(BinaryOp::Shl, Value::Int(1), Value::Int(64))), Some(ErrorKind::Value));
        assert_eq!(eval(BinaryOp::Pow, Value::Int(2), Value::Int(10)).unwrap(), Value::Int(1024));
        assert_eq!(eval(BinaryOp::Pow, Value::Int(2), Value::Int(-1)).unwrap(), Value::Real(0.5));
        assert_eq!(kind_of(eval(BinaryOp::Pow, Value::Int(0), Value::Int(-1))), Some(ErrorKind::ZeroDivision));
        assert_eq!(kind_of(eval(BinaryOp::Pow, Value::Real(-8.0), Value::Real(0.5))), Some(ErrorKind::Value));
    }

    #[test]
    fn sequences() {
        assert_eq!(eval(BinaryOp::Add, Value::str("ab"), Value::str("c")).unwrap(), Value::str("abc"));
        assert_eq!(eval(BinaryOp::Mul, Value::Int(3), Value::str("ab")).unwrap(), Value::str("ababab"));
        assert_eq!(
            eval(BinaryOp::Mul, Value::list(vec![Value::Int(1)]), Value::Int(2)).unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(1)])
        );
        assert_eq!(
            eval(BinaryOp::Lt, Value::list(vec![Value::Int(1), Value::Int(2)]), Value::list(vec![Value::Int(1), Value::Int(3)]))
                .unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval(BinaryOp::Lt, Value::tuple(vec![Value::Int(1)]), Value::tuple(vec![Value::Int(1), Value::Int(0)]))
                .unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn oversized_repetition_is_an_error() {
        let huge = Value::Int(i64::MAX);
        assert_eq!(kind_of(eval(BinaryOp::Mul, Value::str("ab"), huge.clone())), Some(ErrorKind::Value));
        assert_eq!(kind_of(eval(BinaryOp::Mul, huge, Value::str("ab"))), Some(ErrorKind::Value));

        let pair = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let err = eval(BinaryOp::Mul, pair, Value::Int(1 << 62)).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: repeated sequence is too long");
        let single = Value::tuple(vec![Value::Nil]);
        assert_eq!(kind_of(eval(BinaryOp::Mul, Value::Int(1 << 40), single)), Some(ErrorKind::Value));

        // Negative counts still give an empty sequence.
        assert_eq!(eval(BinaryOp::Mul, Value::str("ab"), Value::Int(-3)).unwrap(), Value::str(""));
    }

    #[test]
    fn unrelated_kinds_are_unsupported() {
        let err = eval(BinaryOp::Add, Value::Int(1), Value::str("a")).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: unsupported operand type(s) for +: 'int' and 'str'");
        assert_eq!(kind_of(eval(BinaryOp::Eq, Value::Int(1), Value::str("1"))), Some(ErrorKind::Type));
    }

    #[test]
    fn nil_compares_with_anything() {
        assert_eq!(eval(BinaryOp::Eq, Value::Int(1), Value::Nil).unwrap(), Value::Bool(false));
        assert_eq!(eval(BinaryOp::Ne, Value::Nil, Value::str("x")).unwrap(), Value::Bool(true));
        assert_eq!(eval(BinaryOp::Eq, Value::Nil, Value::Nil).unwrap(), Value::Bool(true));
    }

    #[test]
    fn indexing_and_slicing() {
        let mut interpreter = Interpreter::new();
        let list = Value::list((0..5).map(Value::Int).collect());

        assert_eq!(index(&mut interpreter, &list, &Value::Int(-1)).unwrap(), Value::Int(4));
        assert_eq!(
            slice(&list, &Value::Int(-2), &Value::Nil).unwrap(),
            Value::list(vec![Value::Int(3), Value::Int(4)])
        );
        assert_eq!(slice(&list, &Value::Int(4), &Value::Int(1)).unwrap(), Value::list(vec![]));
        assert_eq!(slice(&Value::str("hello"), &Value::Nil, &Value::Int(99)).unwrap(), Value::str("hello"));

        let err = index(&mut interpreter, &list, &Value::Int(5)).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Index));
    }

    #[test]
    fn unary_operators() {
        let mut interpreter = Interpreter::new();
        assert_eq!(unary(&mut interpreter, UnaryOp::Neg, &Value::Int(3)).unwrap(), Value::Int(-3));
        assert_eq!(unary(&mut interpreter, UnaryOp::Invert, &Value::Int(0)).unwrap(), Value::Int(-1));

        let err = unary(&mut interpreter, UnaryOp::Neg, &Value::str("a")).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: bad operand type for unary -: 'str'");
    }

    #[test]
    fn truthiness() {
        let mut interpreter = Interpreter::new();
        for falsy in [Value::Nil, Value::Int(0), Value::Real(0.0), Value::str(""), Value::list(vec![])] {
            assert!(!truthy(&mut interpreter, &falsy).unwrap());
        }
        assert!(truthy(&mut interpreter, &Value::tuple(vec![Value::Nil])).unwrap());
    }
}
