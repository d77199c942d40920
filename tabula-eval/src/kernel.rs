// Per-value kernels for unary and binary nodes, plus the static result
// type of each. Null handling lives here: every kernel except AND, OR,
// COALESCE and the null tests maps a null operand to a null result.

use std::{cmp::Ordering, sync::Arc};
use tabula_base::{contract_err, Result};
use tabula_lang::{TypeTag, Value};
use crate::expr::{BinOp, UnOp};

fn type_str(t: Option<TypeTag>) -> &'static str {
    t.map(|t| t.name()).unwrap_or("none")
}

fn val_type(v: &Value) -> &'static str {
    type_str(v.type_tag())
}

pub(crate) fn unary_type(op: UnOp, arg: Option<TypeTag>) -> Result<Option<TypeTag>> {
    let Some(t) = arg else {
        return Ok(match op {
            UnOp::IsNone | UnOp::IsNotNone | UnOp::Not => Some(TypeTag::Bool),
            UnOp::Len => Some(TypeTag::Int),
            _ => None,
        });
    };
    let bad = || contract_err(format!("{op:?} is not defined for {t}"));
    Ok(Some(match op {
        UnOp::IsNone | UnOp::IsNotNone => TypeTag::Bool,
        UnOp::Not if t == TypeTag::Bool => TypeTag::Bool,
        UnOp::Neg | UnOp::Abs if t == TypeTag::Float => TypeTag::Float,
        UnOp::Neg | UnOp::Abs if t.is_numeric() => TypeTag::Int,
        UnOp::Floor | UnOp::Ceil | UnOp::Round if t.is_numeric() => {
            if t == TypeTag::Float {
                TypeTag::Float
            } else {
                TypeTag::Int
            }
        }
        UnOp::Sqrt | UnOp::Exp | UnOp::Log | UnOp::Log10 if t.is_numeric() => TypeTag::Float,
        UnOp::Len if !t.is_primitive() => TypeTag::Int,
        _ => return Err(bad()),
    }))
}

pub(crate) fn unary_value(op: UnOp, v: &Value) -> Result<Value> {
    match (op, v) {
        (UnOp::IsNone, v) => return Ok(Value::Bool(v.is_null())),
        (UnOp::IsNotNone, v) => return Ok(Value::Bool(!v.is_null())),
        (_, Value::Null) => return Ok(Value::Null),
        _ => {}
    }
    let bad = || contract_err(format!("{op:?} is not defined for {}", val_type(v)));
    Ok(match (op, v) {
        (UnOp::Not, Value::Bool(b)) => Value::Bool(!b),
        (UnOp::Neg, Value::Float(x)) => Value::Float(-x),
        (UnOp::Neg, v) if v.is_numeric() => {
            let i = v.as_i64().ok_or_else(bad)?;
            Value::Int(i.checked_neg().ok_or_else(|| contract_err("integer overflow in negation"))?)
        }
        (UnOp::Abs, Value::Float(x)) => Value::Float(x.abs()),
        (UnOp::Abs, v) if v.is_numeric() => {
            let i = v.as_i64().ok_or_else(bad)?;
            Value::Int(i.checked_abs().ok_or_else(|| contract_err("integer overflow in abs"))?)
        }
        (UnOp::Floor, Value::Float(x)) => Value::Float(x.floor()),
        (UnOp::Ceil, Value::Float(x)) => Value::Float(x.ceil()),
        (UnOp::Round, Value::Float(x)) => Value::Float(x.round()),
        (UnOp::Floor | UnOp::Ceil | UnOp::Round, v) if v.is_numeric() => Value::Int(v.as_i64().ok_or_else(bad)?),
        (UnOp::Sqrt | UnOp::Exp | UnOp::Log | UnOp::Log10, v) if v.is_numeric() => {
            let x = v.as_f64().ok_or_else(bad)?;
            Value::Float(match op {
                UnOp::Sqrt => x.sqrt(),
                UnOp::Exp => x.exp(),
                UnOp::Log => x.ln(),
                _ => x.log10(),
            })
        }
        (UnOp::Len, Value::Str(s)) => Value::Int(s.chars().count() as i64),
        (UnOp::Len, Value::Object(p)) => Value::Int(p.bytes().len() as i64),
        (UnOp::Len, Value::TimeSeries(ts)) => Value::Int(ts.get()?.len() as i64),
        (UnOp::Len, Value::PeakMap(pm)) => Value::Int(pm.get()?.spectra.len() as i64),
        _ => return Err(bad()),
    })
}

fn comparable(a: TypeTag, b: TypeTag) -> bool {
    (a.is_numeric() && b.is_numeric()) || (a == TypeTag::Str && b == TypeTag::Str)
}

pub(crate) fn binary_type(op: BinOp, lhs: Option<TypeTag>, rhs: Option<TypeTag>) -> Result<Option<TypeTag>> {
    use BinOp::*;
    let bad = || {
        contract_err(format!(
            "operator {op:?} is not defined for {} and {}",
            type_str(lhs),
            type_str(rhs)
        ))
    };
    match op {
        Eq | Ne => Ok(Some(TypeTag::Bool)),
        Lt | Le | Gt | Ge => match (lhs, rhs) {
            (Some(a), Some(b)) if !comparable(a, b) => Err(bad()),
            _ => Ok(Some(TypeTag::Bool)),
        },
        And | Or | Xor => match (lhs, rhs) {
            (Some(a), _) if a != TypeTag::Bool => Err(bad()),
            (_, Some(b)) if b != TypeTag::Bool => Err(bad()),
            _ => Ok(Some(TypeTag::Bool)),
        },
        StartsWith | EndsWith | Contains => match (lhs, rhs) {
            (Some(a), _) if a != TypeTag::Str => Err(bad()),
            (_, Some(b)) if b != TypeTag::Str => Err(bad()),
            _ => Ok(Some(TypeTag::Bool)),
        },
        Coalesce => match (lhs, rhs) {
            (Some(a), Some(b)) if a != b => TypeTag::promote_numeric(a, b).map(Some).ok_or_else(bad),
            (a, b) => Ok(a.or(b)),
        },
        Div => match (lhs, rhs) {
            (Some(a), _) if !a.is_numeric() => Err(bad()),
            (_, Some(b)) if !b.is_numeric() => Err(bad()),
            _ => Ok(Some(TypeTag::Float)),
        },
        Add if lhs == Some(TypeTag::Str) && rhs == Some(TypeTag::Str) => Ok(Some(TypeTag::Str)),
        Add | Sub | Mul | Rem | Pow => match (lhs, rhs) {
            (Some(a), Some(b)) => {
                Ok(Some(TypeTag::promote_numeric(a, b).ok_or_else(bad)?))
            }
            (Some(a), None) | (None, Some(a)) if a == TypeTag::Str && op == Add => Ok(Some(TypeTag::Str)),
            (Some(a), None) | (None, Some(a)) if a.is_numeric() => Ok(Some(if a == TypeTag::Bool { TypeTag::Int } else { a })),
            (None, None) => Ok(None),
            _ => Err(bad()),
        },
    }
}

// Python-style modulo: the result takes the sign of the divisor.
fn int_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        r + b
    } else {
        r
    }
}

fn overflow() -> tabula_base::Error {
    contract_err("integer overflow")
}

fn arith(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    if let (Value::Str(x), Value::Str(y), BinOp::Add) = (a, b, op) {
        let mut s = String::with_capacity(x.len() + y.len());
        s.push_str(x);
        s.push_str(y);
        return Ok(Value::Str(Arc::from(s)));
    }
    if !a.is_numeric() || !b.is_numeric() {
        return Err(contract_err(format!(
            "operator {op:?} is not defined for {} and {}",
            val_type(a),
            val_type(b)
        )));
    }
    if op == BinOp::Div {
        let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
        return Ok(Value::Float(x / y));
    }
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Ok(match op {
            BinOp::Add => Value::Int(x.checked_add(y).ok_or_else(overflow)?),
            BinOp::Sub => Value::Int(x.checked_sub(y).ok_or_else(overflow)?),
            BinOp::Mul => Value::Int(x.checked_mul(y).ok_or_else(overflow)?),
            BinOp::Rem => match int_mod(x, y) {
                Some(r) => Value::Int(r),
                None if y == 0 => Value::Null,
                None => return Err(overflow()),
            },
            BinOp::Pow => {
                if y < 0 {
                    return Ok(Value::Float(match i32::try_from(y) {
                        Ok(e) => (x as f64).powi(e),
                        Err(_) => (x as f64).powf(y as f64),
                    }));
                }
                let e = u32::try_from(y).map_err(|_| overflow())?;
                Value::Int(x.checked_pow(e).ok_or_else(overflow)?)
            }
            _ => unreachable!("non-arithmetic operator in arith"),
        });
    }
    let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
    Ok(Value::Float(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Rem => {
            if y == 0.0 {
                return Ok(Value::Null);
            }
            float_mod(x, y)
        }
        BinOp::Pow => x.powf(y),
        _ => unreachable!("non-arithmetic operator in arith"),
    }))
}

fn expect_bool(op: BinOp, v: &Value) -> Result<Option<bool>> {
    match v {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(contract_err(format!(
            "operator {op:?} needs bool operands, got {}",
            val_type(other)
        ))),
    }
}

fn from_opt(b: Option<bool>) -> Value {
    match b {
        Some(b) => Value::Bool(b),
        None => Value::Null,
    }
}

pub(crate) fn ordering_holds(op: BinOp, ord: Ordering) -> bool {
    match op {
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Le => ord != Ordering::Greater,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Ge => ord != Ordering::Less,
        BinOp::Eq => ord == Ordering::Equal,
        BinOp::Ne => ord != Ordering::Equal,
        _ => false,
    }
}

pub(crate) fn binary_value(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    use BinOp::*;
    match op {
        // Three-valued logic: a known operand can decide the result alone.
        And => {
            let (x, y) = (expect_bool(op, a)?, expect_bool(op, b)?);
            return Ok(match (x, y) {
                (Some(false), _) | (_, Some(false)) => Value::Bool(false),
                (Some(true), Some(true)) => Value::Bool(true),
                _ => Value::Null,
            });
        }
        Or => {
            let (x, y) = (expect_bool(op, a)?, expect_bool(op, b)?);
            return Ok(match (x, y) {
                (Some(true), _) | (_, Some(true)) => Value::Bool(true),
                (Some(false), Some(false)) => Value::Bool(false),
                _ => Value::Null,
            });
        }
        Coalesce => return Ok(if a.is_null() { b.clone() } else { a.clone() }),
        _ => {}
    }
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match op {
        Xor => {
            let (x, y) = (expect_bool(op, a)?, expect_bool(op, b)?);
            Ok(from_opt(x.zip(y).map(|(x, y)| x ^ y)))
        }
        Eq => Ok(Value::Bool(a.loose_eq(b))),
        Ne => Ok(Value::Bool(!a.loose_eq(b))),
        Lt | Le | Gt | Ge => Ok(Value::Bool(ordering_holds(op, a.try_cmp(b)?))),
        StartsWith | EndsWith | Contains => match (a, b) {
            (Value::Str(s), Value::Str(t)) => Ok(Value::Bool(match op {
                StartsWith => s.starts_with(&**t),
                EndsWith => s.ends_with(&**t),
                _ => s.contains(&**t),
            })),
            _ => Err(contract_err(format!(
                "operator {op:?} needs str operands, got {} and {}",
                val_type(a),
                val_type(b)
            ))),
        },
        Add | Sub | Mul | Div | Rem | Pow => arith(op, a, b),
        And | Or | Coalesce => unreachable!("handled above"),
    }
}
