use std::{cmp::Ordering, sync::Arc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tabula_base::{contract_err, Result};
use crate::{Lazy, Payload, PeakMap, TimeSeries, TypeTag};

// A single cell. Null is a first-class value rather than an Option
// wrapper because nearly every operation has to decide what null means
// for it, and a flat enum keeps those decisions in one match.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Object(Payload),
    TimeSeries(Lazy<TimeSeries>),
    PeakMap(Lazy<PeakMap>),
}

// Hashable, exactly-comparable image of a Value, used for grouping,
// distinct counts and exact lookups. Two values have equal keys exactly
// when `loose_eq` holds: bools and integral floats fold onto Int, so
// true, 1 and 1.0 land in the same bucket.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ValueKey {
    Null,
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(Arc<str>),
    Bytes(TypeTag, Vec<u8>),
}

// 2^63, exactly representable. Every float in [-2^63, 2^63) with no
// fractional part is some i64.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

// The i64 a float equals exactly, if any.
fn exact_int(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && (-TWO_POW_63..TWO_POW_63).contains(&f)).then_some(f as i64)
}

// Exact order of an integer against a float, with NaN above everything
// as OrderedFloat has it.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() || f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = f.floor();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal if f > whole => Ordering::Less,
        o => o,
    }
}

fn cmp_numbers(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => OrderedFloat(*x).cmp(&OrderedFloat(*y)),
        (Value::Float(x), other) => other.as_i64().map_or(Ordering::Equal, |i| cmp_int_float(i, *x).reverse()),
        (other, Value::Float(y)) => other.as_i64().map_or(Ordering::Equal, |i| cmp_int_float(i, *y)),
        _ => a.as_i64().cmp(&b.as_i64()),
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_tag(&self) -> Option<TypeTag> {
        TypeTag::of(self)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    pub fn key(&self) -> Result<ValueKey> {
        Ok(match self {
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Int(*b as i64),
            Value::Int(i) => ValueKey::Int(*i),
            Value::Float(f) => match exact_int(*f) {
                Some(i) => ValueKey::Int(i),
                None => ValueKey::Float(OrderedFloat(*f)),
            },
            Value::Str(s) => ValueKey::Str(s.clone()),
            Value::Object(p) => {
                let mut bytes = p.kind().as_bytes().to_vec();
                bytes.push(0);
                bytes.extend_from_slice(p.bytes());
                ValueKey::Bytes(TypeTag::Object, bytes)
            }
            Value::TimeSeries(ts) => {
                ValueKey::Bytes(TypeTag::TimeSeries, rmp_serde::to_vec(&*ts.get()?)?)
            }
            Value::PeakMap(pm) => ValueKey::Bytes(TypeTag::PeakMap, rmp_serde::to_vec(&*pm.get()?)?),
        })
    }

    // Ordering for comparison expressions. Nulls have no order and are
    // rejected here; callers decide what a null operand means before
    // getting this far.
    pub fn try_cmp(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => Ok(cmp_numbers(a, b)),
            (Value::Null, _) | (_, Value::Null) => {
                Err(contract_err("ordering comparison involving None is undefined"))
            }
            (a, b) => Err(contract_err(format!(
                "cannot order {} against {}",
                type_name(a),
                type_name(b)
            ))),
        }
    }

    // Total order used for sorting a column: nulls first, then values
    // by try_cmp. Fails only for columns of unorderable type.
    pub fn sort_cmp(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Null, _) => Ok(Ordering::Less),
            (_, Value::Null) => Ok(Ordering::Greater),
            (a, b) => a.try_cmp(b),
        }
    }

    // Equality as seen by `==` expressions: numbers compare exactly
    // across bool, int and float, different types are simply unequal.
    // NaN equals NaN, as it does in keys.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (a, b) if a.is_numeric() && b.is_numeric() => cmp_numbers(a, b) == Ordering::Equal,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::TimeSeries(a), Value::TimeSeries(b)) => a == b,
            (Value::PeakMap(a), Value::PeakMap(b)) => a == b,
            _ => false,
        }
    }
}

pub(crate) fn type_name(v: &Value) -> &'static str {
    TypeTag::of(v).map(|t| t.name()).unwrap_or("none")
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.loose_eq(other)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Object(p) => write!(f, "<{} ({} bytes)>", p.kind(), p.bytes().len()),
            Value::TimeSeries(ts) => match ts.get() {
                Ok(ts) => write!(f, "<TimeSeries n={}>", ts.len()),
                Err(_) => f.write_str("<TimeSeries unreadable>"),
            },
            Value::PeakMap(pm) => match pm.get() {
                Ok(pm) => write!(f, "<PeakMap spectra={}>", pm.spectra.len()),
                Err(_) => f.write_str("<PeakMap unreadable>"),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}
impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}
impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}
impl From<Payload> for Value {
    fn from(p: Payload) -> Self {
        Value::Object(p)
    }
}
impl From<TimeSeries> for Value {
    fn from(ts: TimeSeries) -> Self {
        Value::TimeSeries(Lazy::loaded(ts))
    }
}
impl From<PeakMap> for Value {
    fn from(pm: PeakMap) -> Self {
        Value::PeakMap(Lazy::loaded(pm))
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
