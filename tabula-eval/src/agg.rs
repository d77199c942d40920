use std::{cmp::Ordering, collections::HashSet};
use tabula_base::{contract_err, Result};
use tabula_lang::{TypeTag, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AggOp {
    Min,
    Max,
    Sum,
    Mean,
    Std,
    Median,
    Count,
    CountNone,
    CountDifferent,
    HasNone,
    AllNone,
    AllTrue,
    AnyTrue,
    AllFalse,
    AnyFalse,
    UniqueValue,
}

impl AggOp {
    // Reductions whose answer is one of (or computed from) the input
    // values. These fall back to `AggOptions::default` on empty input.
    fn reduces_values(&self) -> bool {
        matches!(
            self,
            AggOp::Min | AggOp::Max | AggOp::Sum | AggOp::Mean | AggOp::Std | AggOp::Median | AggOp::UniqueValue
        )
    }

    fn is_boolean(&self) -> bool {
        matches!(self, AggOp::AllTrue | AggOp::AnyTrue | AggOp::AllFalse | AggOp::AnyFalse)
    }
}

#[derive(Clone, Debug)]
pub struct AggOptions {
    pub ignore_none: bool,
    pub default: Value,
}

impl Default for AggOptions {
    fn default() -> Self {
        AggOptions {
            ignore_none: true,
            default: Value::Null,
        }
    }
}

pub(crate) fn result_type(op: AggOp, arg: Option<TypeTag>) -> Result<Option<TypeTag>> {
    let bad = |t: TypeTag| contract_err(format!("aggregate {op:?} is not defined for {t}"));
    Ok(match op {
        AggOp::Count | AggOp::CountNone | AggOp::CountDifferent => Some(TypeTag::Int),
        AggOp::HasNone | AggOp::AllNone => Some(TypeTag::Bool),
        AggOp::AllTrue | AggOp::AnyTrue | AggOp::AllFalse | AggOp::AnyFalse => match arg {
            Some(t) if t != TypeTag::Bool => return Err(bad(t)),
            _ => Some(TypeTag::Bool),
        },
        AggOp::UniqueValue => arg,
        AggOp::Min | AggOp::Max => match arg {
            Some(t) if !(t.is_numeric() || t == TypeTag::Str) => return Err(bad(t)),
            t => t,
        },
        AggOp::Sum => match arg {
            Some(TypeTag::Float) => Some(TypeTag::Float),
            Some(t) if t.is_numeric() => Some(TypeTag::Int),
            Some(t) => return Err(bad(t)),
            None => None,
        },
        AggOp::Mean | AggOp::Std | AggOp::Median => match arg {
            Some(t) if !t.is_numeric() => return Err(bad(t)),
            _ => Some(TypeTag::Float),
        },
    })
}

fn numbers(op: AggOp, values: &[&Value]) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| contract_err(format!("aggregate {op:?} needs numbers, got {v}")))
        })
        .collect()
}

fn bools(op: AggOp, values: &[&Value]) -> Result<Vec<bool>> {
    values
        .iter()
        .map(|v| {
            v.as_bool()
                .ok_or_else(|| contract_err(format!("aggregate {op:?} needs bools, got {v}")))
        })
        .collect()
}

fn extreme(values: &[&Value], want: Ordering) -> Result<Value> {
    let mut best = values[0];
    for v in &values[1..] {
        if v.try_cmp(best)? == want {
            best = v;
        }
    }
    Ok(best.clone())
}

fn sum(values: &[&Value]) -> Result<Value> {
    if values.iter().all(|v| matches!(v, Value::Int(_) | Value::Bool(_))) {
        let mut acc: i64 = 0;
        for v in values {
            let x = v.as_i64().unwrap_or(0);
            acc = acc
                .checked_add(x)
                .ok_or_else(|| contract_err("integer overflow in sum"))?;
        }
        return Ok(Value::Int(acc));
    }
    Ok(Value::Float(numbers(AggOp::Sum, values)?.iter().sum()))
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

// Population standard deviation.
fn std(xs: &[f64]) -> f64 {
    let m = mean(xs);
    (xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64).sqrt()
}

fn median(mut xs: Vec<f64>) -> f64 {
    xs.sort_by(f64::total_cmp);
    let mid = xs.len() / 2;
    if xs.len() % 2 == 1 {
        xs[mid]
    } else {
        (xs[mid - 1] + xs[mid]) / 2.0
    }
}

fn distinct(values: &[&Value]) -> Result<usize> {
    let mut seen = HashSet::new();
    for v in values {
        seen.insert(v.key()?);
    }
    Ok(seen.len())
}

pub(crate) fn reduce(op: AggOp, opts: &AggOptions, values: &[&Value]) -> Result<Value> {
    let n_none = values.iter().filter(|v| v.is_null()).count();
    match op {
        AggOp::CountNone => return Ok(Value::Int(n_none as i64)),
        AggOp::HasNone => return Ok(Value::Bool(n_none > 0)),
        AggOp::AllNone => return Ok(Value::Bool(n_none == values.len())),
        _ => {}
    }
    if n_none > 0 && !opts.ignore_none {
        return Ok(match op {
            AggOp::Count => Value::Int(values.len() as i64),
            AggOp::CountDifferent => Value::Int(distinct(values)? as i64),
            AggOp::UniqueValue if n_none == values.len() => Value::Null,
            AggOp::UniqueValue => {
                return Err(contract_err("unique_value found None next to other values"))
            }
            _ => Value::Null,
        });
    }
    let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
    if present.is_empty() && op.reduces_values() {
        return Ok(opts.default.clone());
    }
    if op.is_boolean() {
        let bs = bools(op, &present)?;
        return Ok(Value::Bool(match op {
            AggOp::AllTrue => bs.iter().all(|b| *b),
            AggOp::AnyTrue => bs.iter().any(|b| *b),
            AggOp::AllFalse => bs.iter().all(|b| !*b),
            _ => bs.iter().any(|b| !*b),
        }));
    }
    Ok(match op {
        AggOp::Count => Value::Int(present.len() as i64),
        AggOp::CountDifferent => Value::Int(distinct(&present)? as i64),
        AggOp::Min => extreme(&present, Ordering::Less)?,
        AggOp::Max => extreme(&present, Ordering::Greater)?,
        AggOp::Sum => sum(&present)?,
        AggOp::Mean => Value::Float(mean(&numbers(op, &present)?)),
        AggOp::Std => Value::Float(std(&numbers(op, &present)?)),
        AggOp::Median => Value::Float(median(numbers(op, &present)?)),
        AggOp::UniqueValue => {
            let k = distinct(&present)?;
            if k > 1 {
                return Err(contract_err(format!("unique_value found {k} different values")));
            }
            present[0].clone()
        }
        _ => unreachable!("handled above"),
    })
}
