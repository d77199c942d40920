// The evaluator. Every node evaluates its children first, checks the
// static result type, then maps the per-value kernel over the rows.
// Scalars broadcast against columns; two columns must have equal length.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};
use tabula_base::{contract_err, Result};
use tabula_lang::{TypeTag, Value, ValueKey};
use tracing::trace;
use crate::{
    agg,
    context::{EvalContext, EvalResult, SortedIndex, Vals},
    expr::{BinOp, Expr, Node, UnOp},
    kernel::{binary_type, binary_value, unary_type, unary_value},
};

fn common_len(parts: &[&EvalResult]) -> Result<Option<usize>> {
    let mut n: Option<usize> = None;
    for p in parts {
        match (n, p.len()) {
            (_, None) => {}
            (None, Some(l)) => n = Some(l),
            (Some(m), Some(l)) if m != l => {
                return Err(contract_err(format!("length mismatch: {m} values against {l} values")))
            }
            _ => {}
        }
    }
    Ok(n)
}

fn map_rows(n: Option<usize>, mut f: impl FnMut(usize) -> Result<Value>) -> Result<Vals> {
    match n {
        None => Ok(Vals::Scalar(f(0)?)),
        Some(n) => Ok(Vals::column((0..n).map(f).collect::<Result<Vec<_>>>()?)),
    }
}

fn is_null_const(e: &Expr) -> bool {
    e.as_constant().map_or(false, Value::is_null)
}

// Ordering comparison of a column sorted ascending (nulls first) against
// one value, by binary search. Gives the same mask as comparing row by row.
fn sorted_compare(col: &[Value], hint: SortedIndex, op: BinOp, x: &Value) -> Result<Vec<Value>> {
    let first = hint.first_non_null.min(col.len());
    let body = &col[first..];
    if let Some(v) = body.first() {
        // Surface type errors the row-by-row path would raise.
        v.try_cmp(x)?;
    }
    let lo = first + body.partition_point(|v| matches!(v.try_cmp(x), Ok(Ordering::Less)));
    let hi = first + body.partition_point(|v| !matches!(v.try_cmp(x), Ok(Ordering::Greater)));
    let n = col.len();
    let (from, to) = match op {
        BinOp::Lt => (first, lo),
        BinOp::Le => (first, hi),
        BinOp::Gt => (hi, n),
        BinOp::Ge => (lo, n),
        _ => return Err(contract_err(format!("{op:?} is not an ordering comparison"))),
    };
    trace!(target: "tabula", ?op, first, from, to, "sorted comparison");
    Ok((0..n)
        .map(|i| {
            if i < first {
                Value::Null
            } else {
                Value::Bool(i >= from && i < to)
            }
        })
        .collect())
}

fn sorted_side<'a>(lhs: &'a EvalResult, rhs: &'a EvalResult, op: BinOp) -> Option<(&'a [Value], SortedIndex, BinOp, &'a Value)> {
    if !op.is_ordering() {
        return None;
    }
    match (&lhs.values, lhs.sorted_hint, &rhs.values) {
        (Vals::Column(c), Some(h), Vals::Scalar(x)) if !x.is_null() => return Some((c.as_slice(), h, op, x)),
        _ => {}
    }
    match (&rhs.values, rhs.sorted_hint, &lhs.values) {
        (Vals::Column(c), Some(h), Vals::Scalar(x)) if !x.is_null() => Some((c.as_slice(), h, op.mirrored(), x)),
        _ => None,
    }
}

fn unify(a: Option<TypeTag>, b: Option<TypeTag>) -> Result<Option<TypeTag>> {
    match (a, b) {
        (Some(x), Some(y)) if x != y => TypeTag::promote_numeric(x, y)
            .map(Some)
            .ok_or_else(|| contract_err(format!("branches have incompatible types {x} and {y}"))),
        (a, b) => Ok(a.or(b)),
    }
}

fn conform(dtype: Option<TypeTag>, v: Value) -> Value {
    match dtype {
        Some(t) => t.conform(v),
        None => v,
    }
}

fn group_keys(keys: &[EvalResult], i: usize) -> Result<Option<Vec<ValueKey>>> {
    let mut out = Vec::with_capacity(keys.len());
    for k in keys {
        let v = k.values.get(i);
        if v.is_null() {
            return Ok(None);
        }
        out.push(v.key()?);
    }
    Ok(Some(out))
}

impl Expr {
    pub fn eval(&self, ctx: &EvalContext) -> Result<EvalResult> {
        match &*self.0 {
            Node::Column { table, name } => Ok(ctx.get(*table, name)?.clone()),
            Node::Const(v) => Ok(EvalResult::scalar(v.clone(), None)),
            Node::Unary { op, arg } => {
                let a = arg.eval(ctx)?;
                let dtype = unary_type(*op, a.dtype)?;
                let values = map_rows(a.len(), |i| unary_value(*op, a.values.get(i)))?;
                Ok(EvalResult {
                    values,
                    sorted_hint: None,
                    dtype,
                })
            }
            Node::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, ctx),
            Node::Aggregate {
                op,
                arg,
                opts,
                group_by,
            } => {
                let a = arg.eval(ctx)?;
                let dtype = agg::result_type(*op, a.dtype)?;
                let keys = group_by.iter().map(|k| k.eval(ctx)).collect::<Result<Vec<_>>>()?;
                let mut parts = vec![&a];
                parts.extend(keys.iter());
                let n = common_len(&parts)?;
                let rows = n.unwrap_or(1);
                if keys.is_empty() || n.is_none() {
                    let vals: Vec<&Value> = (0..rows).map(|i| a.values.get(i)).collect();
                    let v = agg::reduce(*op, opts, &vals)?;
                    return Ok(EvalResult::scalar(conform(dtype, v), dtype));
                }
                // Groups in order of first appearance; rows with a null key
                // belong to no group.
                let mut slot: HashMap<Vec<ValueKey>, usize> = HashMap::new();
                let mut members: Vec<Vec<usize>> = Vec::new();
                let mut row_group: Vec<Option<usize>> = Vec::with_capacity(rows);
                for i in 0..rows {
                    let g = match group_keys(&keys, i)? {
                        None => None,
                        Some(k) => {
                            let next = members.len();
                            let g = *slot.entry(k).or_insert(next);
                            if g == next {
                                members.push(Vec::new());
                            }
                            members[g].push(i);
                            Some(g)
                        }
                    };
                    row_group.push(g);
                }
                let results = members
                    .iter()
                    .map(|rows| {
                        let vals: Vec<&Value> = rows.iter().map(|&i| a.values.get(i)).collect();
                        agg::reduce(*op, opts, &vals).map(|v| conform(dtype, v))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let values = row_group
                    .into_iter()
                    .map(|g| g.map(|g| results[g].clone()).unwrap_or_default())
                    .collect();
                Ok(EvalResult::column(values, dtype))
            }
            Node::IfThenElse { cond, then, otherwise } => {
                let c = cond.eval(ctx)?;
                if let Some(t) = c.dtype.filter(|t| *t != TypeTag::Bool) {
                    return Err(contract_err(format!("condition must be bool, not {t}")));
                }
                let (t, e) = (then.eval(ctx)?, otherwise.eval(ctx)?);
                let dtype = unify(t.dtype, e.dtype)?;
                let n = common_len(&[&c, &t, &e])?;
                let values = map_rows(n, |i| {
                    Ok(match c.values.get(i) {
                        Value::Null => Value::Null,
                        Value::Bool(true) => conform(dtype, t.values.get(i).clone()),
                        Value::Bool(false) => conform(dtype, e.values.get(i).clone()),
                        other => return Err(contract_err(format!("condition produced non-bool value {other}"))),
                    })
                })?;
                Ok(EvalResult {
                    values,
                    sorted_hint: None,
                    dtype,
                })
            }
            Node::Apply { func, arg } => {
                let a = arg.eval(ctx)?;
                let values = map_rows(a.len(), |i| {
                    let v = a.values.get(i);
                    if v.is_null() {
                        return Ok(Value::Null);
                    }
                    let out = (func.f)(v)?;
                    if !func.dtype.accepts(&out) {
                        return Err(contract_err(format!(
                            "function {} declared {} but returned {out}",
                            func.name, func.dtype
                        )));
                    }
                    Ok(func.dtype.conform(out))
                })?;
                Ok(EvalResult {
                    values,
                    sorted_hint: None,
                    dtype: Some(func.dtype),
                })
            }
            Node::IsIn { arg, keys } => {
                let a = arg.eval(ctx)?;
                let values = map_rows(a.len(), |i| {
                    let v = a.values.get(i);
                    if v.is_null() {
                        return Ok(Value::Null);
                    }
                    Ok(Value::Bool(keys.contains(&v.key()?)))
                })?;
                Ok(EvalResult {
                    values,
                    sorted_hint: None,
                    dtype: Some(TypeTag::Bool),
                })
            }
            Node::ApproxEq { lhs, rhs, tol } => {
                let (l, r) = (lhs.eval(ctx)?, rhs.eval(ctx)?);
                for t in [l.dtype, r.dtype].into_iter().flatten() {
                    if !t.is_numeric() {
                        return Err(contract_err(format!("approx_eq needs numbers, not {t}")));
                    }
                }
                let n = common_len(&[&l, &r])?;
                let values = map_rows(n, |i| {
                    let (a, b) = (l.values.get(i), r.values.get(i));
                    Ok(match (a.as_f64(), b.as_f64()) {
                        (Some(a), Some(b)) => Value::Bool(tol.matches(a, b)),
                        _ => Value::Null,
                    })
                })?;
                Ok(EvalResult {
                    values,
                    sorted_hint: None,
                    dtype: Some(TypeTag::Bool),
                })
            }
        }
    }

    fn eval_binary(&self, op: BinOp, lhs: &Expr, rhs: &Expr, ctx: &EvalContext) -> Result<EvalResult> {
        let (lnull, rnull) = (is_null_const(lhs), is_null_const(rhs));
        if lnull || rnull {
            if op.is_ordering() {
                return Err(contract_err(format!("ordering comparison {self:?} against None is undefined")));
            }
            let test = match op {
                BinOp::Eq => Some(UnOp::IsNone),
                BinOp::Ne => Some(UnOp::IsNotNone),
                _ => None,
            };
            if let Some(test) = test {
                let other = if lnull { rhs } else { lhs };
                return Expr::unary(test, other.clone()).eval(ctx);
            }
        }
        let (l, r) = (lhs.eval(ctx)?, rhs.eval(ctx)?);
        let dtype = binary_type(op, l.dtype, r.dtype)?;
        if let Some((col, hint, op, x)) = sorted_side(&l, &r, op) {
            return Ok(EvalResult {
                values: Vals::Column(Arc::new(sorted_compare(col, hint, op, x)?)),
                sorted_hint: None,
                dtype,
            });
        }
        let n = common_len(&[&l, &r])?;
        // Integers raised to a negative power leave the integers, and the
        // whole result follows.
        let dtype = match (op, dtype) {
            (BinOp::Pow, Some(TypeTag::Int))
                if (0..n.unwrap_or(1)).any(|i| r.values.get(i).as_i64().is_some_and(|y| y < 0)) =>
            {
                Some(TypeTag::Float)
            }
            _ => dtype,
        };
        let values = map_rows(n, |i| binary_value(op, l.values.get(i), r.values.get(i)).map(|v| conform(dtype, v)))?;
        Ok(EvalResult {
            values,
            sorted_hint: None,
            dtype,
        })
    }
}
