// Joins. The predicate is evaluated once per left row, with that row's
// values bound as scalars and the right table bound as whole columns, so
// each evaluation yields the mask of matching right rows.
//
// When one top-level conjunct is an equality (exact or approx) between an
// expression over the left table only and one over the right table only,
// we instead index the right side once and search it per left row. The
// other conjuncts are then evaluated against the candidate rows only.

use std::{collections::BTreeSet, sync::Arc};
use tabula_base::{contract_err, Result};
use tabula_eval::{EvalContext, EvalResult, Expr, Lookup, Tolerance};
use tabula_lang::{split_postfix, Schema, TableId, Value};
use tracing::debug;
use crate::{Table, TableView};

struct EqualityPlan {
    left: Expr,
    right: Expr,
    tol: Option<Tolerance>,
    rest: Vec<Expr>,
}

fn only(expr: &Expr, table: TableId) -> bool {
    let tables = expr.referenced_tables();
    tables.len() == 1 && tables.contains(&table)
}

fn plan(pred: &Expr, left: TableId, right: TableId) -> Option<EqualityPlan> {
    if left == right {
        return None;
    }
    let conjuncts = pred.split_conjuncts();
    for (i, c) in conjuncts.iter().enumerate() {
        let Some((a, b, tol)) = c.as_equality() else {
            continue;
        };
        // A relative tolerance is measured against the right-hand operand,
        // which must be the indexed side.
        let sides = if only(a, left) && only(b, right) {
            Some((a, b))
        } else if only(a, right) && only(b, left) && !matches!(tol, Some(Tolerance::Rel(_))) {
            Some((b, a))
        } else {
            None
        };
        if let Some((l, r)) = sides {
            let rest = conjuncts
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, e)| e.clone())
                .collect();
            return Some(EqualityPlan {
                left: l.clone(),
                right: r.clone(),
                tol,
                rest,
            });
        }
    }
    None
}

// Right-side names get a `__k` postfix with k above every postfix either
// input already uses; a right name already carrying `__j` gets
// `__{k+j+1}`.
fn joined_schema(left: &Schema, right: &Schema) -> Result<Schema> {
    let k = left.max_postfix().max(right.max_postfix()).map_or(0, |m| m + 1);
    let mut out = left.clone();
    for i in 0..right.len() {
        let name = match split_postfix(right.name(i)) {
            (base, Some(j)) => format!("{base}__{}", k + j + 1),
            (base, None) => format!("{base}__{k}"),
        };
        out.push(name, right.type_at(i), right.format_at(i).cloned())?;
    }
    Ok(out)
}

fn bind_row(table: &Table, exprs: &[&Expr], row: usize, ctx: &mut EvalContext) -> Result<()> {
    let mut seen = BTreeSet::new();
    for e in exprs {
        for (t, name) in e.referenced_columns() {
            if t != table.id() || !seen.insert(name.clone()) {
                continue;
            }
            let idx = table.schema().require(&name)?;
            let v = table.rows()[row][idx].clone();
            ctx.bind(t, name, EvalResult::scalar(v, Some(table.schema().type_at(idx))));
        }
    }
    Ok(())
}

fn bind_subset(table: &Table, expr: &Expr, rows: &[usize], ctx: &mut EvalContext) -> Result<()> {
    for (t, name) in expr.referenced_columns() {
        if t != table.id() {
            continue;
        }
        let idx = table.schema().require(&name)?;
        let vals: Vec<Value> = rows.iter().map(|&i| table.rows()[i][idx].clone()).collect();
        ctx.bind(t, name, EvalResult::shared_column(Arc::new(vals), table.schema().type_at(idx), None));
    }
    Ok(())
}

impl Table {
    pub fn join(&self, other: &Table, pred: &Expr) -> Result<Table> {
        self.join_impl(other, pred, false)
    }

    // Like join, plus one row with a null right side for every left row
    // that matched nothing.
    pub fn left_join(&self, other: &Table, pred: &Expr) -> Result<Table> {
        self.join_impl(other, pred, true)
    }

    // For every left row, the matching right rows in ascending order.
    fn match_rows(&self, other: &Table, pred: &Expr) -> Result<Vec<Vec<usize>>> {
        let m = other.len();
        let mut out = Vec::with_capacity(self.len());
        if let Some(p) = plan(pred, self.id(), other.id()) {
            debug!(target: "tabula", left = ?p.left, right = ?p.right, tol = ?p.tol, "join via lookup");
            let (keys, _) = other.eval_values(&p.right)?;
            let lookup = Lookup::build(&keys, p.tol)?;
            let (needles, _) = self.eval_values(&p.left)?;
            let has_rest = !p.rest.is_empty();
            let rest = Expr::and_all(p.rest);
            for (i, needle) in needles.iter().enumerate() {
                let cands = lookup.find(needle)?;
                if !has_rest || cands.is_empty() {
                    out.push(cands);
                    continue;
                }
                let mut ctx = EvalContext::new();
                bind_row(self, &[&rest], i, &mut ctx)?;
                bind_subset(other, &rest, &cands, &mut ctx)?;
                let mask = rest.eval(&ctx)?.to_mask(cands.len())?;
                out.push(
                    cands
                        .into_iter()
                        .zip(mask)
                        .filter_map(|(j, keep)| (keep == Some(true)).then_some(j))
                        .collect(),
                );
            }
            return Ok(out);
        }
        debug!(target: "tabula", ?pred, "join predicate has no usable equality, scanning all right rows per left row");
        let mut right = EvalContext::new();
        other.bind(pred, &mut right)?;
        for i in 0..self.len() {
            let mut ctx = right.clone();
            bind_row(self, &[pred], i, &mut ctx)?;
            let mask = pred.eval(&ctx)?.to_mask(m)?;
            out.push(
                mask.into_iter()
                    .enumerate()
                    .filter_map(|(j, keep)| (keep == Some(true)).then_some(j))
                    .collect(),
            );
        }
        Ok(out)
    }

    fn join_impl(&self, other: &Table, pred: &Expr, keep_unmatched: bool) -> Result<Table> {
        // Columns bind by table id, so with one table on both sides every
        // column reference would name the left row and the right column at
        // once.
        if self.id() == other.id() && pred.referenced_tables().contains(&self.id()) {
            return Err(contract_err(
                "a predicate over a table joined with itself is ambiguous; join with copy() of it instead",
            ));
        }
        let schema = joined_schema(self.schema(), other.schema())?;
        let matches = self.match_rows(other, pred)?;
        let blank: Vec<Value> = vec![Value::Null; other.schema().len()];
        let mut rows = Vec::new();
        for (left, found) in self.rows().iter().zip(matches) {
            if found.is_empty() && keep_unmatched {
                let mut row = left.clone();
                row.extend(blank.iter().cloned());
                rows.push(row);
            }
            for j in found {
                let mut row = left.clone();
                row.extend(other.rows()[j].iter().cloned());
                rows.push(row);
            }
        }
        Ok(Table::assemble(
            schema,
            rows,
            self.title().map(str::to_string),
            self.meta().clone(),
        ))
    }
}
