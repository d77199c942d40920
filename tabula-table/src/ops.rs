use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};
use tabula_base::{contract_err, Error, Result};
use tabula_eval::Expr;
use tabula_lang::{Value, ValueKey};
use crate::{Table, TableView};

// Stable sort order of rows under the given key columns. Ascending keys
// put nulls first, descending keys put them last.
pub fn sort_permutation(keys: &[(&[Value], bool)]) -> Result<Vec<usize>> {
    let n = keys.first().map_or(0, |(col, _)| col.len());
    if keys.iter().any(|(col, _)| col.len() != n) {
        return Err(contract_err("sort keys have different lengths"));
    }
    let mut failure: Option<Error> = None;
    let mut perm: Vec<usize> = (0..n).collect();
    perm.sort_by(|&a, &b| {
        for (col, ascending) in keys {
            match col[a].sort_cmp(&col[b]) {
                Ok(Ordering::Equal) => continue,
                Ok(o) if *ascending => return o,
                Ok(o) => return o.reverse(),
                Err(e) => {
                    failure.get_or_insert(e);
                    return Ordering::Equal;
                }
            }
        }
        Ordering::Equal
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(perm),
    }
}

fn row_key(row: &[Value], idxs: &[usize]) -> Result<Vec<ValueKey>> {
    idxs.iter().map(|&i| row[i].key()).collect()
}

impl Table {
    pub fn sort_by(&mut self, keys: &[(&str, bool)]) -> Result<()> {
        let cols = keys
            .iter()
            .map(|(name, asc)| Ok((self.column_values(name)?, *asc)))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<(&[Value], bool)> = cols.iter().map(|(c, asc)| (c.as_slice(), *asc)).collect();
        let perm = sort_permutation(&refs)?;
        let mut old: Vec<Option<Vec<Value>>> = std::mem::take(self.rows_mut()).into_iter().map(Some).collect();
        let rows = perm.iter().filter_map(|&i| old[i].take()).collect();
        *self.rows_mut() = rows;
        if let [(name, true)] = keys {
            self.set_sorted_by(Some(name.to_string()));
        }
        Ok(())
    }

    // Appends an aggregate column. With group keys the aggregate is
    // computed per group and every row gets its group's value.
    pub fn aggregate(&mut self, expr: &Expr, new_name: &str, group_by: &[&str]) -> Result<()> {
        if !expr.contains_aggregate() {
            return Err(contract_err(format!("{expr:?} is not an aggregate")));
        }
        let expr = if group_by.is_empty() {
            expr.clone()
        } else {
            let keys = group_by
                .iter()
                .map(|n| self.column(n))
                .collect::<Result<Vec<_>>>()?;
            expr.group_by(&keys)?
        };
        self.add_column(new_name, expr, None, None)
    }

    // Splits into one table per distinct key, in order of first
    // appearance. Null is a key like any other here.
    pub fn split_by(&self, names: &[&str]) -> Result<Vec<Table>> {
        let idxs = names
            .iter()
            .map(|n| self.schema().require(n))
            .collect::<Result<Vec<_>>>()?;
        let mut slot: HashMap<Vec<ValueKey>, usize> = HashMap::new();
        let mut parts: Vec<Vec<Vec<Value>>> = Vec::new();
        for row in self.rows() {
            let key = row_key(row, &idxs)?;
            let next = parts.len();
            let g = *slot.entry(key).or_insert(next);
            if g == next {
                parts.push(Vec::new());
            }
            parts[g].push(row.clone());
        }
        Ok(parts
            .into_iter()
            .map(|rows| Table::assemble(self.schema().clone(), rows, self.title().map(str::to_string), self.meta().clone()))
            .collect())
    }

    // First occurrence of every distinct row.
    pub fn unique_rows(&self) -> Result<Table> {
        let all: Vec<usize> = (0..self.schema().len()).collect();
        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for row in self.rows() {
            if seen.insert(row_key(row, &all)?) {
                rows.push(row.clone());
            }
        }
        Ok(Table::assemble(
            self.schema().clone(),
            rows,
            self.title().map(str::to_string),
            self.meta().clone(),
        ))
    }
}
