// Value -> row index maps used to turn an equality join from a scan of
// every right row per left row into a lookup. Tolerance lookups bucket the
// indexed values by `floor(v / width)` and check the buckets a needle
// could reach, so every candidate is confirmed with the same test the
// unaccelerated predicate would use.

use std::collections::HashMap;
use tabula_base::{contract_err, Result};
use tabula_lang::{Value, ValueKey};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tolerance {
    Abs(f64),
    Rel(f64),
}

impl Tolerance {
    pub fn check(&self) -> Result<()> {
        let x = self.value();
        if x.is_finite() && x > 0.0 {
            Ok(())
        } else {
            Err(contract_err(format!("tolerance must be finite and positive, got {self:?}")))
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Tolerance::Abs(x) | Tolerance::Rel(x) => *x,
        }
    }

    // `b` is the reference side: relative tolerance scales with it.
    pub fn matches(&self, a: f64, b: f64) -> bool {
        match self {
            Tolerance::Abs(x) => (a - b).abs() <= *x,
            Tolerance::Rel(x) => (a - b).abs() <= *x * b.abs(),
        }
    }
}

#[derive(Debug)]
pub enum Lookup {
    Exact {
        values: Vec<Value>,
        index: HashMap<ValueKey, Vec<usize>>,
    },
    AbsTol(Buckets),
    RelTol(Buckets),
}

#[derive(Debug)]
pub struct Buckets {
    tol: Tolerance,
    width: f64,
    values: Vec<Option<f64>>,
    index: HashMap<i64, Vec<usize>>,
}

fn bucket(x: f64, width: f64) -> i64 {
    // Saturating cast; values this far out all share the end buckets.
    (x / width).floor() as i64
}

impl Buckets {
    fn build(tol: Tolerance, width: f64, values: Vec<Option<f64>>) -> Buckets {
        let mut index: HashMap<i64, Vec<usize>> = HashMap::new();
        for (i, v) in values.iter().enumerate() {
            if let Some(v) = v {
                index.entry(bucket(*v, width)).or_default().push(i);
            }
        }
        Buckets {
            tol,
            width,
            values,
            index,
        }
    }

    fn find(&self, needle: f64) -> Vec<usize> {
        if !needle.is_finite() {
            return Vec::new();
        }
        // Abs reach is the tolerance; rel reach is at most tol * max|b|,
        // which is exactly the bucket width.
        let (lo, hi) = (bucket(needle - self.width, self.width), bucket(needle + self.width, self.width));
        let mut out = Vec::new();
        for b in lo..=hi {
            if let Some(rows) = self.index.get(&b) {
                for &i in rows {
                    if let Some(v) = self.values[i] {
                        if self.tol.matches(needle, v) {
                            out.push(i);
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}

fn numeric(values: &[Value]) -> Result<Vec<Option<f64>>> {
    values
        .iter()
        .map(|v| match v {
            Value::Null => Ok(None),
            v => match v.as_f64() {
                Some(x) if x.is_finite() => Ok(Some(x)),
                Some(_) => Ok(None),
                None => Err(contract_err(format!("tolerance lookup needs numbers, got {v}"))),
            },
        })
        .collect()
}

impl Lookup {
    // Nulls are never indexed: they match nothing.
    pub fn build(values: &[Value], tol: Option<Tolerance>) -> Result<Lookup> {
        let Some(tol) = tol else {
            let mut index: HashMap<ValueKey, Vec<usize>> = HashMap::new();
            for (i, v) in values.iter().enumerate() {
                if !v.is_null() {
                    index.entry(v.key()?).or_default().push(i);
                }
            }
            return Ok(Lookup::Exact {
                values: values.to_vec(),
                index,
            });
        };
        tol.check()?;
        let nums = numeric(values)?;
        match tol {
            Tolerance::Abs(x) => Ok(Lookup::AbsTol(Buckets::build(tol, x, nums))),
            Tolerance::Rel(x) => {
                let max = nums.iter().flatten().fold(0.0f64, |m, v| m.max(v.abs()));
                let width = x * max;
                if width > 0.0 {
                    Ok(Lookup::RelTol(Buckets::build(tol, width, nums)))
                } else {
                    // Every indexed value is zero, so only an exact zero
                    // can be within a relative tolerance of it.
                    Lookup::build(values, None)
                }
            }
        }
    }

    // Row indices matching `needle`, ascending.
    pub fn find(&self, needle: &Value) -> Result<Vec<usize>> {
        if needle.is_null() {
            return Ok(Vec::new());
        }
        match self {
            Lookup::Exact { values, index } => Ok(index
                .get(&needle.key()?)
                .map(|rows| rows.iter().copied().filter(|&i| values[i].loose_eq(needle)).collect())
                .unwrap_or_default()),
            Lookup::AbsTol(b) | Lookup::RelTol(b) => {
                let x = needle
                    .as_f64()
                    .ok_or_else(|| contract_err(format!("tolerance lookup needs numbers, got {needle}")))?;
                Ok(b.find(x))
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Lookup::Exact { values, .. } => values.len(),
            Lookup::AbsTol(b) | Lookup::RelTol(b) => b.values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
